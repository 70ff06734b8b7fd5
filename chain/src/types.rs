// Copyright 2016 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Base types the chain pipeline builds on: the block shapes it accepts and
//! the capability set a concrete deployment mode (header-only vs
//! full-validation) must provide.
//!
//! Historically this kind of mode-dependent behaviour was expressed as
//! overridable hooks on a common base class. There is no inheritance here,
//! so the hooks are instead a plain trait, and the chain manager is generic
//! over an implementation of it rather than holding a `dyn` base pointer.

use std::collections::HashMap;

use lodestone_core::core::block::{Block, BlockHeader, Transaction};
use lodestone_core::core::hash::{Hash, Hashed};
use lodestone_core::core::stored_block::StoredBlock;
use lodestone_store::BlockStore;

use crate::error::{Error, ErrorKind};

/// A block whose transaction list has been thinned by a peer-side filter
/// (e.g. a bloom filter) down to the subset a header-only client cares
/// about. Full blocks are represented as a `FilteredBlock` whose subset is
/// complete.
#[derive(Debug, Clone)]
pub struct FilteredBlock {
	/// The header, always fully present.
	pub header: BlockHeader,
	/// Hashes of every transaction in the original block, in order. Lets a
	/// header-only client recompute the Merkle root against the subset it
	/// was actually given.
	pub tx_hashes: Vec<Hash>,
	/// The transactions the filter matched, keyed by hash.
	pub tx_subset: HashMap<Hash, Transaction>,
}

impl FilteredBlock {
	/// A filtered view that retains every transaction of a full block.
	pub fn complete(block: &Block) -> FilteredBlock {
		let txs = block.transactions.clone().unwrap_or_default();
		let tx_hashes = txs.iter().map(Transaction::hash).collect();
		let tx_subset = txs.into_iter().map(|t| (t.hash(), t)).collect();
		FilteredBlock {
			header: block.header.clone(),
			tx_hashes,
			tx_subset,
		}
	}
}

/// The capability set a deployment mode must provide to the chain manager.
/// `connectTransactions`/`disconnectTransactions` are only ever invoked when
/// `should_verify_transactions()` returns true; a header-only mode can make
/// them unreachable rather than meaningfully implement them.
pub trait ChainHooks {
	/// Opaque, implementation-specific record of what connecting a block's
	/// transactions changed, handed back unexamined on a later
	/// `disconnect_transactions` during a reorg.
	type OutputChanges;

	/// Whether this deployment mode requires transaction content at all.
	/// Header-only (SPV) mode never does; full-validation mode always does.
	fn should_verify_transactions(&self) -> bool;

	/// Apply a block's transactions against whatever persistent state this
	/// mode maintains (e.g. an unspent-output set), returning a record of
	/// the changes made so they can be undone later.
	fn connect_transactions(
		&self,
		height: u64,
		block: &Block,
	) -> Result<Self::OutputChanges, Error>;

	/// Undo a previous `connect_transactions` using the record it returned.
	fn disconnect_transactions(
		&self,
		stored: &StoredBlock,
		changes: &Self::OutputChanges,
	) -> Result<(), Error>;

	/// Called once a candidate has been fully accepted and is about to
	/// become the new chain head.
	fn do_set_chain_head(&self, stored: &StoredBlock) -> Result<(), Error>;

	/// Called when a candidate was accepted but did not become chain head
	/// (e.g. it is being filed as a side-branch tip), or when an attempted
	/// head change must be rolled back.
	fn not_setting_chain_head(&self) -> Result<(), Error>;
}

/// Header-only hooks: never verifies or connects transaction content, and
/// every accepted block becomes chain head through the store alone.
pub struct HeaderOnlyHooks;

impl ChainHooks for HeaderOnlyHooks {
	type OutputChanges = ();

	fn should_verify_transactions(&self) -> bool {
		false
	}

	fn connect_transactions(&self, _height: u64, _block: &Block) -> Result<(), Error> {
		Ok(())
	}

	fn disconnect_transactions(&self, _stored: &StoredBlock, _changes: &()) -> Result<(), Error> {
		Ok(())
	}

	fn do_set_chain_head(&self, _stored: &StoredBlock) -> Result<(), Error> {
		Ok(())
	}

	fn not_setting_chain_head(&self) -> Result<(), Error> {
		Ok(())
	}
}

/// Full-validation hooks: requires and checks transaction content. The
/// unspent-output set such a deployment would maintain is an external
/// collaborator, so the output-change record kept here is only the set of
/// transaction hashes a block connected, enough to support an undo.
pub struct FullValidationHooks<S: BlockStore> {
	store: std::sync::Arc<S>,
}

impl<S: BlockStore> FullValidationHooks<S> {
	pub fn new(store: std::sync::Arc<S>) -> FullValidationHooks<S> {
		FullValidationHooks { store }
	}
}

impl<S: BlockStore> ChainHooks for FullValidationHooks<S> {
	type OutputChanges = Vec<Hash>;

	fn should_verify_transactions(&self) -> bool {
		true
	}

	fn connect_transactions(&self, _height: u64, block: &Block) -> Result<Vec<Hash>, Error> {
		let txs = block.transactions.as_ref().ok_or_else(|| {
			Error::from(ErrorKind::InvalidBlock(
				"full-validation mode requires transaction content".into(),
			))
		})?;
		Ok(txs.iter().map(Transaction::hash).collect())
	}

	fn disconnect_transactions(
		&self,
		_stored: &StoredBlock,
		_changes: &Vec<Hash>,
	) -> Result<(), Error> {
		Ok(())
	}

	fn do_set_chain_head(&self, stored: &StoredBlock) -> Result<(), Error> {
		self.store.do_set_chain_head(stored).map_err(Error::from)
	}

	fn not_setting_chain_head(&self) -> Result<(), Error> {
		self.store.not_setting_chain_head().map_err(Error::from)
	}
}
