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

//! The block store contract consumed by the chain manager, and a small
//! in-memory implementation of it used by tests and as a reference.
//!
//! The chain manager treats the store as a single external collaborator:
//! CRUD on `StoredBlock`s by hash, height-walkable parent links, and undo
//! data for full-validation reorgs. How (or whether) any of that reaches
//! disk is entirely the implementation's business; the trait below is the
//! whole of what the core requires.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate failure_derive;

pub mod error;
pub mod memory;

pub use crate::error::{Error, ErrorKind};

use lodestone_core::hash::Hash;
use lodestone_core::stored_block::StoredBlock;

/// Persistence and lookup contract the chain manager consumes. A single
/// logical resource: `put`/`put_with_undo` stage data, and every staging
/// call must eventually be followed by exactly one of `do_set_chain_head`
/// (commit) or `not_setting_chain_head` (abort).
pub trait BlockStore {
	/// Opaque per-implementation undo data recorded alongside a block in
	/// full-validation mode, needed to `disconnectTransactions` during a
	/// reorg once the block has left the store's pruning window.
	type UndoData;

	/// The current chain head.
	fn get_chain_head(&self) -> Result<StoredBlock, Error>;

	/// Looks up a stored block by hash.
	fn get(&self, hash: &Hash) -> Result<Option<StoredBlock>, Error>;

	/// As `get`, but also returns the undo data recorded for this block.
	/// Fails with `ErrorKind::Pruned` if the block is known but its undo
	/// data has since been discarded, and `ErrorKind::NotFound` if the
	/// block itself is unknown.
	fn get_once_undoable_stored_block(
		&self,
		hash: &Hash,
	) -> Result<(StoredBlock, Self::UndoData), Error>;

	/// Stages a header-only block (side-chain or SPV persistence).
	fn put(&self, stored: &StoredBlock) -> Result<(), Error>;

	/// Stages a block together with the undo data needed to later
	/// disconnect it.
	fn put_with_undo(&self, stored: &StoredBlock, undo: Self::UndoData) -> Result<(), Error>;

	/// Commits every staged change since the last commit or abort and
	/// advances the persisted chain head to `stored`.
	fn do_set_chain_head(&self, stored: &StoredBlock) -> Result<(), Error>;

	/// Aborts any staged changes since the last commit or abort. Must be
	/// safe to call even when nothing was staged.
	fn not_setting_chain_head(&self) -> Result<(), Error>;
}
