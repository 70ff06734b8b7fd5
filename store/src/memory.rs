// Copyright 2018 The Grin Developers
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

//! A `HashMap`-backed `BlockStore`. Good enough for tests and for a
//! header-only node that doesn't need to survive a restart; a real
//! deployment persists to disk and is expected to supply its own
//! implementation of the trait instead.

use std::collections::HashMap;

use lodestone_core::hash::Hash;
use lodestone_core::stored_block::StoredBlock;
use lodestone_util::RwLock;

use crate::error::{Error, ErrorKind};
use crate::BlockStore;

struct Entry<U> {
	stored: StoredBlock,
	undo: Option<U>,
}

struct Inner<U> {
	blocks: HashMap<Hash, Entry<U>>,
	head: Option<Hash>,
}

/// In-memory `BlockStore`. `put`/`put_with_undo` take effect immediately;
/// there is nothing to roll back, so `not_setting_chain_head` is a no-op
/// and `do_set_chain_head` only ever moves the head pointer.
pub struct MemoryBlockStore<U> {
	inner: RwLock<Inner<U>>,
}

impl<U: Clone> MemoryBlockStore<U> {
	/// Creates a store pre-populated with `genesis` as both its only block
	/// and its chain head.
	pub fn new(genesis: StoredBlock) -> MemoryBlockStore<U> {
		let hash = genesis.hash();
		let mut blocks = HashMap::new();
		blocks.insert(
			hash,
			Entry {
				stored: genesis,
				undo: None,
			},
		);
		MemoryBlockStore {
			inner: RwLock::new(Inner {
				blocks,
				head: Some(hash),
			}),
		}
	}
}

impl<U: Clone> BlockStore for MemoryBlockStore<U> {
	type UndoData = U;

	fn get_chain_head(&self) -> Result<StoredBlock, Error> {
		let inner = self.inner.read();
		let head = inner.head.ok_or(ErrorKind::NotFound)?;
		Ok(inner.blocks.get(&head).unwrap().stored.clone())
	}

	fn get(&self, hash: &Hash) -> Result<Option<StoredBlock>, Error> {
		let inner = self.inner.read();
		Ok(inner.blocks.get(hash).map(|e| e.stored.clone()))
	}

	fn get_once_undoable_stored_block(&self, hash: &Hash) -> Result<(StoredBlock, U), Error> {
		let inner = self.inner.read();
		let entry = inner.blocks.get(hash).ok_or(ErrorKind::NotFound)?;
		let undo = entry.undo.clone().ok_or(ErrorKind::Pruned)?;
		Ok((entry.stored.clone(), undo))
	}

	fn put(&self, stored: &StoredBlock) -> Result<(), Error> {
		let mut inner = self.inner.write();
		inner.blocks.insert(
			stored.hash(),
			Entry {
				stored: stored.clone(),
				undo: None,
			},
		);
		Ok(())
	}

	fn put_with_undo(&self, stored: &StoredBlock, undo: U) -> Result<(), Error> {
		let mut inner = self.inner.write();
		inner.blocks.insert(
			stored.hash(),
			Entry {
				stored: stored.clone(),
				undo: Some(undo),
			},
		);
		Ok(())
	}

	fn do_set_chain_head(&self, stored: &StoredBlock) -> Result<(), Error> {
		let mut inner = self.inner.write();
		inner.head = Some(stored.hash());
		Ok(())
	}

	fn not_setting_chain_head(&self) -> Result<(), Error> {
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use lodestone_core::block::BlockHeader;
	use lodestone_core::hash::ZERO_HASH;

	fn genesis() -> StoredBlock {
		StoredBlock::genesis(BlockHeader::genesis(0x207f_ffff, 0))
	}

	#[test]
	fn starts_with_genesis_as_head() {
		let store: MemoryBlockStore<()> = MemoryBlockStore::new(genesis());
		assert_eq!(store.get_chain_head().unwrap(), genesis());
	}

	#[test]
	fn unknown_block_is_not_found() {
		let store: MemoryBlockStore<()> = MemoryBlockStore::new(genesis());
		assert!(store.get(&ZERO_HASH).unwrap().is_none());
	}

	#[test]
	fn pruned_undo_data_is_reported() {
		let store: MemoryBlockStore<()> = MemoryBlockStore::new(genesis());
		let hash = genesis().hash();
		assert_eq!(
			store
				.get_once_undoable_stored_block(&hash)
				.unwrap_err()
				.kind(),
			ErrorKind::Pruned
		);
	}

	#[test]
	fn do_set_chain_head_moves_head() {
		let store: MemoryBlockStore<()> = MemoryBlockStore::new(genesis());
		let child = genesis().build(BlockHeader::genesis(0x207f_ffff, 1));
		store.put(&child).unwrap();
		store.do_set_chain_head(&child).unwrap();
		assert_eq!(store.get_chain_head().unwrap(), child);
	}
}
