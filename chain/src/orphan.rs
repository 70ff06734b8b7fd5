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

//! Bounded buffer for candidates whose parent is not yet known.

use std::collections::HashMap;

use lodestone_core::core::hash::{Hash, Hashed};

use crate::types::FilteredBlock;

struct Orphan {
	block: FilteredBlock,
	inserted_at: u64,
}

/// Buffers blocks that arrived before their parent. Bounded: once more than
/// `max_orphans` are buffered, the oldest is evicted to make room for a new
/// arrival.
pub struct OrphanBlockPool {
	orphans: HashMap<Hash, Orphan>,
	/// Index from a missing parent's hash to the orphan(s) waiting on it.
	by_previous: HashMap<Hash, Vec<Hash>>,
	max_orphans: usize,
	next_seq: u64,
}

impl OrphanBlockPool {
	pub fn new(max_orphans: usize) -> OrphanBlockPool {
		OrphanBlockPool {
			orphans: HashMap::new(),
			by_previous: HashMap::new(),
			max_orphans,
			next_seq: 0,
		}
	}

	pub fn len(&self) -> usize {
		self.orphans.len()
	}

	pub fn contains(&self, hash: &Hash) -> bool {
		self.orphans.contains_key(hash)
	}

	/// Buffers `block`, evicting the oldest-inserted orphan first if the
	/// pool is already at capacity.
	pub fn add(&mut self, block: FilteredBlock) {
		let hash = block.header.hash();
		if self.orphans.contains_key(&hash) {
			return;
		}
		if self.orphans.len() >= self.max_orphans {
			self.evict_oldest();
		}
		let previous = block.header.previous;
		let seq = self.next_seq;
		self.next_seq += 1;
		self.orphans.insert(
			hash,
			Orphan {
				block,
				inserted_at: seq,
			},
		);
		self.by_previous.entry(previous).or_default().push(hash);
	}

	fn evict_oldest(&mut self) {
		let oldest = self
			.orphans
			.iter()
			.min_by_key(|(_, o)| o.inserted_at)
			.map(|(h, _)| *h);
		if let Some(hash) = oldest {
			self.remove(&hash);
		}
	}

	/// Removes and returns a buffered orphan, if present.
	pub fn remove(&mut self, hash: &Hash) -> Option<FilteredBlock> {
		let orphan = self.orphans.remove(hash)?;
		if let Some(siblings) = self.by_previous.get_mut(&orphan.block.header.previous) {
			siblings.retain(|h| h != hash);
			if siblings.is_empty() {
				self.by_previous.remove(&orphan.block.header.previous);
			}
		}
		Some(orphan.block)
	}

	/// Every orphan waiting on `previous` as its parent, oldest first.
	pub fn children_of(&self, previous: &Hash) -> Vec<Hash> {
		let mut children = self.by_previous.get(previous).cloned().unwrap_or_default();
		children.sort_by_key(|h| self.orphans[h].inserted_at);
		children
	}

	/// Every buffered orphan's hash, oldest first. Used to drive a drain
	/// pass over the whole pool in arrival order.
	pub fn hashes_in_order(&self) -> Vec<Hash> {
		let mut hashes: Vec<Hash> = self.orphans.keys().cloned().collect();
		hashes.sort_by_key(|h| self.orphans[h].inserted_at);
		hashes
	}

	/// Walks upward (toward ancestors) from a buffered orphan through other
	/// buffered orphans, returning the hash of the topmost one still without
	/// a known parent in the store. `None` if `hash` is not itself buffered.
	pub fn get_orphan_root(&self, hash: &Hash) -> Option<Hash> {
		let mut current = self.orphans.get(hash)?;
		let mut current_hash = *hash;
		loop {
			match self.orphans.get(&current.block.header.previous) {
				Some(parent) => {
					current_hash = current.block.header.previous;
					current = parent;
				}
				None => return Some(current_hash),
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use lodestone_core::core::block::{Block, BlockHeader};
	use lodestone_core::core::hash::{Hashed, ZERO_HASH};

	fn block_at(previous: Hash, nonce: u32) -> FilteredBlock {
		FilteredBlock::complete(&Block {
			header: BlockHeader {
				version: 1,
				previous,
				merkle_root: ZERO_HASH,
				time: 0,
				bits: 0x207f_ffff,
				nonce,
			},
			transactions: Some(vec![]),
		})
	}

	#[test]
	fn add_and_remove_round_trips() {
		let mut pool = OrphanBlockPool::new(10);
		let b = block_at(ZERO_HASH, 1);
		let hash = b.header.hash();
		pool.add(b);
		assert!(pool.contains(&hash));
		assert!(pool.remove(&hash).is_some());
		assert!(!pool.contains(&hash));
	}

	#[test]
	fn eviction_drops_oldest_when_full() {
		let mut pool = OrphanBlockPool::new(2);
		let a = block_at(ZERO_HASH, 1);
		let a_hash = a.header.hash();
		pool.add(a);
		pool.add(block_at(ZERO_HASH, 2));
		pool.add(block_at(ZERO_HASH, 3));
		assert_eq!(pool.len(), 2);
		assert!(!pool.contains(&a_hash));
	}

	#[test]
	fn orphan_root_walks_to_topmost_buffered_ancestor() {
		let mut pool = OrphanBlockPool::new(10);
		let grandparent = block_at(ZERO_HASH, 1);
		let grandparent_hash = grandparent.header.hash();
		let parent = block_at(grandparent_hash, 2);
		let parent_hash = parent.header.hash();
		let child = block_at(parent_hash, 3);
		let child_hash = child.header.hash();
		pool.add(grandparent);
		pool.add(parent);
		pool.add(child);

		assert_eq!(pool.get_orphan_root(&child_hash), Some(grandparent_hash));
	}

	#[test]
	fn children_of_lists_waiting_orphans_in_arrival_order() {
		let mut pool = OrphanBlockPool::new(10);
		let parent_hash = block_at(ZERO_HASH, 0).header.hash();
		let a = block_at(parent_hash, 1);
		let a_hash = a.header.hash();
		let b = block_at(parent_hash, 2);
		let b_hash = b.header.hash();
		pool.add(a);
		pool.add(b);
		assert_eq!(pool.children_of(&parent_hash), vec![a_hash, b_hash]);
	}
}
