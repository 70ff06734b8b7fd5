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

//! The individual verification and classification steps `Chain::add`
//! threads a candidate through. Kept as free functions, staged the way the
//! block-connection pipeline always has been here, rather than folded into
//! one large method.

use lodestone_core::core::block::Block;
use lodestone_core::core::stored_block::StoredBlock;

use crate::difficulty::HeaderProvider;
use crate::error::Error;

/// How a freshly verified candidate relates to the current chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
	/// Its parent is the current head: the common case.
	Extension,
	/// It roots a branch with no more work than the current head.
	SideNoReorg,
	/// It roots a branch with more work than the current head.
	Reorg,
}

/// Structural transaction check (non-empty, correct Merkle root).
pub fn verify_transactions_step(block: &Block) -> Result<(), Error> {
	block.verify_transactions()?;
	Ok(())
}

/// Classifies a candidate already known to link to `parent`, given the
/// resulting `new_stored` record and the current chain head.
pub fn classify(
	parent: &StoredBlock,
	new_stored: &StoredBlock,
	head: &StoredBlock,
) -> Classification {
	if parent.hash() == head.hash() {
		Classification::Extension
	} else if new_stored.total_work <= head.total_work {
		Classification::SideNoReorg
	} else {
		Classification::Reorg
	}
}

/// Median of the `count` timestamps ending at and including `tip`, walking
/// backward through the store. Used for the finality gate and the reorg
/// reconnection gate, both of which key off "median of the last 11 blocks".
pub fn median_time_past<H: HeaderProvider>(tip: &StoredBlock, headers: &H, count: usize) -> i64 {
	let mut times = Vec::with_capacity(count);
	let mut cursor = tip.clone();
	times.push(cursor.header.time_seconds());
	for _ in 1..count {
		if cursor.height == 0 {
			break;
		}
		match headers.get(&cursor.header.previous) {
			Some(parent) => {
				cursor = parent;
				times.push(cursor.header.time_seconds());
			}
			None => break,
		}
	}
	times.sort_unstable();
	times[times.len() / 2]
}

#[cfg(test)]
mod test {
	use super::*;
	use lodestone_core::core::block::BlockHeader;
	use lodestone_core::core::hash::{Hash, ZERO_HASH};
	use std::collections::HashMap;

	fn header(previous: Hash, time: u32) -> BlockHeader {
		BlockHeader {
			version: 1,
			previous,
			merkle_root: ZERO_HASH,
			time,
			bits: 0x207f_ffff,
			nonce: 0,
		}
	}

	#[test]
	fn median_time_past_of_single_block_is_its_own_time() {
		let genesis = StoredBlock::genesis(header(ZERO_HASH, 100));
		let empty: HashMap<Hash, StoredBlock> = HashMap::new();
		let provider = move |h: &Hash| empty.get(h).cloned();
		assert_eq!(median_time_past(&genesis, &provider, 11), 100);
	}

	#[test]
	fn classify_recognizes_extension() {
		let genesis = StoredBlock::genesis(header(ZERO_HASH, 0));
		let child = genesis.build(header(genesis.hash(), 1));
		assert_eq!(
			classify(&genesis, &child, &genesis),
			Classification::Extension
		);
	}
}
