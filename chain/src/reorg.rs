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

//! Finds where two branches diverge and builds the ordered disconnect /
//! reconnect lists a reorg needs.

use lodestone_core::core::stored_block::StoredBlock;

use crate::difficulty::HeaderProvider;
use crate::error::{Error, ErrorKind};

fn disjoint() -> Error {
	ErrorKind::InvalidBlock("branches share no common ancestor in the retained history".into())
		.into()
}

/// Walks two cursors back from `a` and `b`, advancing whichever sits at the
/// greater height until they match, then advancing both together until
/// their hashes agree. The result may equal `a` or `b` outright.
pub fn find_split_point<H: HeaderProvider>(
	a: &StoredBlock,
	b: &StoredBlock,
	headers: &H,
) -> Result<StoredBlock, Error> {
	let mut cursor_a = a.clone();
	let mut cursor_b = b.clone();

	while cursor_a.height > cursor_b.height {
		cursor_a = headers.get(&cursor_a.header.previous).ok_or_else(disjoint)?;
	}
	while cursor_b.height > cursor_a.height {
		cursor_b = headers.get(&cursor_b.header.previous).ok_or_else(disjoint)?;
	}
	while cursor_a.hash() != cursor_b.hash() {
		cursor_a = headers.get(&cursor_a.header.previous).ok_or_else(disjoint)?;
		cursor_b = headers.get(&cursor_b.header.previous).ok_or_else(disjoint)?;
	}
	Ok(cursor_a)
}

/// The blocks strictly between `split` and `head`, in head-to-split order
/// (the order `disconnectTransactions` is applied in).
pub fn branch_to_split<H: HeaderProvider>(
	head: &StoredBlock,
	split: &StoredBlock,
	headers: &H,
) -> Result<Vec<StoredBlock>, Error> {
	let mut list = Vec::new();
	let mut cursor = head.clone();
	while cursor.hash() != split.hash() {
		list.push(cursor.clone());
		cursor = headers.get(&cursor.header.previous).ok_or_else(|| {
			ErrorKind::InvalidBlock("split point is not an ancestor of this head".into())
		})?;
	}
	Ok(list)
}

/// Everything needed to carry out a reorg once the two heads are known:
/// the common ancestor, the old branch in head-to-split (disconnect) order,
/// and the new branch in split-to-head (reconnect) order.
pub struct ReorgPlan {
	pub split_point: StoredBlock,
	pub old: Vec<StoredBlock>,
	pub new: Vec<StoredBlock>,
}

pub fn plan_reorg<H: HeaderProvider>(
	current_head: &StoredBlock,
	new_head: &StoredBlock,
	headers: &H,
) -> Result<ReorgPlan, Error> {
	let split_point = find_split_point(current_head, new_head, headers)?;
	let old = branch_to_split(current_head, &split_point, headers)?;
	let mut new = branch_to_split(new_head, &split_point, headers)?;
	new.reverse();
	Ok(ReorgPlan {
		split_point,
		old,
		new,
	})
}

#[cfg(test)]
mod test {
	use super::*;
	use lodestone_core::core::block::BlockHeader;
	use lodestone_core::core::hash::{Hash, ZERO_HASH};
	use std::collections::HashMap;

	fn header(previous: Hash, nonce: u32) -> BlockHeader {
		BlockHeader {
			version: 1,
			previous,
			merkle_root: ZERO_HASH,
			time: nonce,
			bits: 0x207f_ffff,
			nonce,
		}
	}

	#[test]
	fn split_point_finds_common_ancestor_on_uneven_branches() {
		let mut map = HashMap::new();
		let genesis = StoredBlock::genesis(header(ZERO_HASH, 0));
		map.insert(genesis.hash(), genesis.clone());

		let a1 = genesis.build(header(genesis.hash(), 1));
		map.insert(a1.hash(), a1.clone());
		let a2 = a1.build(header(a1.hash(), 2));
		map.insert(a2.hash(), a2.clone());
		let a3 = a2.build(header(a2.hash(), 3));
		map.insert(a3.hash(), a3.clone());

		let b1 = a1.build(header(a1.hash(), 10));
		map.insert(b1.hash(), b1.clone());
		let b2 = b1.build(header(b1.hash(), 11));
		map.insert(b2.hash(), b2.clone());

		let provider = move |h: &Hash| map.get(h).cloned();
		let split = find_split_point(&a3, &b2, &provider).unwrap();
		assert_eq!(split.hash(), a1.hash());

		let plan = plan_reorg(&a3, &b2, &provider).unwrap();
		assert_eq!(plan.old.iter().map(|b| b.hash()).collect::<Vec<_>>(), vec![a3.hash(), a2.hash()]);
		assert_eq!(plan.new.iter().map(|b| b.hash()).collect::<Vec<_>>(), vec![b1.hash(), b2.hash()]);
	}

	#[test]
	fn disjoint_branches_fail_hard() {
		let genesis_a = StoredBlock::genesis(header(ZERO_HASH, 1));
		let genesis_b = StoredBlock::genesis(header(ZERO_HASH, 2));
		let empty: HashMap<Hash, StoredBlock> = HashMap::new();
		let provider = move |h: &Hash| empty.get(h).cloned();
		assert!(find_split_point(&genesis_a, &genesis_b, &provider).is_err());
	}
}
