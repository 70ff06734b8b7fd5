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

//! The record the chain tree is actually built from: a header plus the two
//! facts about its position that aren't recoverable from the header alone.

use crate::core::block::BlockHeader;
use crate::core::hash::{Hash, Hashed};
use crate::core::target::Work;

/// An immutable (header, height, cumulative-work) triple. Once built it
/// never changes; a reorg produces new `StoredBlock`s rather than mutating
/// existing ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
	/// The header this record wraps.
	pub header: BlockHeader,
	/// Distance from genesis, which is height 0.
	pub height: u64,
	/// Sum of the work of this block and every ancestor back to genesis.
	pub total_work: Work,
}

impl StoredBlock {
	/// Builds the genesis record: height 0, work of the genesis header alone.
	pub fn genesis(header: BlockHeader) -> StoredBlock {
		let total_work = Work::from_compact(header.bits);
		StoredBlock {
			header,
			height: 0,
			total_work,
		}
	}

	/// Builds the record for `header`, whose parent is `self`. Does not
	/// check that `header.previous == self.hash()`; callers verify linkage
	/// separately before calling this.
	pub fn build(&self, header: BlockHeader) -> StoredBlock {
		let added = Work::from_compact(header.bits);
		StoredBlock {
			height: self.height + 1,
			total_work: self.total_work.clone() + added,
			header,
		}
	}

	/// Hash of the wrapped header.
	pub fn hash(&self) -> Hash {
		self.header.hash()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn header(bits: u32, previous: Hash) -> BlockHeader {
		BlockHeader {
			version: 1,
			previous,
			merkle_root: crate::core::hash::ZERO_HASH,
			time: 0,
			bits,
			nonce: 0,
		}
	}

	#[test]
	fn child_height_and_work_accumulate() {
		let genesis = StoredBlock::genesis(header(0x207f_ffff, crate::core::hash::ZERO_HASH));
		let child = genesis.build(header(0x207f_ffff, genesis.hash()));
		assert_eq!(child.height, 1);
		assert_eq!(
			child.total_work,
			genesis.total_work.clone() + Work::from_compact(0x207f_ffff)
		);
	}
}
