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

//! Block header and block shapes. Real parsing, wire (de)serialization and
//! script execution live in the block/transaction module above the chain;
//! what's here is the minimal surface the chain manager needs in order to
//! link headers together and reason about their proof of work.

use failure::Fail;
use num_bigint::BigUint;

use crate::core::hash::{sha256d, Hash, Hashed, ZERO_HASH};
use crate::core::target::compact_to_target;

/// Height below which `lock_time` is interpreted as a block height rather
/// than a unix timestamp, same convention as the reference coins.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Block header: the only part of a block the core links into the tree and
/// checks proof of work against. Every field beyond these six is opaque to
/// the chain manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
	/// Block format version.
	pub version: i32,
	/// Hash of the previous block header, `ZERO_HASH` for genesis.
	pub previous: Hash,
	/// Merkle root of the block's transactions.
	pub merkle_root: Hash,
	/// Seconds since the Unix epoch, as claimed by the miner.
	pub time: u32,
	/// Compact-encoded difficulty target ("nBits").
	pub bits: u32,
	/// Miner-chosen nonce.
	pub nonce: u32,
}

impl BlockHeader {
	/// Builds a minimal, deterministic genesis header for the given network.
	pub fn genesis(bits: u32, time: u32) -> BlockHeader {
		BlockHeader {
			version: 1,
			previous: ZERO_HASH,
			merkle_root: ZERO_HASH,
			time,
			bits,
			nonce: 0,
		}
	}

	/// Seconds since the Unix epoch this header claims to have been mined at.
	pub fn time_seconds(&self) -> i64 {
		self.time as i64
	}

	/// Compact-encoded difficulty target, verbatim from the header.
	pub fn difficulty_target(&self) -> u32 {
		self.bits
	}

	/// Difficulty target decoded to a full 256-bit integer.
	pub fn difficulty_target_as_integer(&self) -> BigUint {
		compact_to_target(self.bits)
	}

	/// A copy of the header detached from any transactions; useful when a
	/// full block needs to be persisted or relayed as a header only.
	pub fn cloned_header(&self) -> BlockHeader {
		self.clone()
	}
}

impl Hashed for BlockHeader {
	fn bytes(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(4 + 32 + 32 + 4 + 4 + 4);
		out.extend_from_slice(&self.version.to_le_bytes());
		out.extend_from_slice(self.previous.as_bytes());
		out.extend_from_slice(self.merkle_root.as_bytes());
		out.extend_from_slice(&self.time.to_le_bytes());
		out.extend_from_slice(&self.bits.to_le_bytes());
		out.extend_from_slice(&self.nonce.to_le_bytes());
		out
	}
}

/// Structural/proof-of-work failures raised while verifying a header in
/// isolation, independent of its position in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Fail)]
pub enum HeaderError {
	/// The header's hash, read as an integer, is not below its own target.
	#[fail(display = "block hash does not meet its own proof-of-work target")]
	ProofOfWorkFailed,
	/// The claimed timestamp is further in the future than protocols allow.
	#[fail(display = "block timestamp {} is too far in the future", _0)]
	TimeTooFarInFuture(i64),
}

impl BlockHeader {
	/// Structural and proof-of-work check that only needs the header: the
	/// claimed hash must actually be below the claimed target. A two-hour
	/// future-drift allowance mirrors the reference coins' rule.
	pub fn verify_header(&self, now: i64) -> Result<(), HeaderError> {
		const MAX_FUTURE_DRIFT_SECS: i64 = 2 * 60 * 60;
		if self.time_seconds() > now + MAX_FUTURE_DRIFT_SECS {
			return Err(HeaderError::TimeTooFarInFuture(self.time_seconds()));
		}
		let target = self.difficulty_target_as_integer();
		if self.hash().as_uint() >= target {
			return Err(HeaderError::ProofOfWorkFailed);
		}
		Ok(())
	}
}

/// Structural failures raised while verifying a block's transaction
/// contents against its header.
#[derive(Debug, Clone, PartialEq, Eq, Fail)]
pub enum TransactionsError {
	/// Transactions are required in this mode but were not supplied.
	#[fail(display = "block is missing its transaction list")]
	MissingTransactions,
	/// The block is empty; every block must carry at least a coinbase.
	#[fail(display = "block has no transactions")]
	Empty,
	/// The computed Merkle root over `transactions` doesn't match the
	/// header's claimed root.
	#[fail(display = "transaction merkle root does not match header")]
	BadMerkleRoot,
}

/// A transaction, opaque beyond the single field the chain manager's
/// finality check needs. Script execution, input/output accounting and
/// wire (de)serialization belong to the transaction module, out of scope
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	/// Opaque serialized payload, used only to derive this transaction's
	/// hash for Merkle-root and relevance bookkeeping.
	pub payload: Vec<u8>,
	/// BIP 65-style lock time: either a block height or a unix timestamp,
	/// distinguished by `LOCKTIME_THRESHOLD`. Zero means "always final".
	pub lock_time: u32,
}

impl Hashed for Transaction {
	fn bytes(&self) -> Vec<u8> {
		self.payload.clone()
	}
}

impl Transaction {
	/// Whether this transaction may be included in a block at the given
	/// height and time, per its `lock_time`.
	pub fn is_final(&self, height: u64, time_seconds: i64) -> bool {
		if self.lock_time == 0 {
			return true;
		}
		if self.lock_time < LOCKTIME_THRESHOLD {
			(self.lock_time as u64) < height
		} else {
			(self.lock_time as i64) < time_seconds
		}
	}
}

/// A full block: header plus, outside SPV mode, its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
	/// The block header.
	pub header: BlockHeader,
	/// `None` for a header-only (SPV) block; `Some` once transactions are
	/// known, even if the vector happens to be empty (callers must still
	/// reject an empty block as structurally invalid).
	pub transactions: Option<Vec<Transaction>>,
}

impl Hashed for Block {
	fn bytes(&self) -> Vec<u8> {
		self.header.bytes()
	}
}

impl Block {
	/// Structural + proof-of-work verification of the header alone.
	pub fn verify_header(&self, now: i64) -> Result<(), HeaderError> {
		self.header.verify_header(now)
	}

	/// Structural verification of the transaction list: non-empty, and its
	/// Merkle root matches the header's claim. Skipped entirely for blocks
	/// the caller has determined are irrelevant, which is the whole point
	/// of SPV mode.
	pub fn verify_transactions(&self) -> Result<(), TransactionsError> {
		let txs = self
			.transactions
			.as_ref()
			.ok_or(TransactionsError::MissingTransactions)?;
		if txs.is_empty() {
			return Err(TransactionsError::Empty);
		}
		let root = merkle_root(txs.iter().map(|t| t.hash()).collect());
		if root != self.header.merkle_root {
			return Err(TransactionsError::BadMerkleRoot);
		}
		Ok(())
	}
}

/// Computes a Merkle root over transaction hashes, duplicating the last
/// entry on odd-sized rows (the classic construction). A real node derives
/// this as part of block/transaction parsing; it's reproduced here only so
/// the chain manager's own structural check has something to compare
/// against.
pub fn merkle_root(mut hashes: Vec<Hash>) -> Hash {
	if hashes.is_empty() {
		return ZERO_HASH;
	}
	while hashes.len() > 1 {
		if hashes.len() % 2 == 1 {
			let last = *hashes.last().unwrap();
			hashes.push(last);
		}
		hashes = hashes
			.chunks(2)
			.map(|pair| {
				let mut buf = Vec::with_capacity(64);
				buf.extend_from_slice(pair[0].as_bytes());
				buf.extend_from_slice(pair[1].as_bytes());
				Hash(sha256d(&buf))
			})
			.collect();
	}
	hashes[0]
}

#[cfg(test)]
mod test {
	use super::*;

	fn tx(payload: &[u8], lock_time: u32) -> Transaction {
		Transaction {
			payload: payload.to_vec(),
			lock_time,
		}
	}

	#[test]
	fn zero_locktime_is_always_final() {
		assert!(tx(b"a", 0).is_final(0, 0));
	}

	#[test]
	fn height_locktime_respects_threshold() {
		let t = tx(b"a", 100);
		assert!(!t.is_final(100, 0));
		assert!(t.is_final(101, 0));
	}

	#[test]
	fn time_locktime_respects_threshold() {
		let t = tx(b"a", LOCKTIME_THRESHOLD + 10);
		assert!(!t.is_final(0, (LOCKTIME_THRESHOLD + 10) as i64));
		assert!(t.is_final(0, (LOCKTIME_THRESHOLD + 11) as i64));
	}

	#[test]
	fn merkle_root_of_single_tx_is_its_hash() {
		let t = tx(b"only", 0);
		assert_eq!(merkle_root(vec![t.hash()]), t.hash());
	}

	#[test]
	fn merkle_root_duplicates_last_on_odd_count() {
		let a = tx(b"a", 0).hash();
		let b = tx(b"b", 0).hash();
		let c = tx(b"c", 0).hash();
		let with_dup = merkle_root(vec![a, b, c, c]);
		let odd = merkle_root(vec![a, b, c]);
		assert_eq!(with_dup, odd);
	}

	#[test]
	fn verify_transactions_checks_merkle_root() {
		let t = tx(b"a", 0);
		let mut header = BlockHeader::genesis(0x207f_ffff, 0);
		header.merkle_root = t.hash();
		let block = Block {
			header,
			transactions: Some(vec![t]),
		};
		assert!(block.verify_transactions().is_ok());
	}

	#[test]
	fn verify_transactions_rejects_empty_block() {
		let block = Block {
			header: BlockHeader::genesis(0x207f_ffff, 0),
			transactions: Some(vec![]),
		};
		assert_eq!(block.verify_transactions(), Err(TransactionsError::Empty));
	}
}
