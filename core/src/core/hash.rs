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

//! Hash function
//!
//! Primary hash type used to identify blocks and transactions throughout
//! the chain manager. The core treats a `Hash` as an opaque 32-byte
//! identifier; only the difficulty engine interprets it as an integer.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// A 32-byte hash identifying a block header or transaction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

/// All-zero hash, used as the "previous" pointer of the genesis block.
pub const ZERO_HASH: Hash = Hash([0; 32]);

impl Hash {
	/// Builds a hash from a byte slice, panicking if it isn't 32 bytes long.
	pub fn from_slice(v: &[u8]) -> Hash {
		let mut a = [0u8; 32];
		a.copy_from_slice(v);
		Hash(a)
	}

	/// Raw bytes making up the hash.
	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	/// Interprets the hash as a big-endian 256-bit integer. Used by the
	/// difficulty engine to compare a header's hash against its target.
	pub fn as_uint(&self) -> BigUint {
		BigUint::from_bytes_be(&self.0)
	}
}

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self)
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for b in self.0.iter() {
			write!(f, "{:02x}", b)?;
		}
		Ok(())
	}
}

impl FromStr for Hash {
	type Err = String;

	fn from_str(s: &str) -> Result<Hash, String> {
		if s.len() != 64 {
			return Err(format!("invalid hash length: {}", s.len()));
		}
		let mut out = [0u8; 32];
		for i in 0..32 {
			out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
				.map_err(|e| format!("invalid hash hex: {}", e))?;
		}
		Ok(Hash(out))
	}
}

impl PartialOrd for Hash {
	fn partial_cmp(&self, other: &Hash) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Hash {
	fn cmp(&self, other: &Hash) -> Ordering {
		self.0.cmp(&other.0)
	}
}

/// A trait for types that derive their identity from a double-SHA256 of
/// their byte serialization. The real wire serialization lives with the
/// block/transaction module; this default is sufficient for anything the
/// chain manager needs to hash on its own (e.g. building test fixtures).
pub trait Hashed {
	/// Computes the hash of `self`.
	fn hash(&self) -> Hash {
		Hash(sha256d(&self.bytes()))
	}

	/// Byte representation that feeds the hash.
	fn bytes(&self) -> Vec<u8>;
}

/// Double SHA-256, the hash construction used throughout the Bitcoin family
/// of proof-of-work chains this engine targets.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
	let first = Sha256::digest(data);
	let second = Sha256::digest(&first);
	let mut out = [0u8; 32];
	out.copy_from_slice(&second);
	out
}

impl Hashed for [u8] {
	fn bytes(&self) -> Vec<u8> {
		self.to_owned()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn hash_round_trips_through_hex() {
		let h = Hash(sha256d(b"lodestone"));
		let s = h.to_string();
		let back = Hash::from_str(&s).unwrap();
		assert_eq!(h, back);
	}

	#[test]
	fn zero_hash_is_all_zero_bytes() {
		assert_eq!(ZERO_HASH.as_bytes(), &[0u8; 32]);
	}

	#[test]
	fn distinct_inputs_hash_differently() {
		let a = Hash(sha256d(b"a"));
		let b = Hash(sha256d(b"b"));
		assert_ne!(a, b);
	}
}
