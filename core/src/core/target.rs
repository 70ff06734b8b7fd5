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

//! Compact-encoded proof-of-work targets and the cumulative work they
//! represent. A block is valid only if its hash, read as a 256-bit
//! integer, is strictly below its target; cumulative work is the sum,
//! over a chain, of `floor(2^256 / (target + 1))` per block and is what
//! the chain manager uses to pick the best branch.

use std::fmt;
use std::ops::Add;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Decodes a compact ("nBits") 32-bit encoding into the full 256-bit target
/// it represents: one byte of exponent followed by a 3-byte mantissa, the
/// same encoding Bitcoin-family coins use on the wire.
pub fn compact_to_target(compact: u32) -> BigUint {
	let exponent = (compact >> 24) as i32;
	let mantissa = compact & 0x007f_ffff;

	if exponent <= 3 {
		let mantissa = mantissa >> (8 * (3 - exponent));
		BigUint::from(mantissa)
	} else {
		BigUint::from(mantissa) << (8 * (exponent - 3)) as usize
	}
}

/// Re-encodes a 256-bit target into its compact representation, rounding
/// down to the nearest representable value (losing precision the same way
/// the reference coins do).
pub fn target_to_compact(target: &BigUint) -> u32 {
	let bytes = target.to_bytes_be();
	let bytes: Vec<u8> = bytes.into_iter().skip_while(|&b| b == 0).collect();
	let mut size = bytes.len() as u32;

	let mantissa: u32 = if bytes.is_empty() {
		0
	} else if size >= 3 {
		((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32)
	} else {
		let mut padded = vec![0u8; 3 - bytes.len()];
		padded.extend_from_slice(&bytes);
		((padded[0] as u32) << 16) | ((padded[1] as u32) << 8) | (padded[2] as u32)
	};

	let mut mantissa = mantissa;
	if mantissa & 0x0080_0000 != 0 {
		mantissa >>= 8;
		size += 1;
	}

	(size << 24) | mantissa
}

/// Returns the target masked down to the precision implied by
/// `accuracy_bytes = (compact >> 24) - 3`, the masking step the difficulty
/// comparison performs to absorb compact-encoding rounding before checking
/// equality or tolerance.
pub fn mask_to_compact_precision(target: &BigUint, compact: u32) -> BigUint {
	let accuracy_bytes = ((compact >> 24) as i32) - 3;
	if accuracy_bytes <= 0 {
		return target.clone();
	}
	let shift = accuracy_bytes as usize * 8;
	(target >> shift) << shift
}

/// Cumulative proof-of-work performed, an arbitrary-precision unsigned
/// integer. The best chain is the one with the greatest total work, not
/// necessarily the tallest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Work(BigUint);

impl Work {
	/// The zero amount of work, assigned to nothing but used as an additive
	/// identity.
	pub fn zero() -> Work {
		Work(BigUint::zero())
	}

	/// Work represented by a single block with the given target: the number
	/// of hash attempts expected to produce a hash below it.
	pub fn from_target(target: &BigUint) -> Work {
		let denom = target + BigUint::one();
		let max = BigUint::one() << 256usize;
		Work(max / denom)
	}

	/// Work represented by a compact-encoded target.
	pub fn from_compact(compact: u32) -> Work {
		Work::from_target(&compact_to_target(compact))
	}

	/// Underlying big integer.
	pub fn as_biguint(&self) -> &BigUint {
		&self.0
	}
}

impl Add for Work {
	type Output = Work;
	fn add(self, other: Work) -> Work {
		Work(self.0 + other.0)
	}
}

impl<'a> Add<&'a Work> for Work {
	type Output = Work;
	fn add(self, other: &'a Work) -> Work {
		Work(self.0 + &other.0)
	}
}

impl fmt::Display for Work {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Work {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.0.to_str_radix(10))
	}
}

impl<'de> Deserialize<'de> for Work {
	fn deserialize<D>(deserializer: D) -> Result<Work, D::Error>
	where
		D: Deserializer<'de>,
	{
		struct WorkVisitor;
		impl<'de> de::Visitor<'de> for WorkVisitor {
			type Value = Work;

			fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
				f.write_str("a decimal cumulative-work string")
			}

			fn visit_str<E>(self, s: &str) -> Result<Work, E>
			where
				E: de::Error,
			{
				BigUint::parse_bytes(s.as_bytes(), 10)
					.map(Work)
					.ok_or_else(|| de::Error::invalid_value(de::Unexpected::Str(s), &self))
			}
		}
		deserializer.deserialize_str(WorkVisitor)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn compact_round_trips_for_typical_targets() {
		for compact in &[0x1d00_ffffu32, 0x1b0f_f101, 0x207f_ffff] {
			let target = compact_to_target(*compact);
			let back = target_to_compact(&target);
			assert_eq!(*compact, back, "round trip failed for {:#x}", compact);
		}
	}

	#[test]
	fn lower_target_means_more_work() {
		let easy = Work::from_compact(0x207f_ffff);
		let hard = Work::from_compact(0x1d00_ffff);
		assert!(hard > easy);
	}

	#[test]
	fn work_accumulates_additively() {
		let a = Work::from_compact(0x1d00_ffff);
		let b = a.clone();
		let total = a + b.clone();
		assert_eq!(total, Work(b.as_biguint() * 2u32));
	}

	#[test]
	fn masking_drops_precision_below_accuracy_bytes() {
		let compact = 0x1d00_ffffu32;
		let target = compact_to_target(compact);
		let masked = mask_to_compact_precision(&target, compact);
		assert_eq!(masked, target);
	}
}
