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

//! Consensus-relevant constants: retarget intervals, difficulty-algorithm
//! height boundaries and the handful of historical quirks that must be
//! preserved bit-for-bit to stay on the accepted chain.

/// Blocks between classic (V1) retargets.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 2016;

/// Target spacing between blocks, in seconds. Also the divisor used to turn
/// the Kimoto Gravity Well's second-denominated window bounds into a block
/// count.
pub const TARGET_SPACING: i64 = 150;

/// Target duration, in seconds, of `DIFFICULTY_ADJUSTMENT_INTERVAL` blocks
/// at `TARGET_SPACING`. Used by the V1 retarget.
pub const TARGET_TIMESPAN: i64 = DIFFICULTY_ADJUSTMENT_INTERVAL as i64 * TARGET_SPACING;

/// Compact encoding of the loosest allowed target (lowest difficulty).
pub const PROOF_OF_WORK_LIMIT: u32 = 0x1e0f_ffff;

/// Height at which mainnet switches from the V1 classic retarget to the
/// Kimoto Gravity Well.
pub const MAINNET_KGW_START_HEIGHT: u64 = 15_200;

/// Height at which mainnet switches from the Kimoto Gravity Well to
/// Dark Gravity Wave v1.
pub const MAINNET_DGW1_START_HEIGHT: u64 = 34_140;

/// Height at which mainnet switches from Dark Gravity Wave v1 to v3, and
/// stays on v3 thereafter.
pub const MAINNET_DGW3_START_HEIGHT: u64 = 68_589;

/// Height at which the Kimoto Gravity Well starts enforcing a time-travel
/// clamp and a minimum actual-seconds floor. Purely a historical wrinkle;
/// unreachable once mainnet has moved past `MAINNET_DGW1_START_HEIGHT`, but
/// preserved in case a chain ever stalls on KGW past this point.
pub const KGW_STRICT_TIME_HEIGHT: u64 = 646_120;

/// Height below which testnet uses the V1 classic retarget; at and above it
/// testnet runs Dark Gravity Wave v3 directly.
pub const TESTNET_DGW3_START_HEIGHT: u64 = 16;

/// `2012-02-15T00:00:00Z`, the historical testnet minimum-difficulty cutoff
/// date from the reference client. Verbatim per the source: whether this
/// coin's testnet ever actually reached it is unclear, but the rule must be
/// kept intact to accept the historical chain.
pub const TESTNET_MINDIFF_SWITCH_TIME: i64 = 1_329_264_000;

/// Minimum number of past blocks the Kimoto Gravity Well must sample
/// before its event-horizon early exit is allowed to fire.
pub const KGW_PAST_BLOCKS_MIN: u64 = (KGW_PAST_SECONDS_MIN / TARGET_SPACING) as u64;

/// Maximum number of past blocks the Kimoto Gravity Well will ever sample.
pub const KGW_PAST_BLOCKS_MAX: u64 = (KGW_PAST_SECONDS_MAX / TARGET_SPACING) as u64;

const KGW_PAST_SECONDS_MIN: i64 = 86_400 / 40;
const KGW_PAST_SECONDS_MAX: i64 = 86_400 * 7;

/// Number of past blocks Dark Gravity Wave v1 samples.
pub const DGW1_PAST_BLOCKS: u64 = 140;

/// Minimum number of past blocks Dark Gravity Wave v1 requires before it
/// will retarget at all.
pub const DGW1_PAST_BLOCKS_MIN: u64 = 14;

/// Number of past blocks Dark Gravity Wave v3 samples; also its minimum,
/// since v3 simply refuses to retarget before this many blocks exist.
pub const DGW3_PAST_BLOCKS: u64 = 24;

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn kgw_block_bounds_match_the_second_based_window() {
		assert_eq!(KGW_PAST_BLOCKS_MIN, 14);
		assert_eq!(KGW_PAST_BLOCKS_MAX, 4032);
	}
}
