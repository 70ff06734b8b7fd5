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

//! Difficulty retarget engine. Four algorithms are live across the history
//! of this chain, selected purely by height (and, early on, by network):
//! the classic 2016-block retarget, Kimoto Gravity Well, and two
//! generations of Dark Gravity Wave. All four compute a target for the
//! candidate block from the header chain below it; none of them need
//! transaction content, so this module has no dependency on validation
//! mode.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use lodestone_core::consensus;
use lodestone_core::core::block::BlockHeader;
use lodestone_core::core::hash::Hash;
use lodestone_core::core::stored_block::StoredBlock;
use lodestone_core::core::target::{compact_to_target, mask_to_compact_precision};
use lodestone_core::global::Network;

use crate::error::{Error, ErrorKind};

/// Looks up a previously-connected block by hash. Implemented by whatever
/// can walk the store's header chain; never needs to see orphans, since the
/// engine only ever walks backward from an already-connected block.
pub trait HeaderProvider {
	fn get(&self, hash: &Hash) -> Option<StoredBlock>;
}

impl<F> HeaderProvider for F
where
	F: Fn(&Hash) -> Option<StoredBlock>,
{
	fn get(&self, hash: &Hash) -> Option<StoredBlock> {
		self(hash)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
	V1,
	Kgw,
	Dgw1,
	Dgw3,
}

fn select_algorithm(network: Network, height: u64) -> Algorithm {
	match network {
		Network::Testnet => {
			if height < consensus::TESTNET_DGW3_START_HEIGHT {
				Algorithm::V1
			} else {
				Algorithm::Dgw3
			}
		}
		Network::Mainnet => {
			if height < consensus::MAINNET_KGW_START_HEIGHT {
				Algorithm::V1
			} else if height < consensus::MAINNET_DGW1_START_HEIGHT {
				Algorithm::Kgw
			} else if height < consensus::MAINNET_DGW3_START_HEIGHT {
				Algorithm::Dgw1
			} else {
				Algorithm::Dgw3
			}
		}
	}
}

fn pow_limit() -> BigUint {
	compact_to_target(consensus::PROOF_OF_WORK_LIMIT)
}

fn clamp_to_limit(target: BigUint) -> BigUint {
	let limit = pow_limit();
	if target > limit {
		limit
	} else {
		target
	}
}

/// Computes the target the candidate at `height` (whose parent is `prev`)
/// must meet, without yet comparing it to what the candidate actually
/// claims.
pub fn compute_next_target<H: HeaderProvider>(
	candidate: &BlockHeader,
	height: u64,
	prev: &StoredBlock,
	network: Network,
	headers: &H,
) -> Result<BigUint, Error> {
	match select_algorithm(network, height) {
		Algorithm::V1 => v1_target(candidate, height, prev, network, headers),
		Algorithm::Kgw => kgw_target(height, prev, headers),
		Algorithm::Dgw1 => dgw1_target(prev, headers),
		Algorithm::Dgw3 => dgw3_target(prev, headers),
	}
}

/// Verifies that `candidate`'s claimed target (`candidate.bits`) is the one
/// the retarget algorithm in effect at `height` actually produces, applying
/// the era-appropriate comparison tolerance.
pub fn verify_difficulty<H: HeaderProvider>(
	candidate: &BlockHeader,
	height: u64,
	prev: &StoredBlock,
	network: Network,
	headers: &H,
) -> Result<(), Error> {
	let computed = clamp_to_limit(compute_next_target(candidate, height, prev, network, headers)?);
	let masked_computed = mask_to_compact_precision(&computed, candidate.bits);
	let candidate_target = candidate.difficulty_target_as_integer();

	if network == Network::Testnet {
		if masked_computed != candidate_target {
			return Err(ErrorKind::InvalidBlock(format!(
				"difficulty target mismatch at height {}",
				height
			))
			.into());
		}
		return Ok(());
	}

	if height <= consensus::MAINNET_DGW3_START_HEIGHT {
		let limit = pow_limit();
		let computed_difficulty = target_to_difficulty(&masked_computed, &limit);
		let candidate_difficulty = target_to_difficulty(&candidate_target, &limit);
		if computed_difficulty <= 0.0 {
			return Err(ErrorKind::InvalidBlock("degenerate computed difficulty".into()).into());
		}
		let drift = (computed_difficulty - candidate_difficulty).abs() / computed_difficulty;
		if drift > 0.20 {
			return Err(ErrorKind::InvalidBlock(format!(
				"difficulty target drifted {:.1}% from the computed value at height {}",
				drift * 100.0,
				height
			))
			.into());
		}
	} else if masked_computed != candidate_target {
		return Err(ErrorKind::InvalidBlock(format!(
			"difficulty target mismatch at height {}",
			height
		))
		.into());
	}
	Ok(())
}

fn target_to_difficulty(target: &BigUint, limit: &BigUint) -> f64 {
	let limit_f = limit.to_f64().unwrap_or(f64::MAX);
	let target_f = target.to_f64().unwrap_or(f64::MAX);
	if target_f == 0.0 {
		return f64::MAX;
	}
	limit_f / target_f
}

fn v1_target<H: HeaderProvider>(
	candidate: &BlockHeader,
	height: u64,
	prev: &StoredBlock,
	network: Network,
	headers: &H,
) -> Result<BigUint, Error> {
	if height % consensus::DIFFICULTY_ADJUSTMENT_INTERVAL != 0 {
		if network == Network::Testnet {
			let delta = candidate.time_seconds() - prev.header.time_seconds();
			if delta > 2 * consensus::TARGET_SPACING {
				return Ok(pow_limit());
			}
		}
		return Ok(prev.header.difficulty_target_as_integer());
	}

	let go_back = if height == consensus::DIFFICULTY_ADJUSTMENT_INTERVAL {
		consensus::DIFFICULTY_ADJUSTMENT_INTERVAL - 1
	} else {
		consensus::DIFFICULTY_ADJUSTMENT_INTERVAL
	};

	let mut cursor = prev.clone();
	for _ in 0..go_back {
		cursor = headers.get(&cursor.header.previous).ok_or_else(|| {
			ErrorKind::InvalidBlock("insufficient header history for retarget".into())
		})?;
	}

	let elapsed = prev.header.time_seconds() - cursor.header.time_seconds();
	let clamped = elapsed
		.max(consensus::TARGET_TIMESPAN / 4)
		.min(consensus::TARGET_TIMESPAN * 4);

	let prev_target = prev.header.difficulty_target_as_integer();
	let new_target =
		(prev_target * BigUint::from(clamped as u64)) / BigUint::from(consensus::TARGET_TIMESPAN as u64);
	Ok(clamp_to_limit(new_target))
}

/// Kimoto Gravity Well. Walks back from `prev` sampling between
/// `KGW_PAST_BLOCKS_MIN` and `KGW_PAST_BLOCKS_MAX` blocks, maintaining a
/// running average target and a running ratio of target-to-actual block
/// spacing, and stops early once that ratio crosses the event-horizon
/// deviation bound for the number of blocks sampled so far.
fn kgw_target<H: HeaderProvider>(
	height: u64,
	prev: &StoredBlock,
	headers: &H,
) -> Result<BigUint, Error> {
	if prev.height < consensus::KGW_PAST_BLOCKS_MIN {
		return Ok(pow_limit());
	}

	let last_solved_time = prev.header.time_seconds();
	let mut latest_block_time = last_solved_time;

	let mut reading = prev.clone();
	let mut past_blocks_mass: u64 = 0;
	let mut past_difficulty_average = BigUint::zero();
	let mut past_difficulty_average_prev = BigUint::zero();
	let mut past_rate_actual_seconds: i64 = 0;
	let mut past_rate_target_seconds: i64 = 0;

	let mut i: u64 = 1;
	while reading.height > 0 {
		if i > consensus::KGW_PAST_BLOCKS_MAX {
			break;
		}
		past_blocks_mass += 1;

		let reading_target = reading.header.difficulty_target_as_integer();
		past_difficulty_average = if i == 1 {
			reading_target
		} else if reading_target >= past_difficulty_average_prev {
			(&reading_target - &past_difficulty_average_prev) / BigUint::from(i)
				+ &past_difficulty_average_prev
		} else {
			&past_difficulty_average_prev
				- (&past_difficulty_average_prev - &reading_target) / BigUint::from(i)
		};
		past_difficulty_average_prev = past_difficulty_average.clone();

		if height > consensus::KGW_STRICT_TIME_HEIGHT {
			if latest_block_time < reading.header.time_seconds() {
				latest_block_time = reading.header.time_seconds();
			}
			past_rate_actual_seconds = latest_block_time - reading.header.time_seconds();
		} else {
			past_rate_actual_seconds = last_solved_time - reading.header.time_seconds();
		}
		past_rate_target_seconds = consensus::TARGET_SPACING * past_blocks_mass as i64;

		if past_rate_actual_seconds < 0 {
			past_rate_actual_seconds = 0;
		}
		if height > consensus::KGW_STRICT_TIME_HEIGHT && past_rate_actual_seconds < 5 {
			past_rate_actual_seconds = 5;
		}

		let mut past_rate_adjustment_ratio = 1.0f64;
		if past_rate_actual_seconds != 0 && past_rate_target_seconds != 0 {
			past_rate_adjustment_ratio =
				past_rate_target_seconds as f64 / past_rate_actual_seconds as f64;
		}

		let event_horizon_deviation =
			1.0 + (0.7084 * (past_blocks_mass as f64 / 28.2).powf(-1.228));
		let event_horizon_deviation_fast = event_horizon_deviation;
		let event_horizon_deviation_slow = 1.0 / event_horizon_deviation;

		if past_blocks_mass >= consensus::KGW_PAST_BLOCKS_MIN
			&& (past_rate_adjustment_ratio <= event_horizon_deviation_slow
				|| past_rate_adjustment_ratio >= event_horizon_deviation_fast)
		{
			break;
		}

		match headers.get(&reading.header.previous) {
			Some(parent) => reading = parent,
			None => break,
		}
		i += 1;
	}

	let mut new_target = past_difficulty_average;
	if past_rate_actual_seconds != 0 && past_rate_target_seconds != 0 {
		new_target = (new_target * BigUint::from(past_rate_actual_seconds as u64))
			/ BigUint::from(past_rate_target_seconds as u64);
	}
	Ok(clamp_to_limit(new_target))
}

/// Dark Gravity Wave v1: walks back up to `DGW1_PAST_BLOCKS`, requiring at
/// least `DGW1_PAST_BLOCKS_MIN`, blending a moving and a simple average of
/// the inter-block spacing into a single "smart" average used to scale the
/// retarget window.
fn dgw1_target<H: HeaderProvider>(prev: &StoredBlock, headers: &H) -> Result<BigUint, Error> {
	if prev.height < consensus::DGW1_PAST_BLOCKS_MIN {
		return Ok(pow_limit());
	}

	let mut reading = prev.clone();
	let mut count_blocks: u64 = 0;
	let mut past_difficulty_average = BigUint::zero();
	let mut past_difficulty_average_prev = BigUint::zero();
	let mut moving_average_time = 0f64;
	let mut block_time_sum = 0f64;
	let mut last_block_time = 0i64;

	loop {
		if count_blocks >= consensus::DGW1_PAST_BLOCKS {
			break;
		}
		count_blocks += 1;

		let reading_target = reading.header.difficulty_target_as_integer();
		past_difficulty_average = if count_blocks == 1 {
			reading_target
		} else {
			(past_difficulty_average_prev.clone() * (count_blocks as u32) + reading_target)
				/ (count_blocks as u32 + 1)
		};
		past_difficulty_average_prev = past_difficulty_average.clone();

		if last_block_time > 0 {
			let diff = (last_block_time - reading.header.time_seconds()) as f64;
			block_time_sum += diff;
			moving_average_time =
				((moving_average_time * (count_blocks - 1) as f64) + diff) / count_blocks as f64;
		}
		last_block_time = reading.header.time_seconds();

		if reading.height == 0 {
			break;
		}
		match headers.get(&reading.header.previous) {
			Some(parent) => reading = parent,
			None => break,
		}
	}

	let simple_average_time = if count_blocks > 1 {
		block_time_sum / (count_blocks - 1) as f64
	} else {
		consensus::TARGET_SPACING as f64
	};
	let smart_average = 0.7 * moving_average_time + 0.3 * simple_average_time;
	let smart_average = if smart_average <= 0.0 {
		consensus::TARGET_SPACING as f64
	} else {
		smart_average
	};

	let shift = consensus::TARGET_SPACING as f64 / smart_average;
	let target_timespan = count_blocks as i64 * consensus::TARGET_SPACING;
	let mut actual_timespan = ((count_blocks as f64 * consensus::TARGET_SPACING as f64) / shift) as i64;

	actual_timespan = actual_timespan
		.max(target_timespan / 3)
		.min(target_timespan * 3);

	let new_target = (past_difficulty_average * BigUint::from(actual_timespan as u64))
		/ BigUint::from(target_timespan as u64);
	Ok(clamp_to_limit(new_target))
}

/// Dark Gravity Wave v3: a simpler cumulative moving average over exactly
/// `DGW3_PAST_BLOCKS` blocks, with the same timespan clamp as v1.
fn dgw3_target<H: HeaderProvider>(prev: &StoredBlock, headers: &H) -> Result<BigUint, Error> {
	let window = consensus::DGW3_PAST_BLOCKS;
	if prev.height < window {
		return Ok(pow_limit());
	}

	let mut reading = prev.clone();
	let mut count_blocks: u64 = 0;
	let mut average = BigUint::zero();

	loop {
		if count_blocks >= window {
			break;
		}
		count_blocks += 1;

		let reading_target = reading.header.difficulty_target_as_integer();
		average = if count_blocks == 1 {
			reading_target
		} else {
			(average.clone() * (count_blocks as u32 - 1) + reading_target) / (count_blocks as u32)
		};

		if reading.height == 0 {
			break;
		}
		match headers.get(&reading.header.previous) {
			Some(parent) => reading = parent,
			None => break,
		}
	}

	let actual_timespan = prev.header.time_seconds() - reading.header.time_seconds();
	let target_timespan = count_blocks as i64 * consensus::TARGET_SPACING;
	let actual_timespan = actual_timespan
		.max(target_timespan / 3)
		.min(target_timespan * 3);

	let new_target =
		(average * BigUint::from(actual_timespan as u64)) / BigUint::from(target_timespan as u64);
	Ok(clamp_to_limit(new_target))
}

#[cfg(test)]
mod test {
	use super::*;
	use lodestone_core::core::hash::{Hashed, ZERO_HASH};
	use std::collections::HashMap;

	fn header(previous: Hash, time: u32, bits: u32) -> BlockHeader {
		BlockHeader {
			version: 1,
			previous,
			merkle_root: ZERO_HASH,
			time,
			bits,
			nonce: 0,
		}
	}

	fn chain_map(len: usize, spacing: u32, bits: u32) -> (HashMap<Hash, StoredBlock>, StoredBlock) {
		let mut map = HashMap::new();
		let mut current = StoredBlock::genesis(header(ZERO_HASH, 0, bits));
		map.insert(current.hash(), current.clone());
		for i in 1..len {
			let h = header(current.hash(), i as u32 * spacing, bits);
			current = current.build(h);
			map.insert(current.hash(), current.clone());
		}
		(map, current)
	}

	#[test]
	fn v1_keeps_target_between_retarget_heights() {
		let (map, tip) = chain_map(5, 150, 0x1d00_ffff);
		let provider = move |h: &Hash| map.get(h).cloned();
		let candidate = header(tip.hash(), tip.header.time + 150, 0x1d00_ffff);
		let target = v1_target(&candidate, tip.height + 1, &tip, Network::Mainnet, &provider).unwrap();
		assert_eq!(target, tip.header.difficulty_target_as_integer());
	}

	#[test]
	fn v1_retargets_on_schedule() {
		let len = consensus::DIFFICULTY_ADJUSTMENT_INTERVAL as usize;
		let (map, tip) = chain_map(len, 150, 0x1d00_ffff);
		let provider = move |h: &Hash| map.get(h).cloned();
		let candidate = header(tip.hash(), tip.header.time + 150, 0x1d00_ffff);
		let target = v1_target(&candidate, tip.height + 1, &tip, Network::Mainnet, &provider).unwrap();
		// Blocks arrived exactly on schedule, so the retarget should leave
		// the target roughly unchanged.
		let prev_target = tip.header.difficulty_target_as_integer();
		let diff = if target > prev_target {
			&target - &prev_target
		} else {
			&prev_target - &target
		};
		assert!(diff < prev_target / 100u32);
	}

	#[test]
	fn kgw_falls_back_to_limit_below_minimum_history() {
		let (map, tip) = chain_map(5, 150, 0x1d00_ffff);
		let provider = move |h: &Hash| map.get(h).cloned();
		let target = kgw_target(tip.height + 1, &tip, &provider).unwrap();
		assert_eq!(target, pow_limit());
	}

	#[test]
	fn dgw3_falls_back_to_limit_below_minimum_history() {
		let (map, tip) = chain_map(5, 150, 0x1d00_ffff);
		let provider = move |h: &Hash| map.get(h).cloned();
		let target = dgw3_target(&tip, &provider).unwrap();
		assert_eq!(target, pow_limit());
	}

	#[test]
	fn select_algorithm_follows_height_thresholds() {
		assert_eq!(select_algorithm(Network::Mainnet, 0), Algorithm::V1);
		assert_eq!(
			select_algorithm(Network::Mainnet, consensus::MAINNET_KGW_START_HEIGHT),
			Algorithm::Kgw
		);
		assert_eq!(
			select_algorithm(Network::Mainnet, consensus::MAINNET_DGW1_START_HEIGHT),
			Algorithm::Dgw1
		);
		assert_eq!(
			select_algorithm(Network::Mainnet, consensus::MAINNET_DGW3_START_HEIGHT),
			Algorithm::Dgw3
		);
		assert_eq!(select_algorithm(Network::Testnet, 0), Algorithm::V1);
		assert_eq!(
			select_algorithm(Network::Testnet, consensus::TESTNET_DGW3_START_HEIGHT),
			Algorithm::Dgw3
		);
	}
}
