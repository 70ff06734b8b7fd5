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

//! Observer registration, dispatch and the false-positive rate estimator
//! that feeds bloom-filter adaptation for listeners receiving filtered
//! blocks.

use std::collections::HashSet;
use std::sync::Arc;

use lodestone_util::Mutex;

use lodestone_core::core::block::Transaction;
use lodestone_core::core::hash::Hash;
use lodestone_core::core::stored_block::StoredBlock;

use crate::types::FilteredBlock;

/// Whether a notified block sits on the current best chain or a side
/// branch at the moment it is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
	BestChain,
	SideChain,
}

/// A registered observer. Relevance probing is fallible: a script error is
/// logged and treated as "not relevant", never propagated, so a listener's
/// bug can never fork the node off its own chain.
pub trait Listener: Send + Sync {
	/// Whether `tx` matters to this listener. Errors (e.g. a scripting
	/// failure while inspecting the transaction) are swallowed by the
	/// dispatcher and logged.
	fn is_transaction_relevant(&self, tx: &Transaction) -> Result<bool, String>;

	/// A transaction this listener flagged as relevant, delivered with its
	/// containing block and its position (`rel_offset`) among transactions
	/// delivered to this listener for this block.
	fn receive_from_block(
		&self,
		tx: &Transaction,
		stored: &StoredBlock,
		block_type: BlockType,
		rel_offset: u64,
	);

	/// A transaction hash the listener has no content for (it was filtered
	/// out by the peer), delivered purely so the listener knows something
	/// occupies this position in the block.
	fn notify_transaction_in_block(
		&self,
		hash: &Hash,
		stored: &StoredBlock,
		block_type: BlockType,
		rel_offset: u64,
	);

	/// `stored` has become, or remains, the chain head.
	fn notify_new_best_block(&self, stored: &StoredBlock);

	/// A reorg occurred: `old` (head-to-split order) is no longer on the
	/// best chain, `new` (head-to-split order) now is.
	fn reorganize(&self, split_point: &StoredBlock, old: &[StoredBlock], new: &[StoredBlock]);
}

/// Runs a task posted by the dispatcher off the calling thread. The
/// dispatcher never inspects how; it only needs to know dispatch here
/// cannot contribute to false-positive accounting, since the caller moves
/// on before the task runs.
pub trait TaskExecutor: Send + Sync {
	fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

/// Runs each posted task on its own spawned thread. Adequate for a
/// reference deployment; a production one would post to a shared pool.
pub struct ThreadSpawnExecutor;

impl TaskExecutor for ThreadSpawnExecutor {
	fn execute(&self, task: Box<dyn FnOnce() + Send>) {
		std::thread::spawn(task);
	}
}

/// How a registered listener wants its callbacks invoked.
#[derive(Clone)]
pub enum Executor {
	/// Invoked on the calling thread, inside the chain manager's exclusive
	/// lock. Eligible to contribute to false-positive accounting.
	Synchronous,
	/// Posted to a task executor and run off-thread. Never contributes to
	/// false-positive accounting, since its view of the candidate set would
	/// race the next block.
	Async(Arc<dyn TaskExecutor>),
}

struct Registration {
	listener: Arc<dyn Listener>,
	executor: Executor,
}

/// Ordered observer list plus the false-positive state the synchronous
/// delivery path feeds.
pub struct ListenerDispatcher {
	listeners: Vec<Registration>,
	estimator: Mutex<FalsePositiveEstimator>,
}

impl ListenerDispatcher {
	pub fn new() -> ListenerDispatcher {
		ListenerDispatcher {
			listeners: Vec::new(),
			estimator: Mutex::new(FalsePositiveEstimator::new()),
		}
	}

	pub fn add_listener(&mut self, listener: Arc<dyn Listener>, executor: Executor) {
		self.listeners.push(Registration { listener, executor });
	}

	pub fn remove_listener(&mut self, listener: &Arc<dyn Listener>) {
		self.listeners
			.retain(|r| !Arc::ptr_eq(&r.listener, listener));
	}

	/// Whether any synchronously-executed listener considers at least one of
	/// `txs` relevant. Feeds the relevance probe that decides whether an
	/// otherwise skippable block is worth structurally verifying in full.
	pub fn any_synchronous_listener_finds_relevant(&self, txs: &[Transaction]) -> bool {
		self.listeners.iter().any(|reg| {
			matches!(reg.executor, Executor::Synchronous)
				&& txs
					.iter()
					.any(|tx| reg.listener.is_transaction_relevant(tx).unwrap_or(false))
		})
	}

	pub fn false_positive_rate(&self) -> f64 {
		self.estimator.lock().rate()
	}

	pub fn reset_false_positive_estimate(&self) {
		self.estimator.lock().reset();
	}

	/// Delivers a newly connected block to every registered listener, in
	/// registration order. `is_filtered` distinguishes a bloom-filtered
	/// block (whose unmatched candidate count feeds the false-positive
	/// estimator) from a full block (which never does).
	pub fn dispatch_new_block(
		&self,
		block: &FilteredBlock,
		stored: &StoredBlock,
		block_type: BlockType,
		is_filtered: bool,
	) {
		let mut fp_candidates: HashSet<Hash> = if is_filtered {
			block.tx_subset.keys().cloned().collect()
		} else {
			HashSet::new()
		};

		for reg in &self.listeners {
			match &reg.executor {
				Executor::Synchronous => {
					inform_listener(
						reg.listener.as_ref(),
						block,
						stored,
						block_type,
						&mut fp_candidates,
					);
					if block_type == BlockType::BestChain {
						reg.listener.notify_new_best_block(stored);
					}
				}
				Executor::Async(executor) => {
					let listener = reg.listener.clone();
					let block = block.clone();
					let stored = stored.clone();
					executor.execute(Box::new(move || {
						let mut discarded = HashSet::new();
						inform_listener(&*listener, &block, &stored, block_type, &mut discarded);
						if block_type == BlockType::BestChain {
							listener.notify_new_best_block(&stored);
						}
					}));
				}
			}
		}

		if is_filtered {
			let mut estimator = self.estimator.lock();
			estimator.track_false_positives(fp_candidates.len() as f64);
			estimator.track_filtered_transactions(block.tx_hashes.len() as f64);
		}
	}

	/// Notifies every listener of a reorg. Always delivered synchronously
	/// and in registration order, regardless of each listener's executor:
	/// a reorg is rare and small enough that the ordering guarantee matters
	/// more than offloading it.
	pub fn dispatch_reorg(&self, split_point: &StoredBlock, old: &[StoredBlock], new: &[StoredBlock]) {
		for reg in &self.listeners {
			reg.listener.reorganize(split_point, old, new);
		}
	}
}

/// Delivers one block to one listener. Each transaction is cloned for the
/// listener rather than shared, which is what "copy-on-delivery" reduces
/// to once transactions are immutable values: no listener can observe
/// another's view of the same object changing underneath it.
fn inform_listener(
	listener: &dyn Listener,
	block: &FilteredBlock,
	stored: &StoredBlock,
	block_type: BlockType,
	fp_candidates: &mut HashSet<Hash>,
) {
	for (rel_offset, hash) in block.tx_hashes.iter().enumerate() {
		match block.tx_subset.get(hash) {
			Some(tx) => match listener.is_transaction_relevant(tx) {
				Ok(true) => {
					fp_candidates.remove(hash);
					listener.receive_from_block(tx, stored, block_type, rel_offset as u64);
				}
				Ok(false) => {}
				Err(e) => {
					log::warn!("listener relevance check failed, treating as not relevant: {}", e);
				}
			},
			None => {
				listener.notify_transaction_in_block(hash, stored, block_type, rel_offset as u64);
			}
		}
	}
}

const ALPHA: f64 = 1e-4;
const BETA: f64 = 1e-2;

/// Double-exponential moving average over the false-positive rate of
/// filtered blocks delivered to synchronous listeners.
pub struct FalsePositiveEstimator {
	rate: f64,
	trend: f64,
	prev_rate: f64,
}

impl FalsePositiveEstimator {
	pub fn new() -> FalsePositiveEstimator {
		FalsePositiveEstimator {
			rate: 0.0,
			trend: 0.0,
			prev_rate: 0.0,
		}
	}

	pub fn track_false_positives(&mut self, count: f64) {
		self.rate += ALPHA * count;
	}

	pub fn track_filtered_transactions(&mut self, count: f64) {
		let alpha_d = (1.0 - ALPHA).powf(count);
		let beta_d = (1.0 - BETA).powf(count);
		self.rate = alpha_d * self.rate;
		self.trend = BETA * count * (self.rate - self.prev_rate) + beta_d * self.trend;
		self.rate += alpha_d * self.trend;
		self.prev_rate = self.rate;
	}

	pub fn reset(&mut self) {
		self.rate = 0.0;
		self.trend = 0.0;
		self.prev_rate = 0.0;
	}

	pub fn rate(&self) -> f64 {
		self.rate.max(0.0)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn rate_never_negative() {
		let mut e = FalsePositiveEstimator::new();
		e.track_filtered_transactions(100.0);
		assert!(e.rate() >= 0.0);
	}

	#[test]
	fn false_positives_increase_rate() {
		let mut e = FalsePositiveEstimator::new();
		let before = e.rate();
		e.track_false_positives(10.0);
		assert!(e.rate() > before);
	}

	#[test]
	fn reset_zeros_all_state() {
		let mut e = FalsePositiveEstimator::new();
		e.track_false_positives(10.0);
		e.track_filtered_transactions(5.0);
		e.reset();
		assert_eq!(e.rate(), 0.0);
	}
}
