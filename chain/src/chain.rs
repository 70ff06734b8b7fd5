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

//! Facade to the block processing pipeline. Accepts candidate blocks,
//! verifies and classifies them, carries out reorgs, and dispatches the
//! result to registered listeners. Generic over the block store and the
//! validation-mode hooks so a header-only and a full-validation deployment
//! share one implementation rather than two parallel ones.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use lodestone_core::consensus;
use lodestone_core::core::block::{Block, BlockHeader, Transaction};
use lodestone_core::core::hash::{Hash, Hashed};
use lodestone_core::core::stored_block::StoredBlock;
use lodestone_core::global::Network;
use lodestone_store::BlockStore;
use lodestone_util::{Mutex, RwLock};

use crate::difficulty;
use crate::error::{Error, ErrorKind};
use crate::listener::{BlockType, Executor, Listener, ListenerDispatcher};
use crate::orphan::OrphanBlockPool;
use crate::pipe::{self, Classification};
use crate::reorg;
use crate::types::{ChainHooks, FilteredBlock};

const MEDIAN_TIME_SPAN: usize = 11;
/// Cap on the in-memory cache of full blocks kept around for side branches
/// so a later reorg can reconnect them without the block store's
/// (header-only) side-branch persistence having to know anything about
/// transaction content.
const FULL_BLOCK_CACHE_SIZE: usize = 200;

/// Either shape a candidate can arrive in at the public boundary.
enum BlockInput {
	Full(Block),
	Filtered(FilteredBlock),
}

impl BlockInput {
	fn header(&self) -> &BlockHeader {
		match self {
			BlockInput::Full(b) => &b.header,
			BlockInput::Filtered(f) => &f.header,
		}
	}

	fn into_filtered(self) -> FilteredBlock {
		match self {
			BlockInput::Full(b) => FilteredBlock::complete(&b),
			BlockInput::Filtered(f) => f,
		}
	}

	/// Rebuilds the input an orphan was buffered as. A block that arrived
	/// full is always buffered with a complete `tx_subset` (see
	/// `FilteredBlock::complete`), so it is reconstructed as `Full` here;
	/// a genuinely filtered block (one whose subset is incomplete) stays
	/// `Filtered`. Without this, re-submitting a drained orphan through the
	/// filtered path would trip full-validation mode's step-2 rejection of
	/// `Filtered` input and the block would never connect.
	fn from_filtered(orphan: FilteredBlock) -> BlockInput {
		let complete = orphan.tx_hashes.iter().all(|h| orphan.tx_subset.contains_key(h));
		if complete {
			let transactions = orphan
				.tx_hashes
				.iter()
				.map(|h| orphan.tx_subset[h].clone())
				.collect();
			BlockInput::Full(Block {
				header: orphan.header,
				transactions: Some(transactions),
			})
		} else {
			BlockInput::Filtered(orphan)
		}
	}
}

/// A small bounded cache of full blocks, keyed by hash, evicted in
/// insertion order. Not the block store: the store only ever keeps headers
/// for side branches, so full-validation reorg reconnection needs this
/// ancillary bookkeeping the chain manager itself owns.
struct FullBlockCache {
	blocks: HashMap<Hash, Block>,
	order: VecDeque<Hash>,
	cap: usize,
}

impl FullBlockCache {
	fn new(cap: usize) -> FullBlockCache {
		FullBlockCache {
			blocks: HashMap::new(),
			order: VecDeque::new(),
			cap,
		}
	}

	fn insert(&mut self, hash: Hash, block: Block) {
		if self.blocks.contains_key(&hash) {
			return;
		}
		if self.blocks.len() >= self.cap {
			if let Some(oldest) = self.order.pop_front() {
				self.blocks.remove(&oldest);
			}
		}
		self.blocks.insert(hash, block);
		self.order.push_back(hash);
	}

	fn get(&self, hash: &Hash) -> Option<&Block> {
		self.blocks.get(hash)
	}
}

/// Everything the broad lock protects besides the chain-head pointer
/// itself, which has its own narrow lock so reads stay cheap while an
/// `add()` is in flight.
struct MutableState {
	orphans: OrphanBlockPool,
	full_blocks: FullBlockCache,
}

/// A handle fulfilled exactly once, when the chain head reaches the
/// requested height. There is no by-height index in the block store
/// contract, so a height already behind the current head is fulfilled with
/// the head itself rather than the historical block at that height.
pub struct HeightFuture {
	receiver: Receiver<StoredBlock>,
}

impl HeightFuture {
	/// Blocks the calling thread until the height is reached.
	pub fn wait(self) -> StoredBlock {
		self.receiver
			.recv()
			.expect("chain dropped without ever reaching the requested height")
	}
}

/// The chain manager. `S` is the persistence and lookup contract; `K` is
/// the capability set a deployment mode (header-only or full-validation)
/// supplies. The two are tied together by `K::OutputChanges = S::UndoData`
/// so a store's undo data can be handed straight back to the hooks that
/// produced it during a reorg.
pub struct Chain<S: BlockStore, K: ChainHooks<OutputChanges = S::UndoData>> {
	store: Arc<S>,
	hooks: K,
	network: Network,
	head: RwLock<StoredBlock>,
	state: Mutex<MutableState>,
	dispatcher: Mutex<ListenerDispatcher>,
	checkpoints: Box<dyn Fn(u64, &Hash) -> bool + Send + Sync>,
	height_waiters: Mutex<HashMap<u64, Vec<Sender<StoredBlock>>>>,
}

impl<S, K> Chain<S, K>
where
	S: BlockStore,
	K: ChainHooks<OutputChanges = S::UndoData>,
{
	/// Builds a chain manager over an already-initialized store (one that
	/// already has a genesis block committed as its head).
	pub fn new(store: Arc<S>, hooks: K, network: Network, max_orphans: usize) -> Result<Chain<S, K>, Error> {
		let head = store.get_chain_head()?;
		Ok(Chain {
			store,
			hooks,
			network,
			head: RwLock::new(head),
			state: Mutex::new(MutableState {
				orphans: OrphanBlockPool::new(max_orphans),
				full_blocks: FullBlockCache::new(FULL_BLOCK_CACHE_SIZE),
			}),
			dispatcher: Mutex::new(ListenerDispatcher::new()),
			checkpoints: Box::new(|_height, _hash| true),
			height_waiters: Mutex::new(HashMap::new()),
		})
	}

	/// Installs a checkpoint gate. The default accepts every height/hash
	/// pair, which is correct for a network with no checkpoint list.
	pub fn with_checkpoints<F>(mut self, checkpoints: F) -> Chain<S, K>
	where
		F: Fn(u64, &Hash) -> bool + Send + Sync + 'static,
	{
		self.checkpoints = Box::new(checkpoints);
		self
	}

	// -- public read API, served off the narrow head lock or the dispatcher's own locking --

	/// The current chain head.
	pub fn get_chain_head(&self) -> StoredBlock {
		self.head.read().clone()
	}

	/// Height of the current chain head.
	pub fn get_best_height(&self) -> u64 {
		self.head.read().height
	}

	/// Crude projection of the timestamp a future block at `height` will
	/// carry, extrapolated from the current head at the network's target
	/// spacing. Not a substitute for the real timestamp of a historical
	/// block below the tip, which the store contract has no index for.
	pub fn estimate_block_time(&self, height: u64) -> i64 {
		let head = self.head.read();
		head.header.time_seconds() + (height as i64 - head.height as i64) * consensus::TARGET_SPACING
	}

	/// A handle fulfilled once the chain head reaches `height`.
	pub fn get_height_future(&self, height: u64) -> HeightFuture {
		let (tx, rx) = channel();
		let head = self.head.read().clone();
		if head.height >= height {
			let _ = tx.send(head);
		} else {
			self.height_waiters
				.lock()
				.entry(height)
				.or_insert_with(Vec::new)
				.push(tx);
		}
		HeightFuture { receiver: rx }
	}

	/// Whether `hash` is currently buffered as an orphan.
	pub fn is_orphan(&self, hash: &Hash) -> bool {
		self.state.lock().orphans.contains(hash)
	}

	/// Walks the orphan buffer upward from `hash`, returning the topmost
	/// orphan still without a known parent, or `None` if `hash` isn't
	/// itself buffered.
	pub fn get_orphan_root(&self, hash: &Hash) -> Option<Hash> {
		self.state.lock().orphans.get_orphan_root(hash)
	}

	/// Current estimate of the filter false-positive rate.
	pub fn get_false_positive_rate(&self) -> f64 {
		self.dispatcher.lock().false_positive_rate()
	}

	/// Zeros the false-positive estimator's state.
	pub fn reset_false_positive_estimate(&self) {
		self.dispatcher.lock().reset_false_positive_estimate();
	}

	/// Registers a listener, to be invoked per its chosen executor.
	pub fn add_listener(&self, listener: Arc<dyn Listener>, executor: Executor) {
		self.dispatcher.lock().add_listener(listener, executor);
	}

	/// Deregisters a previously added listener.
	pub fn remove_listener(&self, listener: &Arc<dyn Listener>) {
		self.dispatcher.lock().remove_listener(listener);
	}

	// -- mutating API --

	/// Accepts a block carrying its full transaction list. Returns `true`
	/// if it linked into the tree (best or side branch), `false` if it was
	/// buffered as an orphan awaiting its parent.
	pub fn add_full_block(&self, block: Block) -> Result<bool, Error> {
		let mut state = self.state.lock();
		self.add_internal(&mut state, BlockInput::Full(block), true)
	}

	/// Accepts a header plus a bloom-filter-matched transaction subset.
	/// Rejected outright in full-validation mode, which always requires
	/// complete transaction content.
	pub fn add_filtered_block(
		&self,
		header: BlockHeader,
		tx_hashes: Vec<Hash>,
		tx_subset: HashMap<Hash, Transaction>,
	) -> Result<bool, Error> {
		let mut state = self.state.lock();
		self.add_internal(
			&mut state,
			BlockInput::Filtered(FilteredBlock {
				header,
				tx_hashes,
				tx_subset,
			}),
			true,
		)
	}

	fn header_provider(&self) -> impl Fn(&Hash) -> Option<StoredBlock> + '_ {
		move |h: &Hash| self.store.get(h).ok().flatten()
	}

	/// The nine-step `add()` algorithm. `top_level` distinguishes the
	/// caller's own entry from a recursive call made while draining the
	/// orphan buffer: only the top-level call drains.
	fn add_internal(&self, state: &mut MutableState, input: BlockInput, top_level: bool) -> Result<bool, Error> {
		let hash = input.header().hash();

		// Step 1: fast paths.
		if hash == self.head.read().hash() {
			return Ok(true);
		}
		if state.orphans.contains(&hash) {
			return Ok(false);
		}

		// Step 2: mode check.
		let full_validation = self.hooks.should_verify_transactions();
		if full_validation {
			match &input {
				BlockInput::Filtered(_) => {
					return Err(ErrorKind::InvalidBlock(
						"full-validation mode does not accept filtered blocks".into(),
					)
					.into());
				}
				BlockInput::Full(b) if b.transactions.is_none() => {
					return Err(ErrorKind::InvalidBlock(
						"full-validation mode requires transaction content".into(),
					)
					.into());
				}
				_ => {}
			}
		}

		// Step 3: duplicate already in store (full-validation only; for
		// header-only mode the equivalent case is caught later, as
		// "duplicate on main chain" inside connect-block).
		if full_validation && self.store.get(&hash)?.is_some() {
			return Ok(true);
		}

		// Step 4: relevance probe.
		let transactions = match &input {
			BlockInput::Full(b) => b.transactions.clone(),
			BlockInput::Filtered(_) => None,
		};
		let contents_important = full_validation
			|| transactions
				.as_ref()
				.map(|txs| self.dispatcher.lock().any_synchronous_listener_finds_relevant(txs))
				.unwrap_or(false);

		// Step 5: header verification (always); transaction structural
		// verification only when contents matter.
		input.header().clone().verify_header(now())?;
		if contents_important {
			match &input {
				BlockInput::Full(b) => pipe::verify_transactions_step(b)?,
				BlockInput::Filtered(f) => {
					let computed = lodestone_core::core::block::merkle_root(f.tx_hashes.clone());
					if computed != f.header.merkle_root {
						return Err(ErrorKind::InvalidBlock(
							"filtered block's transaction hashes do not match its merkle root".into(),
						)
						.into());
					}
				}
			}
		}

		// Step 6: parent lookup.
		let previous = input.header().previous;
		let parent = match self.store.get(&previous)? {
			Some(parent) => parent,
			None => {
				if top_level {
					state.orphans.add(input.into_filtered());
				}
				return Ok(false);
			}
		};

		// Steps 7-8, with rollback to `notSettingChainHead` on any error
		// from here on.
		let result = self.verify_and_connect(state, input, &parent, full_validation);
		if result.is_err() {
			let _ = self.hooks.not_setting_chain_head();
		}
		let connected = result?;

		// Step 9: drain orphans, top level only.
		if top_level {
			self.drain_orphans(state);
		}

		Ok(connected)
	}

	fn verify_and_connect(
		&self,
		state: &mut MutableState,
		input: BlockInput,
		parent: &StoredBlock,
		full_validation: bool,
	) -> Result<bool, Error> {
		let height = parent.height + 1;
		let header = input.header().clone();

		// Step 7: difficulty verification.
		difficulty::verify_difficulty(&header, height, parent, self.network, &self.header_provider())?;

		// Step 8: connect-block.
		self.connect_block(state, input, parent, height, full_validation)
	}

	fn connect_block(
		&self,
		state: &mut MutableState,
		input: BlockInput,
		parent: &StoredBlock,
		height: u64,
		full_validation: bool,
	) -> Result<bool, Error> {
		let header = input.header().clone();
		let hash = header.hash();

		if !(self.checkpoints)(height, &hash) {
			return Err(ErrorKind::InvalidBlock(format!("block at height {} rejected by checkpoint", height)).into());
		}

		let full_block = match &input {
			BlockInput::Full(b) => Some(b.clone()),
			BlockInput::Filtered(_) => None,
		};
		let is_filtered = full_block.is_none();

		if full_validation {
			let txs = full_block
				.as_ref()
				.and_then(|b| b.transactions.as_ref())
				.expect("full-validation mode already rejected blocks without transactions");
			if txs.iter().any(|tx| !tx.is_final(height, header.time_seconds())) {
				return Err(
					ErrorKind::InvalidBlock("block contains a transaction that is not yet final".into()).into(),
				);
			}
		}

		let new_stored = parent.build(header.clone());
		let head = self.head.read().clone();
		let classification = pipe::classify(parent, &new_stored, &head);

		match classification {
			Classification::Extension => {
				if full_validation {
					let provider = self.header_provider();
					let median = pipe::median_time_past(&head, &provider, MEDIAN_TIME_SPAN);
					if header.time_seconds() <= median {
						return Err(ErrorKind::InvalidBlock(
							"block timestamp does not exceed the median of the last blocks".into(),
						)
						.into());
					}
					let block = full_block
						.as_ref()
						.expect("full-validation mode already rejected blocks without transactions");
					let changes = self.hooks.connect_transactions(height, block)?;
					self.store.put_with_undo(&new_stored, changes)?;
				} else {
					self.store.put(&new_stored)?;
				}
				self.hooks.do_set_chain_head(&new_stored)?;
				self.store.do_set_chain_head(&new_stored)?;
				*self.head.write() = new_stored.clone();
				self.fulfill_height_waiters(&new_stored);

				let filtered = input.into_filtered();
				self.dispatcher
					.lock()
					.dispatch_new_block(&filtered, &new_stored, BlockType::BestChain, is_filtered);
				Ok(true)
			}
			Classification::SideNoReorg => {
				let provider = self.header_provider();
				let split = reorg::find_split_point(&new_stored, &head, &provider)?;
				if split.hash() == new_stored.hash() {
					// Already on the main chain; nothing to do.
					return Ok(true);
				}

				self.store.put(&new_stored)?;
				self.hooks.not_setting_chain_head()?;
				if let Some(block) = full_block {
					state.full_blocks.insert(hash, block);
				}

				let filtered = input.into_filtered();
				self.dispatcher
					.lock()
					.dispatch_new_block(&filtered, &new_stored, BlockType::SideChain, is_filtered);
				Ok(true)
			}
			Classification::Reorg => {
				self.store.put(&new_stored)?;
				if let Some(block) = full_block {
					state.full_blocks.insert(hash, block);
				}

				let filtered = input.into_filtered();
				self.dispatcher
					.lock()
					.dispatch_new_block(&filtered, &new_stored, BlockType::SideChain, is_filtered);

				self.run_reorg(state, &head, &new_stored)?;
				Ok(true)
			}
		}
	}

	fn run_reorg(&self, state: &mut MutableState, old_head: &StoredBlock, new_head: &StoredBlock) -> Result<(), Error> {
		let provider = self.header_provider();
		let plan = reorg::plan_reorg(old_head, new_head, &provider)?;
		let full_validation = self.hooks.should_verify_transactions();

		if full_validation {
			for disconnected in &plan.old {
				let (stored, undo) = self.store.get_once_undoable_stored_block(&disconnected.hash())?;
				self.hooks.disconnect_transactions(&stored, &undo)?;
			}

			let mut cursor = plan.split_point.clone();
			for connecting in &plan.new {
				let provider = self.header_provider();
				let median = pipe::median_time_past(&cursor, &provider, MEDIAN_TIME_SPAN);
				if connecting.header.time_seconds() <= median {
					return Err(ErrorKind::InvalidBlock(
						"reorg candidate timestamp does not exceed the median of the preceding blocks".into(),
					)
					.into());
				}
				let block = state
					.full_blocks
					.get(&connecting.hash())
					.cloned()
					.ok_or(ErrorKind::Pruned)?;
				let changes = self.hooks.connect_transactions(connecting.height, &block)?;
				self.store.put_with_undo(connecting, changes)?;
				cursor = connecting.clone();
			}
		}

		// `plan.new` is split-to-head (ascending), the order the connect
		// loop above needs; listeners expect the mirror of `old`, i.e.
		// head-to-split.
		let new_head_to_split: Vec<StoredBlock> = plan.new.iter().rev().cloned().collect();
		self.dispatcher
			.lock()
			.dispatch_reorg(&plan.split_point, &plan.old, &new_head_to_split);

		self.hooks.do_set_chain_head(new_head)?;
		self.store.do_set_chain_head(new_head)?;
		*self.head.write() = new_head.clone();
		self.fulfill_height_waiters(new_head);
		Ok(())
	}

	fn drain_orphans(&self, state: &mut MutableState) {
		loop {
			let hashes = state.orphans.hashes_in_order();
			let mut progressed = false;
			for hash in hashes {
				let orphan = match state.orphans.remove(&hash) {
					Some(o) => o,
					None => continue,
				};
				match self.store.get(&orphan.header.previous) {
					Ok(Some(_)) => {
						progressed = true;
						let _ = self.add_internal(state, BlockInput::from_filtered(orphan), false);
					}
					_ => {
						state.orphans.add(orphan);
					}
				}
			}
			if !progressed {
				break;
			}
		}
	}

	fn fulfill_height_waiters(&self, stored: &StoredBlock) {
		let mut waiters = self.height_waiters.lock();
		let ready: Vec<u64> = waiters.keys().cloned().filter(|h| *h <= stored.height).collect();
		for height in ready {
			if let Some(senders) = waiters.remove(&height) {
				for sender in senders {
					let _ = sender.send(stored.clone());
				}
			}
		}
	}
}

fn now() -> i64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0)
}
