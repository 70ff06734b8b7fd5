// Copyright 2017 The Grin Developers
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

//! The network identifier. Kept as a small global, toggleable mode rather
//! than threaded through every call, mirroring how the rest of the
//! workspace picks between production and test parameter sets.

use std::sync::RwLock;

/// Which network a chain instance is tracking. Feeds the difficulty
/// algorithm selector and the genesis/checkpoint set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
	/// The production network.
	Mainnet,
	/// The public test network.
	Testnet,
}

lazy_static! {
	/// Network the process is currently configured for. Set once at
	/// startup; tests flip it locally via `set_network`.
	pub static ref NETWORK: RwLock<Network> = RwLock::new(Network::Mainnet);
}

/// Sets the active network. Should be called once during start-up, before
/// any chain instance is built.
pub fn set_network(network: Network) {
	let mut w = NETWORK.write().unwrap();
	*w = network;
}

/// Returns the currently active network.
pub fn network() -> Network {
	*NETWORK.read().unwrap()
}

/// Whether the active network is the test network.
pub fn is_testnet() -> bool {
	network() == Network::Testnet
}
