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

//! End-to-end scenarios for a full-validation deployment: transaction
//! content is mandatory, connected and disconnected through `ChainHooks`,
//! and a reorg must reconnect every block on the new branch in order.

use std::sync::Arc;

use lodestone_chain::{Chain, FullValidationHooks};
use lodestone_core::consensus;
use lodestone_core::core::block::{merkle_root, Block, BlockHeader, Transaction};
use lodestone_core::core::hash::{Hash, Hashed};
use lodestone_core::core::stored_block::StoredBlock;
use lodestone_core::global::Network;
use lodestone_store::memory::MemoryBlockStore;

fn mine(mut header: BlockHeader) -> BlockHeader {
    let target = header.difficulty_target_as_integer();
    while header.hash().as_uint() >= target {
        header.nonce = header.nonce.wrapping_add(1);
    }
    header
}

fn coinbase(tag: u8) -> Transaction {
    Transaction {
        payload: vec![tag],
        lock_time: 0,
    }
}

fn full_block(previous: Hash, time: u32, txs: Vec<Transaction>) -> Block {
    let root = merkle_root(txs.iter().map(|t| t.hash()).collect());
    let header = mine(BlockHeader {
        version: 1,
        previous,
        merkle_root: root,
        time,
        bits: consensus::PROOF_OF_WORK_LIMIT,
        nonce: 0,
    });
    Block {
        header,
        transactions: Some(txs),
    }
}

type Store = MemoryBlockStore<Vec<Hash>>;
type TestChain = Chain<Store, FullValidationHooks<Store>>;

fn new_chain() -> TestChain {
    let genesis = StoredBlock::genesis(BlockHeader::genesis(consensus::PROOF_OF_WORK_LIMIT, 0));
    let store = Arc::new(MemoryBlockStore::new(genesis));
    let hooks = FullValidationHooks::new(store.clone());
    Chain::new(store, hooks, Network::Mainnet, 100).unwrap()
}

#[test]
fn full_blocks_connect_and_extend_the_head() {
    let chain = new_chain();
    let genesis_hash = chain.get_chain_head().hash();

    let b1 = full_block(genesis_hash, 150, vec![coinbase(1)]);
    let b1_hash = b1.header.hash();
    assert!(chain.add_full_block(b1).unwrap());
    assert_eq!(chain.get_best_height(), 1);
    assert_eq!(chain.get_chain_head().hash(), b1_hash);
}

#[test]
fn header_only_blocks_are_rejected_in_full_validation_mode() {
    let chain = new_chain();
    let genesis_hash = chain.get_chain_head().hash();
    let header = mine(BlockHeader {
        version: 1,
        previous: genesis_hash,
        merkle_root: lodestone_core::core::hash::ZERO_HASH,
        time: 150,
        bits: consensus::PROOF_OF_WORK_LIMIT,
        nonce: 0,
    });
    let block = Block {
        header,
        transactions: None,
    };
    let err = chain.add_full_block(block).unwrap_err();
    assert!(err.is_bad_data());
}

#[test]
fn a_non_final_transaction_is_rejected() {
    let chain = new_chain();
    let genesis_hash = chain.get_chain_head().hash();
    // Height-locked to height 5, but this block would land at height 1.
    let tx = Transaction {
        payload: vec![9],
        lock_time: 5,
    };
    let b1 = full_block(genesis_hash, 150, vec![tx]);
    let err = chain.add_full_block(b1).unwrap_err();
    assert!(err.is_bad_data());
    assert_eq!(chain.get_best_height(), 0);
}

#[test]
fn a_reorg_disconnects_the_old_branch_and_reconnects_the_new_one() {
    let chain = new_chain();
    let genesis_hash = chain.get_chain_head().hash();

    let a1 = full_block(genesis_hash, 150, vec![coinbase(1)]);
    let a1_hash = a1.header.hash();
    assert!(chain.add_full_block(a1).unwrap());
    assert_eq!(chain.get_chain_head().hash(), a1_hash);

    let b1 = full_block(genesis_hash, 151, vec![coinbase(2)]);
    let b1_hash = b1.header.hash();
    assert!(chain.add_full_block(b1).unwrap());
    // b1 carries no more work than a1, so it stays a side branch.
    assert_eq!(chain.get_chain_head().hash(), a1_hash);

    let b2 = full_block(b1_hash, 400, vec![coinbase(3)]);
    let b2_hash = b2.header.hash();
    assert!(chain.add_full_block(b2).unwrap());

    assert_eq!(chain.get_chain_head().hash(), b2_hash);
    assert_eq!(chain.get_best_height(), 2);
}
