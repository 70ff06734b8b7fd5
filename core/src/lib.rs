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

//! Core data types shared across the workspace: block headers, hashes,
//! proof-of-work targets and the network parameters that tie them to a
//! particular chain. Parsing, wire serialization, script execution and
//! Merkle proof construction are intentionally not provided here; they
//! belong to the block/transaction module that sits above the chain.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate lazy_static;

pub mod consensus;
pub mod core;
pub mod global;

pub use crate::core::block;
pub use crate::core::hash;
pub use crate::core::stored_block;
pub use crate::core::target;
