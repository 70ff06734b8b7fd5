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

//! The block chain itself: validates and accepts new blocks, computes
//! difficulty retargets, handles reorgs and notifies registered listeners.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate failure_derive;

mod chain;
pub mod difficulty;
pub mod error;
pub mod listener;
pub mod orphan;
pub mod pipe;
pub mod reorg;
pub mod types;

pub use crate::chain::{Chain, HeightFuture};
pub use crate::error::{Error, ErrorKind};
pub use crate::listener::{BlockType, Executor, FalsePositiveEstimator, Listener, ListenerDispatcher, TaskExecutor, ThreadSpawnExecutor};
pub use crate::orphan::OrphanBlockPool;
pub use crate::pipe::Classification;
pub use crate::types::{ChainHooks, FilteredBlock, FullValidationHooks, HeaderOnlyHooks};
