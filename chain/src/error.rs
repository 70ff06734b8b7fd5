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

//! Error types for chain
use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

use lodestone_core::core::block;
use lodestone_store as store;

/// Error definition
#[derive(Debug, Fail)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// Chain error definitions
#[derive(Clone, Debug, Fail)]
pub enum ErrorKind {
	/// Header fails proof-of-work, time, difficulty, or structural checks,
	/// or a fork's split point could not be located. Fatal to the `add()`
	/// call that produced it; does not corrupt the store.
	#[fail(display = "invalid block: {}", _0)]
	InvalidBlock(String),
	/// The candidate's previous hash is unknown; it has been buffered.
	/// Not a failure from the caller's point of view.
	#[fail(display = "orphan")]
	Orphan,
	/// Error from the underlying header/transaction structural checks.
	#[fail(display = "block error: {}", _0)]
	Block(block::HeaderError),
	/// Error from the underlying transaction structural checks.
	#[fail(display = "transactions error: {}", _0)]
	Transactions(block::TransactionsError),
	/// A reorg needed undo data the store no longer has.
	#[fail(display = "undo data required for reorg has been pruned")]
	Pruned,
	/// Underlying persistence failure.
	#[fail(display = "store error: {}", _0)]
	StoreErr(String),
	/// A registered listener's callback returned an error.
	#[fail(display = "listener error: {}", _0)]
	ListenerErr(String),
	/// Anything else.
	#[fail(display = "{}", _0)]
	Other(String),
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let cause = match self.cause() {
			Some(c) => format!("{}", c),
			None => String::from("Unknown"),
		};
		let backtrace = match self.backtrace() {
			Some(b) => format!("{}", b),
			None => String::from("Unknown"),
		};
		let output = format!(
			"{} \n Cause: {} \n Backtrace: {}",
			self.inner, cause, backtrace
		);
		Display::fmt(&output, f)
	}
}

impl Error {
	/// get kind
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}
	/// get cause
	pub fn cause(&self) -> Option<&Fail> {
		self.inner.cause()
	}
	/// get backtrace
	pub fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}

	/// Whether the error is intrinsic to the block (and so should roll the
	/// attempted mutation back via `notSettingChainHead`) as opposed to a
	/// store or listener failure that isn't the block's fault.
	pub fn is_bad_data(&self) -> bool {
		match self.kind() {
			ErrorKind::InvalidBlock(_) | ErrorKind::Block(_) | ErrorKind::Transactions(_) => true,
			ErrorKind::Orphan
			| ErrorKind::Pruned
			| ErrorKind::StoreErr(_)
			| ErrorKind::ListenerErr(_)
			| ErrorKind::Other(_) => false,
		}
	}

	/// Whether this is the "buffered as orphan" non-error.
	pub fn is_orphan(&self) -> bool {
		match self.kind() {
			ErrorKind::Orphan => true,
			_ => false,
		}
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<block::HeaderError> for Error {
	fn from(error: block::HeaderError) -> Error {
		Error {
			inner: Context::new(ErrorKind::Block(error)),
		}
	}
}

impl From<block::TransactionsError> for Error {
	fn from(error: block::TransactionsError) -> Error {
		Error {
			inner: Context::new(ErrorKind::Transactions(error)),
		}
	}
}

impl From<store::Error> for Error {
	fn from(error: store::Error) -> Error {
		match error.kind() {
			store::ErrorKind::Pruned => Error {
				inner: Context::new(ErrorKind::Pruned),
			},
			other => Error {
				inner: Context::new(ErrorKind::StoreErr(format!("{}", other))),
			},
		}
	}
}
