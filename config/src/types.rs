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

//! Public types for config modules

use std::fmt;
use std::io;
use std::path::PathBuf;

use lodestone_core::global::Network;
use lodestone_util::LoggingConfig;

/// Error type wrapping config errors.
#[derive(Debug)]
pub enum ConfigError {
	/// Error with parsing of config file
	ParseError(String, String),

	/// Error with fileIO while reading config file
	FileIOError(String, String),

	/// No file found
	FileNotFoundError(String),

	/// Error serializing config values
	SerializationError(String),
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			ConfigError::ParseError(ref file_name, ref message) => write!(
				f,
				"Error parsing configuration file at {} - {}",
				file_name, message
			),
			ConfigError::FileIOError(ref file_name, ref message) => {
				write!(f, "{} {}", message, file_name)
			}
			ConfigError::FileNotFoundError(ref file_name) => {
				write!(f, "Configuration file not found: {}", file_name)
			}
			ConfigError::SerializationError(ref message) => {
				write!(f, "Error serializing configuration: {}", message)
			}
		}
	}
}

impl From<io::Error> for ConfigError {
	fn from(error: io::Error) -> ConfigError {
		ConfigError::FileIOError(
			String::from(""),
			format!("Error loading config file: {}", error),
		)
	}
}

/// Top-level container, tracking whether the values came from a file on
/// disk or from defaults.
#[derive(Debug, Serialize, Deserialize)]
pub struct GlobalConfig {
	/// Path of the file actually read, if any.
	pub config_file_path: Option<PathBuf>,
	/// Whether `members` came from a file or from `Default`.
	pub using_config_file: bool,
	/// The parsed configuration.
	pub members: Option<ChainConfig>,
}

/// Everything the chain manager needs to start up: which network it's
/// tracking, where persisted data lives, how it logs, and the orphan
/// buffer's size cap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainConfig {
	/// Network this instance tracks; gates the difficulty algorithm and
	/// genesis parameters.
	pub network: Network,
	/// Directory the block store (an external collaborator) persists to.
	pub db_root: String,
	/// Logging configuration, shared with the rest of the workspace.
	#[serde(default)]
	pub logging: Option<LoggingConfig>,
	/// Upper bound on the number of buffered orphan blocks. The source
	/// imposes no cap; this workspace does, per its own design notes.
	pub max_orphans: usize,
}

impl Default for ChainConfig {
	fn default() -> ChainConfig {
		ChainConfig {
			network: Network::Mainnet,
			db_root: ".lodestone".to_string(),
			logging: Some(LoggingConfig::default()),
			max_orphans: 100,
		}
	}
}
