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

//! Configuration file management

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::types::{ChainConfig, ConfigError, GlobalConfig};

/// The default config file name looked up in the working directory, and
/// the dotfile looked up under the user's home directory.
const CONFIG_FILE_NAME: &str = "lodestone.toml";
const CONFIG_HOME_DOTDIR: &str = ".lodestone";

impl Default for GlobalConfig {
	fn default() -> GlobalConfig {
		GlobalConfig {
			config_file_path: None,
			using_config_file: false,
			members: Some(ChainConfig::default()),
		}
	}
}

impl GlobalConfig {
	/// Loads the config from the given path if provided, else searches the
	/// working directory and then the user's home directory for
	/// `lodestone.toml`. Falls back to `ChainConfig::default()` if no file
	/// is found anywhere.
	pub fn new(file_path: Option<&str>) -> Result<GlobalConfig, ConfigError> {
		let mut config = GlobalConfig::default();

		let path = match file_path {
			Some(p) => Some(PathBuf::from(p)),
			None => GlobalConfig::derive_config_location(),
		};

		match path {
			Some(path) if path.exists() => {
				config.read_from_file(path)?;
				Ok(config)
			}
			_ => Ok(config),
		}
	}

	fn derive_config_location() -> Option<PathBuf> {
		let cwd = PathBuf::from(CONFIG_FILE_NAME);
		if cwd.exists() {
			return Some(cwd);
		}
		let home = dirs::home_dir()?
			.join(CONFIG_HOME_DOTDIR)
			.join(CONFIG_FILE_NAME);
		if home.exists() {
			Some(home)
		} else {
			None
		}
	}

	fn read_from_file(&mut self, path: PathBuf) -> Result<(), ConfigError> {
		let mut file = File::open(&path)
			.map_err(|e| ConfigError::FileIOError(path.to_string_lossy().into_owned(), e.to_string()))?;
		let mut contents = String::new();
		file.read_to_string(&mut contents)
			.map_err(|e| ConfigError::FileIOError(path.to_string_lossy().into_owned(), e.to_string()))?;
		let members: ChainConfig = toml::from_str(&contents)
			.map_err(|e| ConfigError::ParseError(path.to_string_lossy().into_owned(), e.to_string()))?;

		self.members = Some(members);
		self.using_config_file = true;
		self.config_file_path = Some(path);
		Ok(())
	}

	/// Serializes the current config back to TOML, for `lodestone.toml`
	/// generation by an operator-facing tool outside this crate's scope.
	pub fn ser_config(&self) -> Result<String, ConfigError> {
		let members = self
			.members
			.as_ref()
			.ok_or_else(|| ConfigError::SerializationError("no config members set".to_string()))?;
		toml::to_string(members).map_err(|e| ConfigError::SerializationError(e.to_string()))
	}
}
