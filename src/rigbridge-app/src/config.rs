// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),

    #[error("Failed to write config file {0}: {1}")]
    WriteError(PathBuf, String),
}

pub const CONFIG_FILE_NAME: &str = "rigbridge.toml";

/// Returns the default search paths for `rigbridge.toml`
/// (current directory → XDG config → /etc).
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("rigbridge").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/rigbridge").join(CONFIG_FILE_NAME));
    paths
}

/// Extract and deserialize a named section from a TOML file.
///
/// Returns `Ok(Some(cfg))` when the section is present and parses cleanly,
/// `Ok(None)` when the section is absent, or `Err` on I/O / parse failure.
fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let table = read_table(path)?;

    let Some(section) = table.get(key) else {
        return Ok(None);
    };

    // Re-serialize the section then parse as T so all serde defaults apply.
    let section_toml = toml::to_string(section)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    let cfg = toml::from_str::<T>(&section_toml)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    Ok(Some(cfg))
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    toml::from_str(&content).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
}

/// Trait for loading and persisting a `rigbridge.toml` section.
pub trait ConfigFile: Sized + Default + DeserializeOwned + Serialize {
    /// Section key in `rigbridge.toml` (e.g. `"rigbridge"`).
    fn section_key() -> &'static str;

    /// Load the section from a specific file path.
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// does not contain the expected `[<section_key>]` header.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// Search default paths (`rigbridge.toml` in CWD → XDG → /etc) and load
    /// the first file that contains the expected section.
    ///
    /// Returns `(config, path_where_found)` or `(Default::default(), None)`
    /// when no config file is found.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in config_search_paths() {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(&path, Self::section_key())? {
                    return Ok((cfg, Some(path)));
                }
            }
        }
        Ok((Self::default(), None))
    }

    /// Like [`ConfigFile::load_from_default_paths`], but when nothing is
    /// found the defaults are written to `./rigbridge.toml` first.
    fn load_or_persist_defaults() -> Result<(Self, PathBuf), ConfigError> {
        match Self::load_from_default_paths()? {
            (cfg, Some(path)) => Ok((cfg, path)),
            (cfg, None) => {
                let path = PathBuf::from(CONFIG_FILE_NAME);
                cfg.save_to_file(&path)?;
                tracing::info!("Wrote default configuration to {}", path.display());
                Ok((cfg, path))
            }
        }
    }

    /// Write this section to `path`. Other top-level tables already in the
    /// file are kept.
    fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let mut table = if path.exists() {
            read_table(path)?
        } else {
            toml::Table::new()
        };
        let section = toml::Value::try_from(self)
            .map_err(|e| ConfigError::WriteError(path.to_path_buf(), e.to_string()))?;
        table.insert(Self::section_key().to_string(), section);

        let content = toml::to_string_pretty(&table)
            .map_err(|e| ConfigError::WriteError(path.to_path_buf(), e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(path.to_path_buf(), e.to_string()))?;
        }
        std::fs::write(path, content)
            .map_err(|e| ConfigError::WriteError(path.to_path_buf(), e.to_string()))
    }
}
