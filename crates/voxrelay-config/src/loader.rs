// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment layering for `voxrelay.toml`.
//!
//! Files are read from `/etc/voxrelay`, the user config dir and the working
//! directory, in that order, and `VOXRELAY_*` variables override all of them.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::RelayConfig;

const FILE_NAME: &str = "voxrelay.toml";

/// Top-level tables an environment key may address.
const SECTIONS: [&str; 7] = [
    "relay", "pool", "transport", "stream", "speed", "autoend", "router",
];

/// Config files in merge order, lowest precedence first. Missing files are
/// included; figment skips them.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![Path::new("/etc/voxrelay").join(FILE_NAME)];
    paths.extend(dirs::config_dir().map(|dir| dir.join("voxrelay").join(FILE_NAME)));
    paths.push(
        std::env::current_dir()
            .map(|dir| dir.join(FILE_NAME))
            .unwrap_or_else(|_| PathBuf::from(FILE_NAME)),
    );
    paths
}

/// Load configuration from [`config_paths`] with env var overrides.
pub fn load_config() -> Result<RelayConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<RelayConfig, figment::Error> {
    defaults().merge(Toml::string(toml_content)).extract()
}

/// Load configuration from one file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RelayConfig, figment::Error> {
    defaults()
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full layered figment, before extraction.
pub fn build_figment() -> Figment {
    config_paths()
        .into_iter()
        .fold(defaults(), |figment, path| figment.merge(Toml::file(path)))
        .merge(env_provider())
}

fn defaults() -> Figment {
    Figment::new().merge(Serialized::defaults(RelayConfig::default()))
}

fn env_provider() -> Env {
    Env::prefixed("VOXRELAY_").map(|key| env_key(key.as_str()).into())
}

/// Maps a lowercased, unprefixed env key onto a dotted config path.
///
/// Only the section prefix is split off. Field names keep their underscores,
/// so `speed_cache_dir` becomes `speed.cache_dir`.
fn env_key(key: &str) -> String {
    SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|field| format!("{section}.{field}"))
        })
        .unwrap_or_else(|| key.to_string())
}
