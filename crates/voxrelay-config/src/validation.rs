// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as the assistant pool size, unique account names, and non-zero timeouts.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{RelayConfig, MAX_ASSISTANTS};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.relay.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "relay.log_level `{}` must be one of {}",
                config.relay.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.assistants.len() > MAX_ASSISTANTS {
        errors.push(ConfigError::Validation {
            message: format!(
                "at most {MAX_ASSISTANTS} [[assistants]] may be configured, got {}",
                config.assistants.len()
            ),
        });
    }

    for (i, assistant) in config.assistants.iter().enumerate() {
        if assistant.name.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("assistants[{i}].name must not be empty"),
            });
        }
    }

    let mut seen_names = HashSet::new();
    for assistant in &config.assistants {
        if !seen_names.insert(&assistant.name) {
            errors.push(ConfigError::Validation {
                message: format!(
                    "duplicate assistant name `{}` in [[assistants]] array",
                    assistant.name
                ),
            });
        }
    }

    let nonzero = [
        ("transport.join_timeout_secs", config.transport.join_timeout_secs),
        ("transport.leave_timeout_secs", config.transport.leave_timeout_secs),
        ("transport.change_timeout_secs", config.transport.change_timeout_secs),
        ("speed.reencode_timeout_secs", config.speed.reencode_timeout_secs),
        ("autoend.sweep_interval_secs", config.autoend.sweep_interval_secs),
        ("router.worker_idle_secs", config.router.worker_idle_secs),
    ];
    for (key, value) in nonzero {
        if value == 0 {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be greater than zero"),
            });
        }
    }

    if config.speed.cache_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "speed.cache_dir must not be empty".to_string(),
        });
    }

    if config.speed.ffmpeg_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "speed.ffmpeg_path must not be empty".to_string(),
        });
    }

    if config.speed.ffprobe_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "speed.ffprobe_path must not be empty".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
