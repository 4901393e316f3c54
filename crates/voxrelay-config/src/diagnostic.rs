// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! miette diagnostics for configuration failures.
//!
//! Figment errors are mapped onto [`ConfigError`]. Unknown keys get a
//! Jaro-Winkler "did you mean" and, when the offending file is known, a span
//! pointing at the key.

#![allow(unused_assignments)] // triggered by the Diagnostic derive

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Similarity a valid key needs before it is offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// One configuration problem, renderable with miette.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key that no section of the relay configuration accepts.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(voxrelay::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// The unrecognized key name.
        key: String,
        /// Closest valid key, if one is similar enough.
        suggestion: Option<String>,
        /// Comma-separated keys accepted in the enclosing table.
        valid_keys: String,
        /// Location of the key in the file it was read from.
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        /// Contents of that file, for rendering the span.
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value whose TOML or environment type does not match the field.
    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(voxrelay::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        /// Dotted path of the offending key, e.g. `speed.reencode_timeout_secs`.
        key: String,
        /// What was found and what was expected.
        detail: String,
        /// The expected type alone, for the help line.
        expected: String,
        #[label("wrong type")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A field with no default that no layer supplied.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(voxrelay::config::missing_key),
        help("set `{key}` in voxrelay.toml")
    )]
    MissingKey {
        /// Name of the absent field.
        key: String,
    },

    /// A value that parsed but breaks a semantic rule.
    #[error("validation error: {message}")]
    #[diagnostic(code(voxrelay::config::validation))]
    Validation {
        /// Which rule failed and for which key.
        message: String,
    },

    /// Anything figment reports that has no dedicated variant.
    #[error("configuration error: {0}")]
    #[diagnostic(code(voxrelay::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Maps every error carried by `err` to a [`ConfigError`].
///
/// `toml_sources` pairs file paths with their contents and is used to attach
/// spans to unknown keys.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, expected) => {
                let (span, src) = locate(&error, field, toml_sources)
                    .map_or((None, None), |(span, src)| (Some(span), Some(src)));
                ConfigError::UnknownKey {
                    key: field.clone(),
                    suggestion: suggest_key(field, expected),
                    valid_keys: expected.join(", "),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: field.to_string(),
            },
            Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                key: error.path.join("."),
                detail: format!("found {actual}, expected {expected}"),
                expected: expected.clone(),
                span: None,
                src: None,
            },
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

/// Span of `field` inside the file that supplied it.
///
/// Prefers the file named by the error's metadata. Merged tables keep the tag
/// of the defaults layer, so otherwise the last source containing the key wins.
fn locate(
    error: &figment::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> Option<(SourceSpan, NamedSource<String>)> {
    let origin = error
        .metadata
        .as_ref()
        .and_then(|metadata| match metadata.source.as_ref()? {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    let candidates: Vec<&(String, String)> = match origin {
        Some(origin) => toml_sources.iter().filter(|(name, _)| *name == origin).collect(),
        None => toml_sources.iter().rev().collect(),
    };
    candidates.into_iter().find_map(|(name, content)| {
        let offset = find_key_offset(content, &error.path, field)?;
        Some((
            SourceSpan::new(offset.into(), field.len()),
            NamedSource::new(name, content.clone()),
        ))
    })
}

/// Byte offset of `field` as a key under the table named by `path`.
///
/// Only the first path segment selects the table; both `[name]` and
/// `[[name]]` headers match. An empty path searches from the top of the file.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let start = match path.first() {
        None => 0,
        Some(table) => [format!("[[{table}]]"), format!("[{table}]")]
            .iter()
            .find_map(|header| content.find(header.as_str()).map(|at| at + header.len()))?,
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let rest = &line[indent..];
        if rest.starts_with('[') && offset > start {
            break;
        }
        if let Some(after) = rest.strip_prefix(field)
            && after.trim_start().starts_with('=')
        {
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

/// Closest entry in `valid_keys` to `unknown`, when it is close enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Prints each error to stderr with miette's graphical report handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut report = String::new();
        match handler.render_report(&mut report, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{report}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_cache_dir_for_typo() {
        let valid = &["cache_dir", "reencode_timeout_secs", "ffmpeg_path", "ffprobe_path"];
        assert_eq!(suggest_key("cach_dir", valid), Some("cache_dir".to_string()));
    }

    #[test]
    fn picks_the_closest_of_several_candidates() {
        let valid = &["grace_secs", "sweep_interval_secs"];
        assert_eq!(suggest_key("grace_sec", valid), Some("grace_secs".to_string()));
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        assert_eq!(suggest_key("zzzzzz", &["name", "log_level"]), None);
    }

    #[test]
    fn finds_key_inside_its_table() {
        let content = "[relay]\nname = \"x\"\n\n[speed]\ncach_dir = \"/tmp\"\n";
        let o = find_key_offset(content, &["speed".to_string()], "cach_dir").expect("offset");
        assert_eq!(&content[o..o + 8], "cach_dir");
    }

    #[test]
    fn ignores_keys_sharing_a_prefix() {
        let content = "[autoend]\ngrace_secs_extra = 1\ngrace_secs = 2\n";
        let o = find_key_offset(content, &["autoend".to_string()], "grace_secs").expect("offset");
        assert!(content[o..].starts_with("grace_secs = 2"));
    }

    #[test]
    fn finds_key_under_array_table_header() {
        let content = "[[assistants]]\nnaem = \"a\"\n";
        let o = find_key_offset(content, &["assistants".to_string()], "naem").expect("offset");
        assert!(content[o..].starts_with("naem"));
    }

    #[test]
    fn stops_at_the_next_table() {
        let content = "[relay]\nname = \"x\"\n[speed]\nnaem = 1\n";
        assert_eq!(find_key_offset(content, &["relay".to_string()], "naem"), None);
    }
}
