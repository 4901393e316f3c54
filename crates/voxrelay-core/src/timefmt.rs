// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Clock-style duration labels (`mm:ss` / `hh:mm:ss`).

/// Render seconds as `mm:ss`, or `hh:mm:ss` once an hour is reached.
pub fn format_clock(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Parse a `ss`, `mm:ss` or `hh:mm:ss` label back into seconds.
pub fn parse_clock(label: &str) -> Option<u64> {
    let parts: Vec<&str> = label.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    parts.iter().try_fold(0u64, |acc, part| {
        let value: u64 = part.parse().ok()?;
        Some(acc * 60 + value)
    })
}
