// src/dag/naming.rs

//! Encoding of iteration / replication indexes into task display names.
//!
//! A replica's name is its template name followed by an optional
//! `#<iteration>` and an optional `*<replication>`, in that order:
//!
//! ```text
//! name = base [ '#' iteration ] [ '*' replication ]
//! ```
//!
//! The base name with both suffixes stripped is the *ambiguous* name: every
//! generation and replica of the same template task shares it.

use crate::errors::{FlowgraphError, Result};

/// Separator introducing the iteration index (LOOP generations).
pub const ITERATION_SEPARATOR: char = '#';

/// Separator introducing the replication index (REPLICATE copies).
pub const REPLICATION_SEPARATOR: char = '*';

/// Longest display name a task may carry, suffix included.
pub const MAX_TASK_NAME_LENGTH: usize = 255;

/// Suffix for the given indexes; empty when both are 0.
pub fn suffix(iteration: u32, replication: u32) -> String {
    let mut s = String::new();
    if iteration > 0 {
        s.push(ITERATION_SEPARATOR);
        s.push_str(&iteration.to_string());
    }
    if replication > 0 {
        s.push(REPLICATION_SEPARATOR);
        s.push_str(&replication.to_string());
    }
    s
}

/// Strip the iteration / replication suffix from `name`.
///
/// The first iteration separator wins; only when there is none is the name
/// cut at the first replication separator.
pub fn strip_suffix(name: &str) -> &str {
    if let Some(i) = name.find(ITERATION_SEPARATOR) {
        &name[..i]
    } else if let Some(i) = name.find(REPLICATION_SEPARATOR) {
        &name[..i]
    } else {
        name
    }
}

/// Replication index encoded in `name` (`"task1*3"` → 3).
///
/// Returns 0 when the name carries no replication suffix, or when the suffix
/// is not a number.
pub fn replication_index_of(name: &str) -> u32 {
    match name.split_once(REPLICATION_SEPARATOR) {
        Some((_, rest)) => parse_component(rest),
        None => 0,
    }
}

/// Iteration index encoded in `name` (`"task1#3*2"` → 3).
///
/// Returns 0 when the name carries no iteration suffix, or when the suffix
/// is not a number.
pub fn iteration_index_of(name: &str) -> u32 {
    match name.split_once(ITERATION_SEPARATOR) {
        Some((_, rest)) => {
            let digits = rest
                .split_once(REPLICATION_SEPARATOR)
                .map(|(it, _)| it)
                .unwrap_or(rest);
            parse_component(digits)
        }
        None => 0,
    }
}

/// Render the display name for `base` at the given indexes.
///
/// `base` may already carry a suffix; it is stripped first. Names longer than
/// [`MAX_TASK_NAME_LENGTH`] are rejected.
pub fn render(base: &str, iteration: u32, replication: u32) -> Result<String> {
    let name = format!("{}{}", strip_suffix(base), suffix(iteration, replication));
    let len = name.chars().count();
    if len > MAX_TASK_NAME_LENGTH {
        return Err(FlowgraphError::NameTooLong {
            name,
            len,
            max: MAX_TASK_NAME_LENGTH,
        });
    }
    Ok(name)
}

/// Whether `name` contains one of the reserved separators.
pub fn has_separator(name: &str) -> bool {
    name.contains(ITERATION_SEPARATOR) || name.contains(REPLICATION_SEPARATOR)
}

fn parse_component(s: &str) -> u32 {
    let end = s
        .find([ITERATION_SEPARATOR, REPLICATION_SEPARATOR])
        .unwrap_or(s.len());
    s[..end].parse().unwrap_or(0)
}
