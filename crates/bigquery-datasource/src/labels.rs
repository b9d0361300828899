//! Request headers to BigQuery job labels
//!
//! Label keys and values must contain only lowercase letters, digits,
//! underscores and hyphens, be at most 63 characters long, and keys must
//! start with a letter. Only a fixed set of host headers is forwarded.

use std::collections::HashMap;

use crate::constants::MAX_LABEL_LENGTH;

pub const HEADER_PLUGIN_ID: &str = "X-Plugin-Id";
pub const HEADER_DATASOURCE_UID: &str = "X-Datasource-Uid";
pub const HEADER_DASHBOARD_UID: &str = "X-Dashboard-Uid";
pub const HEADER_PANEL_ID: &str = "X-Panel-Id";
pub const HEADER_PANEL_PLUGIN_ID: &str = "X-Panel-Plugin-Id";
pub const HEADER_QUERY_GROUP_ID: &str = "X-Query-Group-Id";
pub const HEADER_FROM_EXPRESSION: &str = "X-Grafana-From-Expr";

/// Headers eligible for conversion into labels
pub const LABEL_HEADERS: [&str; 7] = [
    HEADER_PLUGIN_ID,
    HEADER_DATASOURCE_UID,
    HEADER_DASHBOARD_UID,
    HEADER_PANEL_ID,
    HEADER_PANEL_PLUGIN_ID,
    HEADER_QUERY_GROUP_ID,
    HEADER_FROM_EXPRESSION,
];

const fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || is_separator(c)
}

const fn is_separator(c: char) -> bool {
    c == '_' || c == '-'
}

/// Clean a string so it can be used as a label key (`is_key`) or value.
///
/// Single pass over the input: characters outside `[A-Za-z0-9_-]` are
/// dropped, keys skip everything before their first letter, a run of
/// separators keeps only its first character, and output stops at 63
/// characters.
#[must_use]
pub fn sanitize_label(value: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(value.len().min(MAX_LABEL_LENGTH));
    let mut seen_letter = !is_key;
    let mut prev_separator = false;

    for c in value.chars().filter(|c| is_label_char(*c)) {
        if !seen_letter {
            if !c.is_ascii_alphabetic() {
                continue;
            }
            seen_letter = true;
        }

        let separator = is_separator(c);
        if separator && prev_separator {
            continue;
        }
        prev_separator = separator;

        out.push(c.to_ascii_lowercase());
        if out.len() == MAX_LABEL_LENGTH {
            break;
        }
    }

    out
}

/// Build job labels from the accepted request headers.
///
/// Headers outside [`LABEL_HEADERS`] and headers without a non-empty first
/// value are skipped.
#[must_use]
pub fn headers_as_labels<S: std::hash::BuildHasher>(
    headers: &HashMap<String, Vec<String>, S>,
) -> HashMap<String, String> {
    LABEL_HEADERS
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?.first()?;
            if value.is_empty() {
                return None;
            }
            Some((sanitize_label(name, true), sanitize_label(value, false)))
        })
        .collect()
}
