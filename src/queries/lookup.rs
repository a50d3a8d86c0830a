//! Shared result type and small helpers for the read-side accessors.

use serde::Serialize;

use crate::db::models::AmountMap;
use crate::utils::{pct_change, round_money};

/// Outcome of a read. Absence of rollups is an answer, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Lookup<T> {
    Found(T),
    NoData { message: String },
}

pub type LookupResult<T> = Result<Lookup<T>, diesel::result::Error>;

impl<T> Lookup<T> {
    pub fn no_data(message: impl Into<String>) -> Self {
        Lookup::NoData {
            message: message.into(),
        }
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::NoData { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Lookup::Found(_) => None,
            Lookup::NoData { message } => Some(message),
        }
    }
}

/// `part` as a percentage of `whole`, in cents precision; 0 unless `whole` is positive.
pub fn share_pct(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { round_money(part / whole * 100.0) } else { 0.0 }
}

/// Rounded percent change; 0 unless `previous` is positive.
pub fn delta_pct(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        pct_change(current, previous).map(round_money).unwrap_or(0.0)
    } else {
        0.0
    }
}

/// Map entries, largest first; ties by name.
pub fn largest_first(map: &AmountMap) -> Vec<(String, f64)> {
    let mut rows: Vec<(String, f64)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

/// Escape `\`, `%` and `_` for a `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Trimmed, non-empty, deduplicated case-insensitively; first spelling wins.
pub fn normalize_names(names: &[String]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty() && seen.insert(n.to_lowercase()))
        .map(str::to_string)
        .collect()
}

pub fn hour_label(hour: i32) -> String {
    format!("{}:00", hour)
}
