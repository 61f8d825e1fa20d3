//! Ledger summary for operators.

use scanner_core::models::Verdict;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use storage::{Ledger, LedgerEntry};

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct LedgerStatus {
    pub path: String,
    pub rows: usize,
    pub distinct_keys: usize,
    pub by_verdict: BTreeMap<String, usize>,
    /// Keys whose last recorded verdict is `error`. A later run skips them
    /// like any other recorded key.
    pub errored_keys: Vec<String>,
}

pub fn tally(path: &str, entries: &[LedgerEntry]) -> LedgerStatus {
    let mut status = LedgerStatus {
        path: path.to_string(),
        rows: entries.len(),
        ..Default::default()
    };
    let mut seen = HashSet::new();
    let mut last_verdict: BTreeMap<&str, Verdict> = BTreeMap::new();
    for entry in entries {
        seen.insert(entry.key.as_str());
        *status.by_verdict.entry(entry.verdict.clone()).or_default() += 1;
        last_verdict.insert(entry.key.as_str(), Verdict::from(entry.verdict.as_str()));
    }
    status.distinct_keys = seen.len();
    status.errored_keys = last_verdict
        .into_iter()
        .filter(|(_, v)| v.is_error())
        .map(|(k, _)| k.to_string())
        .collect();
    status
}

pub async fn ledger_status(path: &str) -> anyhow::Result<LedgerStatus> {
    let entries = Ledger::new(path).entries().await?;
    Ok(tally(path, &entries))
}
