use std::fmt;
use storage::LedgerEntry;

/// Opaque key of an object inside a bucket.
pub type ObjectKey = String;

/// Suffix that marks a pseudo-directory in a listing.
pub const CONTAINER_MARKER: char = '/';

pub fn is_container_marker(key: &str) -> bool {
    key.ends_with(CONTAINER_MARKER)
}

/// A listed object admitted for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTask {
    pub key: ObjectKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub key: ObjectKey,
    pub verdict: Verdict,
}

/// Outcome of classifying one object.
///
/// The string form (`True`, `False`, `error`, or the raw token) is what the
/// ledger stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verdict {
    Boolean(bool),
    Error,
    Raw(String),
}

impl Verdict {
    pub const ERROR: &'static str = "error";

    pub fn is_error(&self) -> bool {
        matches!(self, Verdict::Error)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Boolean(true) => f.write_str("True"),
            Verdict::Boolean(false) => f.write_str("False"),
            Verdict::Error => f.write_str(Self::ERROR),
            Verdict::Raw(raw) => f.write_str(raw),
        }
    }
}

/// Reads a stored ledger value back. Only the exact canonical spellings map
/// to `Boolean`/`Error`.
impl From<&str> for Verdict {
    fn from(s: &str) -> Self {
        match s {
            "True" => Verdict::Boolean(true),
            "False" => Verdict::Boolean(false),
            Self::ERROR => Verdict::Error,
            other => Verdict::Raw(other.to_string()),
        }
    }
}

impl From<&ScanResult> for LedgerEntry {
    fn from(result: &ScanResult) -> Self {
        LedgerEntry::new(result.key.clone(), result.verdict.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_markers_end_with_slash() {
        assert!(is_container_marker("b/"));
        assert!(is_container_marker("reports/2024/"));
        assert!(!is_container_marker("a.txt"));
        assert!(!is_container_marker("dir/a.txt"));
    }

    #[test]
    fn verdict_string_forms_match_ledger_values() {
        assert_eq!(Verdict::Boolean(true).to_string(), "True");
        assert_eq!(Verdict::Boolean(false).to_string(), "False");
        assert_eq!(Verdict::Error.to_string(), "error");
        assert_eq!(Verdict::Raw("Unclear".into()).to_string(), "Unclear");

        assert_eq!(Verdict::from("True"), Verdict::Boolean(true));
        assert_eq!(Verdict::from("error"), Verdict::Error);
        assert_eq!(Verdict::from("true"), Verdict::Raw("true".into()));
    }

    #[test]
    fn scan_result_becomes_ledger_entry() {
        let result = ScanResult {
            key: "c.docx".into(),
            verdict: Verdict::Boolean(false),
        };
        assert_eq!(LedgerEntry::from(&result), LedgerEntry::new("c.docx", "False"));
    }
}
