use providers::StoreError;
use storage::LedgerError;
use thiserror::Error;

/// Run-fatal failures. Per-object failures never show up here; they are
/// recorded as `error` verdicts instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("listing bucket {bucket} failed: {source}")]
    List {
        bucket: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("record stage stopped unexpectedly: {0}")]
    Stage(#[from] tokio::task::JoinError),
}
