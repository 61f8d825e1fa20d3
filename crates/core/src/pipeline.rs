//! The scan pipeline: List → Filter → Classify → Record.
//!
//! List is a single store call. Filter is an inline pass over the listing
//! against the resume set loaded from the ledger. Classify runs up to
//! `max_concurrency` objects at once and hands results to Record in completion
//! order over a channel. Record is one task: it appends to the ledger and owns
//! the resume set from then on.
//!
//! Every stage checks the cancellation token before taking its next item.
//! Work already in flight is allowed to finish; Record stops appending once it
//! has seen the token and counts what it drops.

use crate::classifier::{self, ConfidentialityClassifier, LlmClassifier};
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::models::{is_container_marker, ScanResult, ScanTask, Verdict};
use crate::normalizer;
use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use providers::local::LocalStore;
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::{ObjectDescriptor, ObjectStore, ProviderRegistry};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use storage::{Ledger, LedgerEntry};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Listing,
    Draining,
    Completed,
    Cancelled,
    Faulted,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSummary {
    pub listed: usize,
    pub skipped_markers: usize,
    pub skipped_processed: usize,
    pub admitted: usize,
    pub recorded: usize,
    pub flagged: usize,
    pub clean: usize,
    pub errors: usize,
    pub unparsed: usize,
    /// Classified after cancellation was seen and therefore not recorded.
    pub discarded: usize,
    pub resume_set_size: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(PipelineSummary),
    Cancelled(PipelineSummary),
}

impl RunOutcome {
    pub fn summary(&self) -> &PipelineSummary {
        match self {
            RunOutcome::Completed(s) | RunOutcome::Cancelled(s) => s,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled(_))
    }
}

#[derive(Debug, Default)]
struct RecordReport {
    recorded: usize,
    flagged: usize,
    clean: usize,
    errors: usize,
    unparsed: usize,
    discarded: usize,
    interrupted: bool,
    resume_set_size: usize,
}

pub struct Scanner {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    classifier: Arc<dyn ConfidentialityClassifier>,
    ledger: Arc<Ledger>,
    max_concurrency: usize,
    state: watch::Sender<RunState>,
}

impl Scanner {
    pub fn new(
        bucket: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        classifier: Arc<dyn ConfidentialityClassifier>,
        ledger: Arc<Ledger>,
    ) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            bucket: bucket.into(),
            store,
            classifier,
            ledger,
            max_concurrency: crate::config::DEFAULT_MAX_CONCURRENCY,
            state,
        }
    }

    /// Classify-stage parallelism. Zero is treated as one.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn transition(&self, next: RunState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            info!(bucket = %self.bucket, from = ?prev, to = ?next, "Run state changed");
        }
    }

    fn finish(&self, mut summary: PipelineSummary, cancelled: bool) -> RunOutcome {
        summary.finished_at = Some(Utc::now());
        if cancelled {
            self.transition(RunState::Cancelled);
            RunOutcome::Cancelled(summary)
        } else {
            self.transition(RunState::Completed);
            RunOutcome::Completed(summary)
        }
    }

    fn fault(&self, err: PipelineError) -> PipelineError {
        error!(bucket = %self.bucket, error = %err, "Scan failed");
        self.transition(RunState::Faulted);
        err
    }

    /// Runs one scan of the bucket.
    ///
    /// `Err` only for run-fatal problems (listing, ledger I/O). Cancellation is
    /// a normal outcome.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunOutcome, PipelineError> {
        let mut summary = PipelineSummary {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        info!(path = %self.ledger.path().display(), "Loading processed files");
        let resume_set = match self.ledger.load().await {
            Ok(set) => set,
            Err(e) => return Err(self.fault(e.into())),
        };

        // List
        self.transition(RunState::Listing);
        if cancel.is_cancelled() {
            return Ok(self.finish(summary, true));
        }
        info!(bucket = %self.bucket, "Listing objects");
        let listing = match self.store.list(&self.bucket).await {
            Ok(listing) => listing,
            Err(source) => {
                return Err(self.fault(PipelineError::List {
                    bucket: self.bucket.clone(),
                    source,
                }))
            }
        };
        summary.listed = listing.len();
        info!(bucket = %self.bucket, count = listing.len(), "Retrieved objects from bucket");

        // Filter
        if cancel.is_cancelled() {
            return Ok(self.finish(summary, true));
        }
        let tasks = filter_listing(listing, &resume_set, &mut summary);
        let queued = tasks.len();
        info!(
            to_process = queued,
            markers = summary.skipped_markers,
            already_processed = summary.skipped_processed,
            "Filtered objects"
        );

        // Classify → Record
        self.transition(RunState::Draining);
        let stage_token = cancel.child_token();
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = tokio::spawn(record_stage(
            Arc::clone(&self.ledger),
            rx,
            resume_set,
            stage_token.clone(),
        ));

        let (classified, undelivered) = self.classify_stage(tasks, tx, &stage_token).await;
        summary.admitted = classified;
        let report = match recorder.await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => return Err(self.fault(e)),
            Err(e) => return Err(self.fault(e.into())),
        };

        summary.recorded = report.recorded;
        summary.flagged = report.flagged;
        summary.clean = report.clean;
        summary.errors = report.errors;
        summary.unparsed = report.unparsed;
        summary.discarded = report.discarded + undelivered;
        summary.resume_set_size = report.resume_set_size;
        if summary.discarded > 0 {
            info!(
                discarded = summary.discarded,
                "Dropped results that completed after cancellation"
            );
        }

        let cancelled = classified < queued || report.interrupted;
        Ok(self.finish(summary, cancelled))
    }

    /// Returns how many tasks were classified and how many of those could not
    /// be handed to Record.
    async fn classify_stage(
        &self,
        tasks: Vec<ScanTask>,
        tx: mpsc::UnboundedSender<ScanResult>,
        token: &CancellationToken,
    ) -> (usize, usize) {
        let results = stream::iter(tasks)
            .take_while(|_| futures::future::ready(!token.is_cancelled()))
            .map(|task| self.classify_task(task))
            .buffer_unordered(self.max_concurrency);
        futures::pin_mut!(results);

        let mut classified = 0;
        let mut undelivered = 0;
        while let Some(result) = results.next().await {
            classified += 1;
            if let Err(mpsc::error::SendError(result)) = tx.send(result) {
                debug!(key = %result.key, "Record stage closed; result dropped");
                undelivered += 1;
            }
        }
        (classified, undelivered)
    }

    async fn classify_task(&self, task: ScanTask) -> ScanResult {
        debug!(key = %task.key, "Processing file");
        let verdict = match self.inspect(&task.key).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(key = %task.key, error = %format!("{e:#}"), "Failed to classify file");
                Verdict::Error
            }
        };
        info!(key = %task.key, %verdict, "Classified file");
        ScanResult {
            key: task.key,
            verdict,
        }
    }

    async fn inspect(&self, key: &str) -> anyhow::Result<Verdict> {
        let bytes = self
            .store
            .fetch(&self.bucket, key)
            .await
            .with_context(|| format!("downloading {key}"))?;
        debug!(key, size = bytes.len(), "File downloaded");

        let owned_key = key.to_string();
        let document =
            tokio::task::spawn_blocking(move || normalizer::normalize(&owned_key, bytes))
                .await
                .context("normalizing document")?;

        let raw = self
            .classifier
            .classify(&document.bytes, &document.content_type)
            .await
            .with_context(|| format!("classifying {key}"))?;
        Ok(classifier::normalize_verdict(&raw))
    }
}

/// Drops container markers and keys already in the ledger. Duplicate keys
/// inside one listing are all kept.
fn filter_listing(
    listing: Vec<ObjectDescriptor>,
    resume_set: &HashSet<String>,
    summary: &mut PipelineSummary,
) -> Vec<ScanTask> {
    let mut tasks = Vec::with_capacity(listing.len());
    for object in listing {
        if is_container_marker(&object.key) {
            debug!(key = %object.key, "Skipping directory");
            summary.skipped_markers += 1;
        } else if resume_set.contains(&object.key) {
            summary.skipped_processed += 1;
        } else {
            tasks.push(ScanTask { key: object.key });
        }
    }
    tasks
}

async fn record_stage(
    ledger: Arc<Ledger>,
    mut rx: mpsc::UnboundedReceiver<ScanResult>,
    mut resume_set: HashSet<String>,
    token: CancellationToken,
) -> Result<RecordReport, PipelineError> {
    let mut report = RecordReport::default();
    while let Some(result) = rx.recv().await {
        if token.is_cancelled() {
            report.interrupted = true;
            report.discarded += 1;
            rx.close();
            while rx.recv().await.is_some() {
                report.discarded += 1;
            }
            break;
        }

        if let Err(e) = ledger.append(&LedgerEntry::from(&result)).await {
            token.cancel();
            return Err(e.into());
        }
        resume_set.insert(result.key.clone());

        report.recorded += 1;
        match &result.verdict {
            Verdict::Boolean(true) => report.flagged += 1,
            Verdict::Boolean(false) => report.clean += 1,
            Verdict::Error => report.errors += 1,
            Verdict::Raw(raw) => {
                warn!(key = %result.key, %raw, "Classifier answer was not a boolean");
                report.unparsed += 1;
            }
        }
        debug!(key = %result.key, verdict = %result.verdict, "Processed file");
    }
    report.resume_set_size = resume_set.len();
    Ok(report)
}

pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut reg = ProviderRegistry::new();

    if let (Some(key), Some(base)) = (
        std::env::var_os("OPENAI_API_KEY"),
        std::env::var_os("OPENAI_BASE_URL"),
    ) {
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_key: Some(key.to_string_lossy().into_owned()),
            base_url: base.to_string_lossy().into_owned(),
            chat_model: config.classifier.model.clone(),
        });
        reg = reg.with_llm("openai", Arc::new(provider));
    }

    if let Some(base) = std::env::var_os("LMSTUDIO_BASE_URL") {
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_key: None,
            base_url: base.to_string_lossy().into_owned(),
            chat_model: config.classifier.model.clone(),
        });
        reg = reg.with_llm("lmstudio", Arc::new(provider));
    }

    reg.set_preferred_llm(&config.classifier.provider)
}

pub fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.store.provider.as_str() {
        "local" => {
            let root = config.store.root.as_deref().unwrap_or(".");
            Ok(Arc::new(LocalStore::new(root)))
        }
        other => anyhow::bail!("unknown store provider: {other}"),
    }
}

/// Wires a scanner from configuration. Fails before any work starts when the
/// bucket is missing or a provider is not available.
pub fn build_scanner(config: &AppConfig) -> anyhow::Result<Scanner> {
    let bucket = config.bucket()?;
    info!(bucket, ledger = %config.ledger.path, "Initializing scanner");

    let store = build_store(config)?;
    let registry = build_registry(config);
    let llm = registry.llm(None).with_context(|| {
        format!(
            "classifier provider '{}' is not available (registered: {:?})",
            config.classifier.provider,
            registry.llm_names()
        )
    })?;
    let classifier = LlmClassifier::new(llm, config.classifier.instruction.clone());

    Ok(Scanner::new(
        bucket,
        store,
        Arc::new(classifier),
        Arc::new(Ledger::new(&config.ledger.path)),
    )
    .with_max_concurrency(config.pipeline.max_concurrency))
}
