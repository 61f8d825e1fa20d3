//! Confidentiality classification contract and verdict post-processing.

use crate::models::Verdict;
use providers::{Attachment, ClassifyRequest, LlmProvider, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier call failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Anything that can judge a document. Returns the raw answer; the pipeline
/// turns it into a [`Verdict`] with [`normalize_verdict`].
#[async_trait::async_trait]
pub trait ConfidentialityClassifier: Send + Sync {
    async fn classify(&self, content: &[u8], content_type: &str)
        -> Result<String, ClassifierError>;
}

/// Classifier backed by a language model provider.
pub struct LlmClassifier {
    provider: Arc<dyn LlmProvider>,
    instruction: String,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>, instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        trace!(%instruction, "Initialized classifier");
        Self {
            provider,
            instruction,
        }
    }
}

#[async_trait::async_trait]
impl ConfidentialityClassifier for LlmClassifier {
    async fn classify(
        &self,
        content: &[u8],
        content_type: &str,
    ) -> Result<String, ClassifierError> {
        let response = self
            .provider
            .classify(ClassifyRequest {
                instruction: &self.instruction,
                attachment: Attachment {
                    content_type,
                    data: content,
                },
            })
            .await?;

        let mut messages = response.messages.into_iter();
        let answer = messages.next().unwrap_or_else(|| "Null".to_string());
        trace!(%answer, content_type, "Received classifier response");
        for extra in messages {
            trace!(%extra, "Ignoring additional classifier message");
        }
        Ok(answer)
    }
}

/// Only the first whitespace-separated token counts. `true`/`false` in any case
/// become the canonical boolean; an empty answer reads as `False`; any other
/// token is kept verbatim.
pub fn normalize_verdict(raw: &str) -> Verdict {
    let Some(token) = raw.split_whitespace().next() else {
        return Verdict::Boolean(false);
    };
    if token.eq_ignore_ascii_case("true") {
        Verdict::Boolean(true)
    } else if token.eq_ignore_ascii_case("false") {
        Verdict::Boolean(false)
    } else {
        Verdict::Raw(token.to_string())
    }
}
