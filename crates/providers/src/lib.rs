//! Provider abstractions for language models and object stores.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod local;
pub mod openai;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket not found: {0}")]
    BucketNotFound(String),
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store task failed: {0}")]
    Task(String),
}

/// One entry of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub key: String,
    pub size: u64,
}

/// Document handed to a model next to the instruction.
#[derive(Debug, Clone, Copy)]
pub struct Attachment<'a> {
    pub content_type: &'a str,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifyRequest<'a> {
    pub instruction: &'a str,
    pub attachment: Attachment<'a>,
}

/// Text blocks returned by the model, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub messages: Vec<String>,
}

#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn classify(&self, request: ClassifyRequest<'_>)
        -> Result<ClassifyResponse, ProviderError>;
}

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Single listing call; whatever the backend returns is the whole listing.
    async fn list(&self, bucket: &str) -> Result<Vec<ObjectDescriptor>, StoreError>;

    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    llms: HashMap<String, Arc<dyn LlmProvider>>,
    pub preferred_llm: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm(mut self, name: &str, provider: Arc<dyn LlmProvider>) -> Self {
        self.llms.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred_llm(mut self, name: &str) -> Self {
        self.preferred_llm = Some(name.to_string());
        self
    }

    pub fn llm_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.llms.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn llm(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred_llm.clone())
            .ok_or_else(|| ProviderError::UnknownProvider("no llm provider configured".into()))?;
        self.llms
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait::async_trait]
    impl LlmProvider for Fixed {
        async fn classify(
            &self,
            _request: ClassifyRequest<'_>,
        ) -> Result<ClassifyResponse, ProviderError> {
            Ok(ClassifyResponse {
                messages: vec![self.0.to_string()],
            })
        }
    }

    #[tokio::test]
    async fn registry_resolves_named_and_preferred() {
        let reg = ProviderRegistry::new()
            .with_llm("a", Arc::new(Fixed("from a")))
            .with_llm("b", Arc::new(Fixed("from b")))
            .set_preferred_llm("b");
        let request = ClassifyRequest {
            instruction: "check",
            attachment: Attachment {
                content_type: "text/plain",
                data: b"hello",
            },
        };

        let named = reg.llm(Some("a")).unwrap().classify(request).await.unwrap();
        assert_eq!(named.messages, vec!["from a"]);
        let preferred = reg.llm(None).unwrap().classify(request).await.unwrap();
        assert_eq!(preferred.messages, vec!["from b"]);
        assert_eq!(reg.llm_names(), vec!["a", "b"]);
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let reg = ProviderRegistry::new();
        assert!(matches!(
            reg.llm(Some("missing")),
            Err(ProviderError::UnknownProvider(name)) if name == "missing"
        ));
        assert!(matches!(reg.llm(None), Err(ProviderError::UnknownProvider(_))));
    }
}
