use crate::{Attachment, ClassifyRequest, ClassifyResponse, LlmProvider, ProviderError};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::trace;

/// OpenAI-compatible chat completions endpoint. `api_key` is optional so the
/// same client can talk to local servers (LM Studio and friends).
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
}

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    cfg: Arc<OpenAiConfig>,
}

impl OpenAiProvider {
    pub fn new(cfg: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }

    fn chat_body(&self, request: &ClassifyRequest<'_>) -> Value {
        json!({
            "model": self.cfg.chat_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": request.instruction },
                    attachment_part(&request.attachment),
                ],
            }],
        })
    }
}

/// Text is inlined, images go as data URLs, anything else as a file part.
fn attachment_part(attachment: &Attachment<'_>) -> Value {
    let content_type = attachment.content_type;
    if content_type.starts_with("text/") {
        return json!({
            "type": "text",
            "text": String::from_utf8_lossy(attachment.data),
        });
    }
    let data_url = format!(
        "data:{content_type};base64,{}",
        STANDARD.encode(attachment.data)
    );
    if content_type.starts_with("image/") {
        json!({ "type": "image_url", "image_url": { "url": data_url } })
    } else {
        json!({
            "type": "file",
            "file": { "filename": "document", "file_data": data_url },
        })
    }
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessageResp,
}

#[derive(Deserialize)]
struct ChatMessageResp {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Vec<Choice>,
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn classify(
        &self,
        request: ClassifyRequest<'_>,
    ) -> Result<ClassifyResponse, ProviderError> {
        let body = self.chat_body(&request);
        trace!(
            model = %self.cfg.chat_model,
            content_type = request.attachment.content_type,
            size = request.attachment.data.len(),
            "Sending chat completion"
        );

        let mut builder = self
            .client
            .post(format!(
                "{}/v1/chat/completions",
                self.cfg.base_url.trim_end_matches('/')
            ))
            .json(&body);
        if let Some(key) = &self.cfg.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let parsed: ChatApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(response_messages(parsed))
    }
}

/// An empty `content` is still an answer; only missing ones are dropped.
fn response_messages(parsed: ChatApiResponse) -> ClassifyResponse {
    ClassifyResponse {
        messages: parsed
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig {
            api_key: None,
            base_url: "http://localhost:1234".into(),
            chat_model: "test-model".into(),
        })
    }

    fn request<'a>(content_type: &'a str, data: &'a [u8]) -> ClassifyRequest<'a> {
        ClassifyRequest {
            instruction: "Answer True or False",
            attachment: Attachment { content_type, data },
        }
    }

    #[test]
    fn text_attachments_are_inlined() {
        let body = provider().chat_body(&request("text/plain", b"salary table"));
        assert_eq!(body["model"], "test-model");
        let parts = &body["messages"][0]["content"];
        assert_eq!(parts[0]["text"], "Answer True or False");
        assert_eq!(parts[1]["type"], "text");
        assert_eq!(parts[1]["text"], "salary table");
    }

    #[test]
    fn empty_content_is_kept_and_null_content_dropped() {
        let parsed: ChatApiResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":""}},{"message":{"content":null}},{"message":{}}]}"#,
        )
        .unwrap();
        assert_eq!(response_messages(parsed).messages, vec![String::new()]);
    }

    #[test]
    fn images_become_data_urls() {
        let body = provider().chat_body(&request("image/png", &[1, 2, 3]));
        let part = &body["messages"][0]["content"][1];
        assert_eq!(part["type"], "image_url");
        assert_eq!(part["image_url"]["url"], "data:image/png;base64,AQID");
    }

    #[test]
    fn binary_documents_become_file_parts() {
        let body = provider().chat_body(&request("application/pdf", b"%PDF"));
        let part = &body["messages"][0]["content"][1];
        assert_eq!(part["type"], "file");
        assert_eq!(
            part["file"]["file_data"],
            "data:application/pdf;base64,JVBERg=="
        );
    }
}
