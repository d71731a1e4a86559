//! Chat-completions classifier.
//!
//! Sends one window per request to an OpenAI-compatible
//! `/v1/chat/completions` endpoint and parses the reply with
//! [`parse_candidates`].

use async_trait::async_trait;
use docsplit_core::DocumentSpanCandidate;
use serde_json::json;
use tracing::debug;

use crate::classifier::{ClassificationError, Classifier, parse_candidates};
use crate::taxonomy::Taxonomy;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct LlmClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    system_prompt: String,
}

impl LlmClassifier {
    pub fn new(api_key: impl Into<String>, taxonomy: &Taxonomy) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            system_prompt: system_prompt(taxonomy),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn system_prompt(taxonomy: &Taxonomy) -> String {
    let categories = taxonomy
        .categories()
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You split scanned document bundles into individual documents.\n\
         The user sends consecutive pages, each introduced by a [PAGE n] tag.\n\
         Identify every complete document in these pages.\n\n\
         Allowed document types (use the exact spelling):\n{categories}\n\n\
         Reply with JSON only, no prose:\n\
         {{\"documents\": [{{\"document_type\": \"...\", \"confidence\": 0.0-1.0, \
         \"page_start\": n, \"page_end\": n, \"suggested_filename\": \"...\"}}]}}\n\n\
         Use the page numbers from the tags. Leave out pages that do not belong \
         to a recognisable document. Reply {{\"documents\": []}} when nothing matches."
    )
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        window: &str,
    ) -> Result<Vec<DocumentSpanCandidate>, ClassificationError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": window },
            ],
            "temperature": 0.0,
        });

        debug!(url = %url, model = %self.model, "classification request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClassificationError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let resp: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ClassificationError::Malformed(format!("response body: {e}")))?;
        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ClassificationError::Malformed("missing choices[0].message.content".into())
            })?;

        parse_candidates(content)
    }

    fn name(&self) -> &str {
        "llm"
    }
}
