//! Client for the hosted prompt-rewriting app that turns one prompt into
//! several variations.

use crate::config::DiversifyConfig;

use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("prompt diversification API key is missing")]
    MissingApiKey,
    #[error("prompt diversification app id is not configured")]
    MissingAppId,
    #[error("prompt diversification request failed - {0}")]
    Request(#[from] reqwest::Error),
    #[error("prompt diversification service returned {status} - {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse prompt diversification response - {0}")]
    Parse(String),
}

pub struct DiversifyClient {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
    iterate_app_id: Option<String>,
    version: String,
    output_field: String,
    api_key: String,
}

impl DiversifyClient {
    pub fn from_config(config: &DiversifyConfig) -> Result<Self, ServiceError> {
        let app_id = config.app_id.clone().ok_or(ServiceError::MissingAppId)?;
        let api_key = config.resolve_api_key().ok_or(ServiceError::MissingApiKey)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id,
            iterate_app_id: config.iterate_app_id.clone(),
            version: config.version.clone(),
            output_field: config.output_field.clone(),
            api_key,
        })
    }

    pub async fn diversify(&self, prompt: &str) -> Result<Vec<String>, ServiceError> {
        let inputs = json!({
            "user_generation": prompt,
            "version": self.version,
        });
        self.run_app(&self.app_id, inputs).await
    }

    /// Variations steered by the captions of previously selected images.
    pub async fn iterate_selected(
        &self,
        prompt: &str,
        selected: &[String],
    ) -> Result<Vec<String>, ServiceError> {
        let Some(app_id) = &self.iterate_app_id else {
            log::debug!("no iterate app configured, diversifying without selection");
            return self.diversify(prompt).await;
        };
        let inputs = json!({
            "user_generation": prompt,
            "selected_images": selected.join("\n"),
            "version": self.version,
        });
        self.run_app(app_id, inputs).await
    }

    async fn run_app(&self, app_id: &str, inputs: Value) -> Result<Vec<String>, ServiceError> {
        let url = format!("{}/api/released-app/{app_id}/run", self.base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "inputs": inputs }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_variations(&body, &self.output_field)
    }
}

/// Extracts the numbered variations from a newline-delimited JSON response.
pub fn parse_variations(body: &str, output_field: &str) -> Result<Vec<String>, ServiceError> {
    let mut outputs = None;

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let content: Value = match serde_json::from_str(line) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("failed to decode response line - {e}");
                continue;
            }
        };
        let value = &content["value"];
        if value["type"] == "outputs" {
            outputs = Some(
                value["values"][output_field]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            );
        }
    }

    let raw = outputs.ok_or_else(|| ServiceError::Parse("no outputs record".into()))?;

    let mut prompts = Vec::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match line.split_once('.') {
            Some((_, prompt)) if !prompt.trim().is_empty() => prompts.push(prompt.trim().to_string()),
            _ => log::warn!("failed parsing variation '{line}'"),
        }
    }
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_numbered_variations_from_the_outputs_record() {
        let body = r#"
{"type":"chunk","value":{"type":"chunk","value":"thinking"}}
not json at all
{"type":"chunk","value":{"type":"outputs","values":{"diverse_variations":"1. A beach at dawn\n2. A stormy beach, oil on canvas\n\nno number here\n3. A beach seen from a cliff"}}}
"#;
        let prompts = parse_variations(body, "diverse_variations").unwrap();
        assert_eq!(
            prompts,
            vec![
                "A beach at dawn",
                "A stormy beach, oil on canvas",
                "A beach seen from a cliff"
            ]
        );
    }

    #[test]
    fn missing_outputs_record_is_an_error() {
        let body = r#"{"type":"chunk","value":{"type":"chunk"}}"#;
        assert!(matches!(
            parse_variations(body, "diverse_variations"),
            Err(ServiceError::Parse(_))
        ));
    }

    #[test]
    fn client_requires_app_id_and_key() {
        let mut config = DiversifyConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(matches!(
            DiversifyClient::from_config(&config),
            Err(ServiceError::MissingAppId)
        ));

        config.app_id = Some("3a371ca7".into());
        config.api_key = Some("token".into());
        assert!(DiversifyClient::from_config(&config).is_ok());
    }
}
