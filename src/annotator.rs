//! Annotation provider abstraction and implementations.
//!
//! Defines the [`Annotator`] trait and concrete implementations:
//! - **[`DisabledAnnotator`]** — always fails; used when enrichment is not configured.
//! - **[`HttpAnnotator`]** — POSTs a media reference to a JSON annotation endpoint.
//!
//! # Provider Selection
//!
//! Use [`create_annotator`] to instantiate the appropriate provider based
//! on the configuration:
//!
//! ```rust
//! # use collection_harness::config::EnrichmentConfig;
//! # use collection_harness::annotator::{create_annotator, Annotator};
//! let config = EnrichmentConfig::default(); // provider = "disabled"
//! let annotator = create_annotator(&config).unwrap();
//! assert_eq!(annotator.model_name(), "disabled");
//! ```
//!
//! # Wire format
//!
//! Request body:
//!
//! ```json
//! {"model": "vision-1", "media_url": "https://...", "context": "optional text"}
//! ```
//!
//! Response body is either the payload itself or wrapped as
//! `{"annotation": {...}}`, with fields `title`, `description`, `tags`,
//! `patterns`. Any non-success status is an annotation failure; partial
//! payloads are never produced.

use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{token_from_env, EnrichmentConfig};
use crate::error::{PipelineError, Result};
use crate::models::AnnotationPayload;

/// An external service that describes a media item.
#[async_trait]
pub trait Annotator: Send + Sync {
    /// Model identifier stamped on every enrichment this provider produces.
    fn model_name(&self) -> &str;

    /// Annotate the media at `media_url`, optionally with existing text.
    async fn annotate(&self, media_url: &str, context: Option<&str>) -> Result<AnnotationPayload>;
}

// ============ Disabled Provider ============

/// A no-op annotator that always returns errors.
pub struct DisabledAnnotator;

#[async_trait]
impl Annotator for DisabledAnnotator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn annotate(&self, _media_url: &str, _context: Option<&str>) -> Result<AnnotationPayload> {
        Err(PipelineError::Annotation(
            "enrichment provider is disabled".to_string(),
        ))
    }
}

// ============ HTTP Provider ============

/// Annotator backed by a JSON HTTP endpoint.
pub struct HttpAnnotator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    token: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnnotationBody {
    Wrapped { annotation: AnnotationPayload },
    Bare(AnnotationPayload),
}

impl HttpAnnotator {
    pub fn new(config: &EnrichmentConfig) -> anyhow::Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("enrichment.endpoint required for http provider"))?;
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("enrichment.model required for http provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model,
            token: token_from_env(config.token_env.as_deref())?,
        })
    }
}

#[async_trait]
impl Annotator for HttpAnnotator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn annotate(&self, media_url: &str, context: Option<&str>) -> Result<AnnotationPayload> {
        let body = serde_json::json!({
            "model": self.model,
            "media_url": media_url,
            "context": context,
        });

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::Annotation(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(PipelineError::Annotation(format!(
                "HTTP {}: {}",
                status,
                text.chars().take(300).collect::<String>()
            )));
        }

        parse_annotation(&text)
    }
}

fn parse_annotation(text: &str) -> Result<AnnotationPayload> {
    let body: AnnotationBody = serde_json::from_str(text)
        .map_err(|e| PipelineError::Annotation(format!("invalid annotation response: {}", e)))?;
    let payload = match body {
        AnnotationBody::Wrapped { annotation } => annotation,
        AnnotationBody::Bare(p) => p,
    };
    if payload.title.is_empty() && payload.description.is_empty() {
        return Err(PipelineError::Annotation(
            "annotation response had neither title nor description".to_string(),
        ));
    }
    Ok(payload)
}

/// Create the appropriate [`Annotator`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledAnnotator`] |
/// | `"http"` | [`HttpAnnotator`] |
pub fn create_annotator(config: &EnrichmentConfig) -> anyhow::Result<Box<dyn Annotator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledAnnotator)),
        "http" => Ok(Box::new(HttpAnnotator::new(config)?)),
        other => bail!("Unknown enrichment provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_wrapped_payloads() {
        let bare = parse_annotation(
            r#"{"title": "Sunset", "description": "Orange sky", "tags": ["sky"], "patterns": ["gradient"]}"#,
        )
        .unwrap();
        assert_eq!(bare.title, "Sunset");
        assert_eq!(bare.patterns, vec!["gradient".to_string()]);

        let wrapped =
            parse_annotation(r#"{"annotation": {"title": "Cat", "description": "A cat"}}"#).unwrap();
        assert_eq!(wrapped.title, "Cat");
        assert!(wrapped.tags.is_empty());
    }

    #[test]
    fn empty_or_garbage_payload_is_a_failure() {
        assert!(matches!(
            parse_annotation("{}"),
            Err(PipelineError::Annotation(_))
        ));
        assert!(matches!(
            parse_annotation("<html>"),
            Err(PipelineError::Annotation(_))
        ));
    }

    #[tokio::test]
    async fn disabled_annotator_always_fails() {
        let a = DisabledAnnotator;
        assert!(a.annotate("https://x/y.jpg", None).await.is_err());
    }
}
