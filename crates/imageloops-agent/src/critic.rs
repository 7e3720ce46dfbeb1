use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use imageloops_critic::{CriticPrompts, Critique, CritiqueParser};

use crate::{CritiqueError, ImageArtifact, ImageCritic, ModelRef, ReplicateClient};

/// Default image-captioning model used as critic
pub const DEFAULT_CRITIC_MODEL: &str =
    "yorickvp/llava-13b:6bc1c7bb0d2a34e413301fee8f7cc728d2d4e75bfab186aa995f63292bda92fc";

/// Image critic backed by a Replicate vision-language model
pub struct ReplicateCritic {
    client: Arc<ReplicateClient>,
    model: ModelRef,
    model_name: String,
    parser: CritiqueParser,
}

impl ReplicateCritic {
    pub fn new(client: Arc<ReplicateClient>, model: ModelRef, parser: CritiqueParser) -> Self {
        let model_name = format!("{}/{}", model.owner, model.name);
        Self {
            client,
            model,
            model_name,
            parser,
        }
    }
}

#[async_trait]
impl ImageCritic for ReplicateCritic {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn critique(
        &self,
        artifact: &ImageArtifact,
        prompt: &str,
    ) -> Result<Critique, CritiqueError> {
        let bytes = tokio::fs::read(&artifact.path)
            .await
            .map_err(|source| CritiqueError::UnreadableArtifact {
                path: artifact.path.clone(),
                source,
            })?;
        if bytes.is_empty() {
            return Err(CritiqueError::UnreadableArtifact {
                path: artifact.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "file is empty"),
            });
        }

        let image = format!(
            "data:{};base64,{}",
            mime_type(&artifact.path),
            STANDARD.encode(&bytes)
        );
        debug!(
            model = %self.model,
            image_bytes = bytes.len(),
            "Requesting critique"
        );

        let output = self
            .client
            .run(
                &self.model,
                json!({
                    "image": image,
                    "prompt": CriticPrompts::build_review_prompt(prompt),
                }),
            )
            .await?;

        let text = collect_text(&output);
        if text.trim().is_empty() {
            return Err(CritiqueError::EmptyOutput);
        }
        info!(chars = text.len(), "Critique received");

        Ok(self.parser.parse(&text)?)
    }
}

/// Vision models stream their answer as a list of string chunks
fn collect_text(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

fn mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_text_joins_chunks() {
        assert_eq!(
            collect_text(&json!(["The image ", "shows rain.", " {content: 7}"])),
            "The image shows rain. {content: 7}"
        );
        assert_eq!(collect_text(&json!("whole")), "whole");
        assert_eq!(collect_text(&Value::Null), "");
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_type(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_type(Path::new("a")), "image/png");
    }
}
