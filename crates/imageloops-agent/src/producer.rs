use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use imageloops_storage::ArtifactStore;

use crate::{GenerationError, ImageArtifact, ImageProducer, ModelRef, ReplicateClient};

/// Default text-to-image model
pub const DEFAULT_GENERATOR_MODEL: &str =
    "stability-ai/sdxl:c221b2b8ef527988fb59bf24a8b97c4561f1c671f73bd389f866bfb27c061316";

/// Image producer backed by a Replicate text-to-image model.
///
/// Downloads the first image the model returns and persists it through the
/// artifact store before handing it back.
pub struct ReplicateProducer {
    client: Arc<ReplicateClient>,
    model: ModelRef,
    model_name: String,
    store: Arc<dyn ArtifactStore>,
}

impl ReplicateProducer {
    pub fn new(client: Arc<ReplicateClient>, model: ModelRef, store: Arc<dyn ArtifactStore>) -> Self {
        let model_name = format!("{}/{}", model.owner, model.name);
        Self {
            client,
            model,
            model_name,
            store,
        }
    }
}

#[async_trait]
impl ImageProducer for ReplicateProducer {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, prompt: &str) -> Result<ImageArtifact, GenerationError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "Generating image");

        let output = self.client.run(&self.model, json!({ "prompt": prompt })).await?;
        let url = first_url(&output).ok_or(GenerationError::EmptyOutput)?;
        info!(url = %url, "Image generated");

        let bytes = self.client.download(&url).await?;
        if bytes.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }

        let created_at = Utc::now();
        let destination =
            self.store
                .destination_for(prompt, created_at, extension_from_url(&url));
        let path = self.store.persist(&bytes, &destination).await?;
        info!(path = %path.display(), "Image saved");

        Ok(ImageArtifact::new(path, prompt)
            .with_source_url(url)
            .with_created_at(created_at))
    }
}

/// First non-empty URL in a prediction output (a list of URLs or a single one)
fn first_url(output: &Value) -> Option<String> {
    match output {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|s| !s.trim().is_empty())
            .map(String::from),
        _ => None,
    }
}

fn extension_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((_, ext)) => match ext.to_ascii_lowercase().as_str() {
            "png" => "png",
            "jpg" | "jpeg" => "jpg",
            "webp" => "webp",
            "gif" => "gif",
            _ => "png",
        },
        None => "png",
    }
}
