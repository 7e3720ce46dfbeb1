//! Durable storage for generated images.
//!
//! Every artifact produced during a refinement run is written here before it
//! is critiqued, so nothing generated is lost when a run fails.

mod sanitize;
mod store;

pub use sanitize::{
    is_allowed_char, path_component, prompt_prefix, sanitize_filename, PROMPT_PREFIX_CHARS,
};
pub use store::{ArtifactStore, FsArtifactStore, StoreError};
