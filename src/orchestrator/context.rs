//! Prompt context resolution

use super::{LoomServices, OrchestratorError};
use crate::chain::read_node;
use crate::tree::{unwrap_token_content, NodeId, TreeRef};

/// Readable text for raw stored content.
///
/// Store references are fetched; token metadata envelopes are unwrapped.
pub async fn resolve_text(services: &LoomServices, raw: &str) -> Result<String, OrchestratorError> {
    if services.store.is_reference(raw) {
        return Ok(services.store.fetch(raw).await?);
    }
    Ok(unwrap_token_content(raw))
}

/// The text a continuation of `parent_id` is generated from.
///
/// Supplied content wins; the root-parent sentinel has no content to read.
pub async fn resolve_context(
    services: &LoomServices,
    tree: &TreeRef,
    parent_id: &NodeId,
    supplied: Option<&str>,
) -> Result<String, OrchestratorError> {
    if let Some(text) = supplied {
        return Ok(text.to_string());
    }
    if parent_id.is_root_parent() {
        return Ok(String::new());
    }
    let record = read_node(services.chain.as_ref(), &tree.address, parent_id).await?;
    resolve_text(services, &record.content).await
}
