//! Batch generation of child nodes
//!
//! 1. Resolve the parent's text
//! 2. Fan out N generation requests concurrently; blank or failed ones are dropped
//! 3. Place surviving generations one at a time, in request order
//! 4. Broadcast each confirmed node as it lands, then one batch summary
//!
//! Per-item failures never escape: they lower the success count.

use super::context::resolve_context;
use super::placement::{place_node, NodeDraft};
use super::{pause, LoomServices, OrchestratorError};
use crate::broadcast::{GenerationSummary, LoomEvent};
use crate::provider::{Generation, GenerationParams};
use crate::tree::{Address, NodeId, Placement, TreeRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Generate `count` continuations under `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub tree: TreeRef,
    pub parent_id: NodeId,
    /// Parent text; read from the chain when absent.
    #[serde(default)]
    pub parent_content: Option<String>,
    pub count: usize,
    /// Identity the new nodes are attributed to; the signer when absent.
    #[serde(default)]
    pub requester: Option<Address>,
    pub model_id: String,
    #[serde(default)]
    pub params: GenerationParams,
    #[serde(default)]
    pub placement: Placement,
}

pub struct NodeCreator {
    services: Arc<LoomServices>,
}

impl NodeCreator {
    pub fn new(services: Arc<LoomServices>) -> Self {
        Self { services }
    }

    /// Run one generation batch and return its summary.
    ///
    /// Only malformed requests and an unreadable parent are returned as
    /// errors; everything after generation starts is reported in the summary.
    pub async fn generate_children(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationSummary, OrchestratorError> {
        self.validate(&request)?;
        let services = &self.services;

        let context = resolve_context(
            services,
            &request.tree,
            &request.parent_id,
            request.parent_content.as_deref(),
        )
        .await?;

        let generations = self.generate_all(&request, &context).await;
        let survivors: Vec<Generation> = generations.into_iter().flatten().collect();
        info!(
            parent = %request.parent_id,
            requested = request.count,
            generated = survivors.len(),
            "generation fan-out finished"
        );

        let spacing = services.config.creation.submission_spacing();
        let mut success_count = 0;
        for (i, generation) in survivors.into_iter().enumerate() {
            if i > 0 {
                pause(spacing).await;
            }
            let draft = NodeDraft {
                parent_id: request.parent_id.clone(),
                token_supply: generation.token_supply(),
                text: generation.text,
                model_id: request.model_id.clone(),
                placement: request.placement,
                author: request.requester.clone(),
            };
            match place_node(services, &request.tree, draft).await {
                Ok(placed) => {
                    success_count += 1;
                    info!(node = %placed.view.node_id, tx = %placed.transaction_hash, "generated node confirmed");
                    services.emit(LoomEvent::NodeCreated(placed.view));
                }
                Err(e) => {
                    warn!(
                        parent = %request.parent_id,
                        error = %e,
                        revert_reason = e.revert_reason().unwrap_or("-"),
                        "failed to place generated node"
                    );
                }
            }
        }

        let summary = summarize(success_count, request.count);
        services.emit(LoomEvent::GenerationComplete(summary.clone()));
        Ok(summary)
    }

    fn validate(&self, request: &GenerateRequest) -> Result<(), OrchestratorError> {
        let max = self.services.config.creation.max_batch_size;
        if request.count == 0 || request.count > max {
            return Err(OrchestratorError::InvalidRequest(format!(
                "count must be between 1 and {}, got {}",
                max, request.count
            )));
        }
        if request.model_id.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest("model id is required".into()));
        }
        if request.placement.mints_token() && request.tree.nft_address.is_none() {
            return Err(OrchestratorError::InvalidRequest(format!(
                "tree {} has no NFT contract for token-bearing nodes",
                request.tree.address
            )));
        }
        Ok(())
    }

    /// One slot per requested generation, in request order; `None` where dropped.
    async fn generate_all(&self, request: &GenerateRequest, context: &str) -> Vec<Option<Generation>> {
        let defaults = &self.services.config.generation;
        let params = GenerationParams {
            temperature: request.params.temperature.or(defaults.temperature),
            max_tokens: request.params.max_tokens.or(defaults.max_tokens),
        };

        let mut tasks = JoinSet::new();
        for i in 0..request.count {
            let provider = self.services.provider.clone();
            let model_id = request.model_id.clone();
            let prompt = context.to_string();
            let params = params.clone();
            tasks.spawn(async move { (i, provider.generate(&model_id, &prompt, &params).await) });
        }

        let mut slots: Vec<Option<Generation>> = vec![None; request.count];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, Ok(generation))) if !generation.is_blank() => slots[i] = Some(generation),
                Ok((i, Ok(_))) => warn!(attempt = i + 1, "generation returned empty text, dropped"),
                Ok((i, Err(e))) => warn!(attempt = i + 1, error = %e, "generation failed, dropped"),
                Err(e) => warn!(error = %e, "generation task aborted"),
            }
        }
        slots
    }
}

fn summarize(success_count: usize, total_requested: usize) -> GenerationSummary {
    let failed_count = total_requested - success_count;
    let message = if failed_count == 0 {
        format!("Generated {} node{}", success_count, plural(success_count))
    } else if success_count == 0 {
        format!("Failed to generate any of {} requested nodes", total_requested)
    } else {
        format!("Generated {} of {} requested nodes", success_count, total_requested)
    };
    let warnings = (success_count > 0 && failed_count > 0).then(|| {
        vec![format!(
            "{} generation{} failed or returned empty responses",
            failed_count,
            plural(failed_count)
        )]
    });
    GenerationSummary {
        success: success_count > 0,
        success_count,
        failed_count,
        total_requested,
        message,
        warnings,
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
