//! `hcloud_server`: lifecycle of Hetzner Cloud servers.
//!
//! Arguments are resolved into a [`DesiredServer`], then every target is
//! located, planned and converged independently (see [`orchestrator`]).

pub mod config;
pub mod executor;
pub mod locator;
pub mod orchestrator;
pub mod planner;
pub mod projector;

use std::sync::Arc;

use hc_infra::{ActionWatcher, CloudClient};

pub use config::{DesiredServer, DesiredState, ServerArgs};
pub use orchestrator::{AggregateResult, Reconciler};

use crate::error::{ModuleError, Result};
use crate::module::ModuleResponse;
use projector::{ServerRecord, project};

pub async fn run(
    args: ServerArgs,
    client: Arc<dyn CloudClient>,
    watcher: Arc<ActionWatcher>,
) -> Result<ModuleResponse> {
    let desired = config::resolve(args, client.as_ref()).await?;

    if desired.state == DesiredState::List {
        return list(client.as_ref(), &desired).await;
    }
    if desired.targets.is_empty() {
        return Err(ModuleError::MissingIdentity);
    }

    Reconciler::new(client, watcher)
        .reconcile_all(&desired)
        .await
        .into_response()
}

/// All servers when no target is given, otherwise exactly the targets.
async fn list(client: &dyn CloudClient, desired: &DesiredServer) -> Result<ModuleResponse> {
    let servers = if desired.targets.is_empty() {
        client.list_servers().await?
    } else {
        let mut found = Vec::with_capacity(desired.targets.len());
        for target in &desired.targets {
            found.extend(locator::require(client, target, desired.state).await?);
        }
        found
    };

    let records: Vec<ServerRecord> = servers.iter().map(project).collect();
    ModuleResponse::new()
        .msg("Servers listed")
        .set("servers", &records)
}
