use std::sync::Arc;

use futures_util::future::join_all;
use hc_infra::types::Server;
use hc_infra::{ActionWatcher, CloudClient};
use tracing::{debug, warn};

use super::config::DesiredServer;
use super::executor::{Executor, Outcome};
use super::locator::locate;
use super::planner::plan;
use super::projector::{ServerRecord, project};
use crate::args::ResourceRef;
use crate::error::{ModuleError, Result};
use crate::module::ModuleResponse;

/// A target whose reconciliation failed. `changed` records whether anything
/// was applied before the failure.
#[derive(Debug)]
pub struct TargetFailure {
    pub target: ResourceRef,
    pub error: ModuleError,
    pub changed: bool,
    pub messages: Vec<String>,
}

impl TargetFailure {
    fn before_changes(target: &ResourceRef, error: ModuleError) -> Self {
        Self {
            target: target.clone(),
            error,
            changed: false,
            messages: Vec::new(),
        }
    }

    pub fn message(&self) -> String {
        match &self.error {
            ModuleError::NotFound(_) | ModuleError::Validation(_) => self.error.to_string(),
            other => format!("server {}: {other}", self.target),
        }
    }
}

/// Combined result of reconciling every target.
#[derive(Debug, Default)]
pub struct AggregateResult {
    pub changed: bool,
    pub servers: Vec<Server>,
    pub messages: Vec<String>,
    pub failures: Vec<TargetFailure>,
}

impl AggregateResult {
    fn collect(results: Vec<std::result::Result<Outcome, TargetFailure>>) -> Self {
        let mut aggregate = Self::default();
        for result in results {
            match result {
                Ok(outcome) => {
                    aggregate.changed |= outcome.changed;
                    aggregate.messages.extend(outcome.messages);
                    aggregate.servers.extend(outcome.server);
                }
                Err(failure) => {
                    aggregate.changed |= failure.changed;
                    aggregate.messages.extend(failure.messages.iter().cloned());
                    aggregate.failures.push(failure);
                }
            }
        }
        aggregate
    }

    pub fn failed(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn error(&self) -> Option<ModuleError> {
        self.failed().then(|| {
            ModuleError::Aggregate(self.failures.iter().map(TargetFailure::message).collect())
        })
    }

    /// Successful servers are reported even when other targets failed.
    pub fn into_response(self) -> Result<ModuleResponse> {
        let mut parts = self.messages.clone();
        if let Some(error) = self.error() {
            parts.push(error.to_string());
        }
        let records: Vec<ServerRecord> = self.servers.iter().map(project).collect();

        let response = ModuleResponse::new()
            .msg(parts.join(", "))
            .set_changed(self.changed)
            .set("servers", &records)?;
        Ok(if self.failed() {
            response.failed()
        } else {
            response
        })
    }
}

/// Runs one independent reconciliation per target, concurrently.
pub struct Reconciler {
    client: Arc<dyn CloudClient>,
    watcher: Arc<ActionWatcher>,
}

impl Reconciler {
    pub fn new(client: Arc<dyn CloudClient>, watcher: Arc<ActionWatcher>) -> Self {
        Self { client, watcher }
    }

    /// Reconcile every target of `desired`. A failing target never cancels
    /// its siblings; all of them are awaited before aggregating.
    pub async fn reconcile_all(&self, desired: &DesiredServer) -> AggregateResult {
        let results = join_all(
            desired
                .targets
                .iter()
                .map(|target| self.reconcile(desired, target)),
        )
        .await;

        let aggregate = AggregateResult::collect(results);
        if aggregate.failed() {
            warn!(
                failed = aggregate.failures.len(),
                targets = desired.targets.len(),
                "reconciliation failed for some targets"
            );
        }
        aggregate
    }

    async fn reconcile(
        &self,
        desired: &DesiredServer,
        target: &ResourceRef,
    ) -> std::result::Result<Outcome, TargetFailure> {
        let current = locate(self.client.as_ref(), target)
            .await
            .map_err(|e| TargetFailure::before_changes(target, e))?;
        let intents = plan(current.as_ref(), desired, target)
            .map_err(|e| TargetFailure::before_changes(target, e))?;
        debug!(server = %target, intents = ?intents, "plan computed");

        Executor::new(self.client.as_ref(), &self.watcher)
            .apply(intents, current)
            .await
            .map_err(|aborted| TargetFailure {
                target: target.clone(),
                error: aborted.error,
                changed: aborted.changed,
                messages: aborted.messages,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hc_infra::mock::FakeCloud;
    use hc_infra::types::ServerStatus;

    use super::*;
    use crate::server::config::DesiredState;

    fn reconciler(cloud: &Arc<FakeCloud>) -> Reconciler {
        Reconciler::new(
            cloud.clone(),
            Arc::new(ActionWatcher::new(Duration::from_millis(1))),
        )
    }

    fn off(id: i64, name: &str) -> Server {
        Server {
            status: ServerStatus::Off,
            ..FakeCloud::sample_server(id, name)
        }
    }

    #[tokio::test]
    async fn failures_are_isolated_and_aggregated() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.set_pending_polls(2);
        for id in 1..=5 {
            cloud.add_server(off(id, &format!("web{id}")));
        }
        cloud.fail("power_on:2", "server 2 is locked");
        cloud.fail("power_on:4", "server 4 is locked");

        let mut desired = DesiredServer::new(DesiredState::Running);
        desired.targets = (1..=5).map(ResourceRef::by_id).collect();

        let result = reconciler(&cloud).reconcile_all(&desired).await;

        assert!(result.failed());
        assert!(result.changed);
        assert_eq!(result.failures.len(), 2);
        let ids: Vec<_> = result.servers.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        assert!(result.servers.iter().all(|s| s.status == ServerStatus::Running));

        let message = result.error().unwrap().to_string();
        assert!(message.contains("server 2 is locked"), "{message}");
        assert!(message.contains("server 4 is locked"), "{message}");
    }

    #[tokio::test]
    async fn partial_progress_still_counts_as_changed() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.add_server(off(1, "old"));
        cloud.fail("rename_server:1", "name already used");

        let mut desired = DesiredServer::new(DesiredState::Running);
        desired.targets = vec![ResourceRef {
            id: Some(1),
            name: Some("web1".into()),
        }];

        let result = reconciler(&cloud).reconcile_all(&desired).await;

        assert!(result.failed());
        assert!(result.changed);
        assert!(result.servers.is_empty());
        assert_eq!(result.messages, vec!["Server 1 started"]);
        assert_eq!(cloud.server(1).unwrap().status, ServerStatus::Running);
    }

    #[tokio::test]
    async fn absent_and_missing_is_unchanged() {
        let cloud = Arc::new(FakeCloud::new());
        let mut desired = DesiredServer::new(DesiredState::Absent);
        desired.targets = vec![ResourceRef::by_name("ghost")];

        let result = reconciler(&cloud).reconcile_all(&desired).await;

        assert!(!result.failed());
        assert!(!result.changed);
        assert!(result.servers.is_empty());
        assert!(cloud.mutations().is_empty());
    }

    #[tokio::test]
    async fn response_keeps_successful_data() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.add_server(off(1, "web1"));
        let mut desired = DesiredServer::new(DesiredState::Running);
        desired.targets = vec![ResourceRef::by_name("web1"), ResourceRef::by_id(9)];

        let response = reconciler(&cloud)
            .reconcile_all(&desired)
            .await
            .into_response()
            .unwrap();

        assert!(response.has_failed());
        assert!(response.has_changed());
        assert_eq!(
            response.message(),
            "Server 1 started, Server with id 9 not found"
        );
        let servers = response.data("servers").unwrap().as_array().unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0]["status"], "running");
    }
}
