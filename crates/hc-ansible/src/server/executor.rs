use hc_infra::types::{Action, ResourceId, Server, ServerSpec};
use hc_infra::{ActionWatcher, CloudClient, Error as InfraError};
use tracing::info;

use super::planner::{DeleteReason, Intent};
use crate::error::ModuleError;

/// What applying a plan did to one server.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    /// Final snapshot, `None` once the server is gone.
    pub server: Option<Server>,
    pub changed: bool,
    pub messages: Vec<String>,
}

/// A plan that stopped part way. Intents applied before the failure stay
/// applied.
#[derive(Debug)]
pub struct Aborted {
    pub error: ModuleError,
    pub changed: bool,
    pub messages: Vec<String>,
}

/// Issues the remote calls for a plan, one intent at a time.
pub struct Executor<'a> {
    client: &'a dyn CloudClient,
    watcher: &'a ActionWatcher,
}

impl<'a> Executor<'a> {
    pub fn new(client: &'a dyn CloudClient, watcher: &'a ActionWatcher) -> Self {
        Self { client, watcher }
    }

    /// Execute `intents` in order starting from `snapshot`, awaiting every
    /// action before the next intent runs.
    pub async fn apply(
        &self,
        intents: Vec<Intent>,
        snapshot: Option<Server>,
    ) -> Result<Outcome, Aborted> {
        let mut outcome = Outcome {
            server: snapshot,
            ..Outcome::default()
        };

        for intent in intents {
            let current = outcome.server.take();
            match self.step(&intent, current).await {
                Ok((server, message)) => {
                    outcome.server = server;
                    outcome.changed = true;
                    outcome.messages.extend(message);
                }
                Err(error) => {
                    return Err(Aborted {
                        error,
                        changed: outcome.changed,
                        messages: outcome.messages,
                    });
                }
            }
        }
        Ok(outcome)
    }

    async fn step(
        &self,
        intent: &Intent,
        current: Option<Server>,
    ) -> Result<(Option<Server>, Option<String>), ModuleError> {
        let (id, message) = match (intent, current.as_ref().map(|server| server.id)) {
            (Intent::Create(spec), _) => return self.create(spec).await,
            (_, None) => return Err(InfraError::Vanished("server".into()).into()),
            (Intent::Delete(reason), Some(id)) => {
                self.client.delete_server(id).await?;
                info!(server_id = id, ?reason, "server deleted");
                let message = match reason {
                    DeleteReason::Absent => format!("Server {id} deleted"),
                    DeleteReason::Recreate => format!("Server {id} deleted (needs recreate)"),
                };
                return Ok((None, Some(message)));
            }
            (Intent::Rename(name), Some(id)) => {
                let renamed = self.client.rename_server(id, name).await?;
                return Ok((Some(renamed), Some(format!("Server {id} renamed to {name}"))));
            }
            (Intent::DetachIso(iso), Some(id)) => {
                self.wait(&self.client.detach_iso(id).await?).await?;
                (id, format!("Server {id} ISO {} detached", iso.id))
            }
            (Intent::AttachIso(iso), Some(id)) => {
                self.wait(&self.client.attach_iso(id, iso).await?).await?;
                (id, format!("Server {id} ISO {} attached", iso.id))
            }
            (Intent::PowerOn, Some(id)) => {
                self.wait(&self.client.power_on(id).await?).await?;
                (id, format!("Server {id} started"))
            }
            (Intent::PowerOff, Some(id)) => {
                self.wait(&self.client.power_off(id).await?).await?;
                (id, format!("Server {id} stopped"))
            }
            (Intent::Reboot, Some(id)) => {
                self.wait(&self.client.reboot(id).await?).await?;
                (id, format!("Server {id} restarted"))
            }
            (Intent::Reset, Some(id)) => {
                self.wait(&self.client.reset(id).await?).await?;
                (id, format!("Server {id} reset"))
            }
            (Intent::EnableRescue { rescue, ssh_keys }, Some(id)) => {
                let action = self.client.enable_rescue(id, *rescue, ssh_keys).await?;
                self.wait(&action).await?;
                (id, format!("Server {id} enabled rescue mode"))
            }
            (Intent::DisableRescue, Some(id)) => {
                self.wait(&self.client.disable_rescue(id).await?).await?;
                (id, format!("Server {id} disabled rescue mode"))
            }
        };

        if intent.is_power_change() {
            info!(server_id = id, %message, "power state changed");
        }
        Ok((Some(self.refresh(id).await?), Some(message)))
    }

    async fn create(
        &self,
        spec: &ServerSpec,
    ) -> Result<(Option<Server>, Option<String>), ModuleError> {
        let created = self.client.create_server(spec).await?;
        let id = created.server.id;
        self.wait(&created.action).await?;
        info!(server_id = id, name = %spec.name, "server created");
        let server = self.client.get_server(id).await?.unwrap_or(created.server);
        Ok((Some(server), Some(format!("Server {id} created"))))
    }

    async fn wait(&self, action: &Action) -> Result<Action, ModuleError> {
        Ok(self.watcher.wait(self.client, action).await?)
    }

    async fn refresh(&self, id: ResourceId) -> Result<Server, ModuleError> {
        self.client
            .get_server(id)
            .await?
            .ok_or_else(|| InfraError::Vanished(format!("server {id}")).into())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hc_infra::mock::FakeCloud;
    use hc_infra::types::{Image, Iso, RescueType, ServerStatus};

    use super::*;

    fn watcher() -> ActionWatcher {
        ActionWatcher::new(Duration::ZERO)
    }

    #[tokio::test]
    async fn create_is_awaited_and_refreshed() {
        let cloud = FakeCloud::new();
        cloud.set_pending_polls(2);
        let watcher = watcher();
        let spec = ServerSpec {
            name: "web1".into(),
            server_type: "cx11".into(),
            image: Image {
                id: 5,
                name: Some("debian-9".into()),
            },
            datacenter: None,
            location: None,
            user_data: None,
            ssh_keys: vec![],
            start_after_create: false,
        };

        let outcome = Executor::new(&cloud, &watcher)
            .apply(vec![Intent::Create(spec)], None)
            .await
            .unwrap();

        let server = outcome.server.unwrap();
        assert_eq!(server.status, ServerStatus::Off);
        assert!(outcome.changed);
        assert_eq!(outcome.messages, vec![format!("Server {} created", server.id)]);
        assert_eq!(cloud.polled_actions().len(), 2);
    }

    #[tokio::test]
    async fn intents_run_in_order() {
        let cloud = FakeCloud::new();
        let mut server = FakeCloud::sample_server(3, "web3");
        server.status = ServerStatus::Off;
        let iso = Iso {
            id: 7,
            name: Some("rescue.iso".into()),
        };
        server.iso = Some(iso.clone());
        cloud.add_server(server.clone());
        let watcher = watcher();

        let outcome = Executor::new(&cloud, &watcher)
            .apply(
                vec![
                    Intent::DetachIso(iso),
                    Intent::PowerOn,
                    Intent::EnableRescue {
                        rescue: RescueType::Linux64,
                        ssh_keys: vec![],
                    },
                    Intent::Reset,
                ],
                Some(server),
            )
            .await
            .unwrap();

        assert_eq!(
            cloud.mutations(),
            vec!["detach_iso:3", "power_on:3", "enable_rescue:3", "reset:3"]
        );
        let last = outcome.server.unwrap();
        assert!(last.rescue_enabled);
        assert!(last.iso.is_none());
        assert_eq!(
            outcome.messages,
            vec![
                "Server 3 ISO 7 detached",
                "Server 3 started",
                "Server 3 enabled rescue mode",
                "Server 3 reset",
            ]
        );
    }

    #[tokio::test]
    async fn failure_stops_the_plan_and_keeps_changes() {
        let cloud = FakeCloud::new();
        let server = FakeCloud::sample_server(4, "web4");
        cloud.add_server(server.clone());
        cloud.fail_actions("stop_server", "server is locked");
        let watcher = watcher();

        let aborted = Executor::new(&cloud, &watcher)
            .apply(
                vec![Intent::Rename("db1".into()), Intent::PowerOff, Intent::DisableRescue],
                Some(server),
            )
            .await
            .unwrap_err();

        assert!(aborted.changed);
        assert_eq!(aborted.messages, vec!["Server 4 renamed to db1"]);
        assert!(aborted.error.to_string().contains("server is locked"));
        assert_eq!(cloud.mutations(), vec!["rename_server:4", "power_off:4"]);
    }

    #[tokio::test]
    async fn delete_leaves_no_snapshot() {
        let cloud = FakeCloud::new();
        let server = FakeCloud::sample_server(5, "old");
        cloud.add_server(server.clone());
        let watcher = watcher();

        let outcome = Executor::new(&cloud, &watcher)
            .apply(vec![Intent::Delete(DeleteReason::Absent)], Some(server))
            .await
            .unwrap();

        assert!(outcome.server.is_none());
        assert_eq!(outcome.messages, vec!["Server 5 deleted"]);
        assert!(cloud.server(5).is_none());
    }

    #[tokio::test]
    async fn intent_without_snapshot_aborts_untouched() {
        let cloud = FakeCloud::new();
        let watcher = watcher();

        let aborted = Executor::new(&cloud, &watcher)
            .apply(vec![Intent::PowerOn], None)
            .await
            .unwrap_err();

        assert!(!aborted.changed);
        assert!(aborted.messages.is_empty());
        assert!(matches!(
            aborted.error,
            ModuleError::Remote(InfraError::Vanished(_))
        ));
        assert!(cloud.calls().is_empty());
    }
}
