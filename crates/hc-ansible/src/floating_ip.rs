//! `hcloud_floating_ip`: create, assign and delete floating IPs.

use hc_infra::types::{FloatingIp, FloatingIpSpec, FloatingIpType, ResourceId, Server};
use hc_infra::{ActionWatcher, CloudClient, Error as InfraError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::args::{self, ResourceRef};
use crate::error::{ModuleError, Result};
use crate::module::ModuleResponse;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FloatingIpArgs {
    pub token: Option<String>,
    pub state: Option<String>,
    pub id: Value,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub ip_type: Option<String>,
    pub server: Value,
    pub home_location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Present,
    Absent,
    List,
}

/// Module output for one floating IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FloatingIpRecord {
    pub id: ResourceId,
    pub description: String,
    pub ip: String,
    #[serde(rename = "type")]
    pub ip_type: FloatingIpType,
    pub server_id: Option<ResourceId>,
    pub home_location: String,
}

impl From<&FloatingIp> for FloatingIpRecord {
    fn from(ip: &FloatingIp) -> Self {
        Self {
            id: ip.id,
            description: ip.description.clone().unwrap_or_default(),
            ip: ip.ip.clone(),
            ip_type: ip.ip_type,
            server_id: ip.server,
            home_location: ip.home_location.clone(),
        }
    }
}

/// Arguments after validation.
struct Desired {
    state: State,
    id: Option<ResourceId>,
    description: Option<String>,
    ip_type: Option<FloatingIpType>,
    server: Option<ResourceRef>,
    home_location: Option<String>,
}

fn validate(args: FloatingIpArgs) -> Result<Desired> {
    let mut errors = Vec::new();

    let state = match args.state.as_deref().unwrap_or("present") {
        "present" => Some(State::Present),
        "absent" => Some(State::Absent),
        "list" => Some(State::List),
        _ => {
            errors.push("'state' must be present, absent or list".to_string());
            None
        }
    };

    let id = match args::parse_id(&args.id) {
        Ok(id) => id,
        Err(e) => {
            errors.push(e.to_string());
            None
        }
    };

    let ip_type = match args.ip_type.as_deref().filter(|t| !t.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<FloatingIpType>() {
            Ok(t) => Some(t),
            Err(_) => {
                errors.push("'type' must be ipv4 or ipv6".to_string());
                None
            }
        },
    };

    let server = if args.server.is_null() {
        None
    } else {
        match ResourceRef::from_value(&args.server) {
            Some(server) => Some(server),
            None => {
                errors.push(format!("'server' unknown format: {}", args.server));
                None
            }
        }
    };
    let home_location = args.home_location.filter(|l| !l.trim().is_empty());

    if state == Some(State::Present) && args.id.is_null() {
        if home_location.is_none() && args.server.is_null() {
            errors.push("'home_location' or 'server' must be set".to_string());
        }
        if home_location.is_some() && !args.server.is_null() {
            errors.push("'home_location' and 'server' are mutually exclusive".to_string());
        }
    }
    if state == Some(State::Absent) && args.id.is_null() {
        errors.push("'id' is required".to_string());
    }

    ModuleError::validation(errors)?;
    Ok(Desired {
        state: state.unwrap_or(State::Present),
        id,
        description: args.description,
        ip_type,
        server,
        home_location,
    })
}

pub async fn run(
    args: FloatingIpArgs,
    client: &dyn CloudClient,
    watcher: &ActionWatcher,
) -> Result<ModuleResponse> {
    let desired = validate(args)?;
    match desired.state {
        State::List => list(client).await,
        State::Absent => absent(client, &desired).await,
        State::Present => present(client, watcher, &desired).await,
    }
}

async fn list(client: &dyn CloudClient) -> Result<ModuleResponse> {
    let records: Vec<FloatingIpRecord> = client
        .list_floating_ips()
        .await?
        .iter()
        .map(FloatingIpRecord::from)
        .collect();
    ModuleResponse::new()
        .msg("FloatingIPs listed")
        .set("floating_ips", &records)
}

async fn absent(client: &dyn CloudClient, desired: &Desired) -> Result<ModuleResponse> {
    let found = match desired.id {
        Some(id) => client.get_floating_ip(id).await?,
        None => None,
    };
    let Some(ip) = found else {
        return Ok(ModuleResponse::new().msg("No FloatingIP found, nothing to do"));
    };

    client.delete_floating_ip(ip.id).await?;
    info!(floating_ip_id = ip.id, "floating ip deleted");
    Ok(ModuleResponse::new()
        .msg(format!("FloatingIP {} deleted", ip.id))
        .changed())
}

async fn present(
    client: &dyn CloudClient,
    watcher: &ActionWatcher,
    desired: &Desired,
) -> Result<ModuleResponse> {
    let existing = match desired.id {
        Some(id) => client.get_floating_ip(id).await?,
        None => None,
    };
    let server = match &desired.server {
        Some(reference) => Some(find_server(client, reference).await?),
        None => None,
    };

    let mut messages = Vec::new();
    let mut ip = match existing {
        Some(ip) => ip,
        None => {
            let ip_type = desired
                .ip_type
                .ok_or_else(|| ModuleError::Validation("'type' is required".into()))?;
            let created = client
                .create_floating_ip(&FloatingIpSpec {
                    ip_type,
                    description: desired.description.clone().filter(|d| !d.is_empty()),
                    server: server.as_ref().map(|s| s.id),
                    home_location: desired.home_location.clone(),
                })
                .await?;
            if let Some(action) = &created.action {
                watcher.wait(client, action).await?;
            }
            info!(floating_ip_id = created.floating_ip.id, "floating ip created");
            messages.push(format!("FloatingIP {} created", created.floating_ip.id));
            created.floating_ip
        }
    };

    if let Some(description) = &desired.description
        && ip.description.as_deref().unwrap_or_default() != description.as_str()
    {
        ip = client.set_floating_ip_description(ip.id, description).await?;
        messages.push(format!("FloatingIP {} description changed", ip.id));
    }

    match (&server, ip.server) {
        (None, Some(_)) => {
            watcher
                .wait(client, &client.unassign_floating_ip(ip.id).await?)
                .await?;
            messages.push(format!("FloatingIP {} unassigned", ip.id));
            ip = refresh(client, ip.id).await?;
        }
        (Some(server), assigned) if assigned != Some(server.id) => {
            watcher
                .wait(client, &client.assign_floating_ip(ip.id, server.id).await?)
                .await?;
            info!(floating_ip_id = ip.id, server_id = server.id, "floating ip assigned");
            messages.push(format!(
                "FloatingIP {} assigned to server {}",
                ip.id, server.id
            ));
            ip = refresh(client, ip.id).await?;
        }
        _ => {}
    }

    let changed = !messages.is_empty();
    ModuleResponse::new()
        .msg(messages.join(", "))
        .set_changed(changed)
        .set("floating_ips", &[FloatingIpRecord::from(&ip)])
}

/// Resolve the `server` argument: by id, then by name.
async fn find_server(client: &dyn CloudClient, reference: &ResourceRef) -> Result<Server> {
    if let Some(id) = reference.id
        && let Some(server) = client.get_server(id).await?
    {
        return Ok(server);
    }
    if let Some(name) = &reference.name
        && let Some(server) = client.get_server_by_name(name).await?
    {
        return Ok(server);
    }
    Err(ModuleError::NotFound(format!(
        "Server '{reference}' not found"
    )))
}

async fn refresh(client: &dyn CloudClient, id: ResourceId) -> Result<FloatingIp> {
    client
        .get_floating_ip(id)
        .await?
        .ok_or_else(|| InfraError::Vanished(format!("floating ip {id}")).into())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hc_infra::mock::FakeCloud;
    use serde_json::json;

    use super::*;

    fn args(value: Value) -> FloatingIpArgs {
        serde_json::from_value(value).unwrap()
    }

    fn floating_ip(id: ResourceId, server: Option<ResourceId>) -> FloatingIp {
        FloatingIp {
            id,
            description: Some("edge".into()),
            ip: "198.51.100.7".into(),
            ip_type: FloatingIpType::Ipv4,
            server,
            home_location: "fsn1".into(),
        }
    }

    async fn run_with(cloud: &FakeCloud, value: Value) -> Result<ModuleResponse> {
        run(args(value), cloud, &ActionWatcher::new(Duration::ZERO)).await
    }

    #[test]
    fn validation_errors_are_joined() {
        let Err(err) = validate(args(json!({"state": "present", "home_location": "fsn1", "server": "web1"}))) else {
            panic!("expected validation error");
        };
        assert_eq!(
            err.to_string(),
            "'home_location' and 'server' are mutually exclusive"
        );

        let Err(err) = validate(args(json!({"state": "bogus"}))) else {
            panic!("expected validation error");
        };
        assert_eq!(err.to_string(), "'state' must be present, absent or list");

        let Err(err) = validate(args(json!({"state": "present", "type": "ipv5"}))) else {
            panic!("expected validation error");
        };
        assert_eq!(
            err.to_string(),
            "'type' must be ipv4 or ipv6, 'home_location' or 'server' must be set"
        );
    }

    #[test]
    fn absent_requires_id() {
        let Err(err) = validate(args(json!({"state": "absent"}))) else {
            panic!("expected validation error");
        };
        assert_eq!(err.to_string(), "'id' is required");
    }

    #[tokio::test]
    async fn creates_and_assigns_in_one_step() {
        let cloud = FakeCloud::new();
        cloud.add_server(FakeCloud::sample_server(3, "web1"));

        let resp = run_with(
            &cloud,
            json!({"type": "ipv4", "server": "web1", "description": "edge"}),
        )
        .await
        .unwrap();

        assert!(resp.has_changed());
        let record = &resp.data("floating_ips").unwrap()[0];
        assert_eq!(record["server_id"], 3);
        assert_eq!(record["type"], "ipv4");
        assert_eq!(record["home_location"], "fsn1");
        assert_eq!(cloud.mutations(), vec!["create_floating_ip"]);
    }

    #[tokio::test]
    async fn reassigns_to_another_server() {
        let cloud = FakeCloud::new();
        cloud.add_server(FakeCloud::sample_server(3, "web1"));
        cloud.add_server(FakeCloud::sample_server(4, "web2"));
        cloud.add_floating_ip(floating_ip(10, Some(3)));

        let resp = run_with(&cloud, json!({"id": 10, "server": 4, "description": "edge"}))
            .await
            .unwrap();

        assert!(resp.has_changed());
        assert_eq!(resp.message(), "FloatingIP 10 assigned to server 4");
        assert_eq!(cloud.floating_ip(10).unwrap().server, Some(4));
    }

    #[tokio::test]
    async fn unassigns_when_no_server_is_wanted() {
        let cloud = FakeCloud::new();
        cloud.add_floating_ip(floating_ip(10, Some(3)));

        let resp = run_with(&cloud, json!({"id": 10, "description": "front"}))
            .await
            .unwrap();

        assert_eq!(
            resp.message(),
            "FloatingIP 10 description changed, FloatingIP 10 unassigned"
        );
        let ip = cloud.floating_ip(10).unwrap();
        assert_eq!(ip.server, None);
        assert_eq!(ip.description.as_deref(), Some("front"));
    }

    #[tokio::test]
    async fn converged_ip_is_unchanged() {
        let cloud = FakeCloud::new();
        cloud.add_server(FakeCloud::sample_server(3, "web1"));
        cloud.add_floating_ip(floating_ip(10, Some(3)));

        let resp = run_with(&cloud, json!({"id": 10, "server": {"name": "web1"}}))
            .await
            .unwrap();

        assert!(!resp.has_changed());
        assert!(cloud.mutations().is_empty());
    }

    #[tokio::test]
    async fn unknown_server() {
        let cloud = FakeCloud::new();
        let err = run_with(&cloud, json!({"type": "ipv4", "server": "ghost"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Server 'ghost' not found");
    }

    #[tokio::test]
    async fn absent_and_list() {
        let cloud = FakeCloud::new();
        cloud.add_floating_ip(floating_ip(10, None));
        cloud.add_floating_ip(floating_ip(11, None));

        let resp = run_with(&cloud, json!({"state": "absent", "id": 12}))
            .await
            .unwrap();
        assert_eq!(resp.message(), "No FloatingIP found, nothing to do");
        assert!(!resp.has_changed());

        let resp = run_with(&cloud, json!({"state": "absent", "id": 10}))
            .await
            .unwrap();
        assert_eq!(resp.message(), "FloatingIP 10 deleted");
        assert!(resp.has_changed());

        let resp = run_with(&cloud, json!({"state": "list"})).await.unwrap();
        assert_eq!(resp.message(), "FloatingIPs listed");
        assert_eq!(resp.data("floating_ips").unwrap().as_array().unwrap().len(), 1);
    }
}
