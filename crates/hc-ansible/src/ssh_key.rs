//! `hcloud_ssh_key`: upload, replace and delete SSH keys.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hc_infra::CloudClient;
use hc_infra::types::{ResourceId, SshKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::args;
use crate::error::{ModuleError, Result};
use crate::module::ModuleResponse;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SshKeyArgs {
    pub token: Option<String>,
    pub state: Option<String>,
    pub id: Value,
    pub name: Option<String>,
    pub public_key: Option<String>,
}

/// Module output for one SSH key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshKeyRecord {
    pub id: ResourceId,
    pub name: String,
    pub fingerprint: String,
}

impl From<&SshKey> for SshKeyRecord {
    fn from(key: &SshKey) -> Self {
        Self {
            id: key.id,
            name: key.name.clone(),
            fingerprint: key.fingerprint.clone(),
        }
    }
}

/// Legacy MD5 fingerprint of an OpenSSH public key line, as the API reports
/// it: colon separated hex of the MD5 over the decoded key blob.
///
/// Accepts `authorized_keys` lines, including leading options and a
/// trailing comment.
pub fn fingerprint(public_key: &str) -> Option<String> {
    let fields: Vec<&str> = public_key.split_whitespace().collect();
    fields.windows(2).find_map(|pair| {
        let blob = BASE64.decode(pair[1]).ok()?;
        (key_type(&blob)? == pair[0]).then(|| {
            md5::compute(&blob)
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(":")
        })
    })
}

/// The algorithm name a key blob starts with.
fn key_type(blob: &[u8]) -> Option<&str> {
    let len_bytes: [u8; 4] = blob.get(..4)?.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    std::str::from_utf8(blob.get(4..4 + len)?).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Present,
    Absent,
    List,
}

struct Desired {
    state: State,
    id: Option<ResourceId>,
    name: Option<String>,
    public_key: Option<String>,
}

fn validate(args: SshKeyArgs) -> Result<Desired> {
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
    let name = args.name.filter(|n| !n.trim().is_empty());
    let public_key = args.public_key.filter(|k| !k.trim().is_empty());

    match state {
        Some(State::Present) => {
            if id.is_some() {
                errors.push("'id' has no effect".to_string());
            }
            if name.is_none() {
                errors.push("'name' is required".to_string());
            }
            match &public_key {
                None => errors.push("'public_key' is required".to_string()),
                Some(key) if fingerprint(key).is_none() => {
                    errors.push("'public_key' is not a valid OpenSSH public key".to_string())
                }
                Some(_) => {}
            }
        }
        Some(State::Absent) if id.is_none() && name.is_none() => {
            errors.push("'name' or 'id' is required".to_string());
        }
        _ => {}
    }

    ModuleError::validation(errors)?;
    Ok(Desired {
        state: state.unwrap_or(State::Present),
        id,
        name,
        public_key,
    })
}

pub async fn run(args: SshKeyArgs, client: &dyn CloudClient) -> Result<ModuleResponse> {
    let desired = validate(args)?;
    match desired.state {
        State::List => list(client).await,
        State::Absent => absent(client, &desired).await,
        State::Present => present(client, &desired).await,
    }
}

async fn find(client: &dyn CloudClient, desired: &Desired) -> Result<Option<SshKey>> {
    if let Some(id) = desired.id {
        return Ok(client.get_ssh_key(id).await?);
    }
    match &desired.name {
        Some(name) => Ok(client.get_ssh_key_by_name(name).await?),
        None => Ok(None),
    }
}

async fn list(client: &dyn CloudClient) -> Result<ModuleResponse> {
    let records: Vec<SshKeyRecord> = client
        .list_ssh_keys()
        .await?
        .iter()
        .map(SshKeyRecord::from)
        .collect();
    ModuleResponse::new()
        .msg("SSHKeys listed")
        .set("ssh_keys", &records)
}

async fn absent(client: &dyn CloudClient, desired: &Desired) -> Result<ModuleResponse> {
    let Some(key) = find(client, desired).await? else {
        return Ok(ModuleResponse::new().msg("No SSHKey found, nothing to do"));
    };
    client.delete_ssh_key(key.id).await?;
    info!(ssh_key_id = key.id, "ssh key deleted");
    Ok(ModuleResponse::new()
        .msg(format!("SSHKey {} deleted", key.id))
        .changed())
}

async fn present(client: &dyn CloudClient, desired: &Desired) -> Result<ModuleResponse> {
    let (Some(name), Some(public_key)) = (&desired.name, &desired.public_key) else {
        return Err(ModuleError::Validation(
            "'name' and 'public_key' are required".into(),
        ));
    };
    let wanted = fingerprint(public_key).ok_or_else(|| {
        ModuleError::Validation("'public_key' is not a valid OpenSSH public key".into())
    })?;

    let mut messages = Vec::new();
    let mut changed = false;
    let mut current = find(client, desired).await?;

    if let Some(key) = &current {
        if key.fingerprint != wanted {
            client.delete_ssh_key(key.id).await?;
            info!(ssh_key_id = key.id, "ssh key deleted, fingerprint changed");
            messages.push(format!("SSHKey {} deleted (changed fingerprint)", key.id));
            changed = true;
            current = None;
        } else {
            messages.push(format!("SSHKey {} exists with matching fingerprint", key.id));
        }
    }

    let key = match current {
        Some(key) if &key.name != name => {
            changed = true;
            client.rename_ssh_key(key.id, name).await?
        }
        Some(key) => key,
        None => {
            let key = client.create_ssh_key(name, public_key).await?;
            info!(ssh_key_id = key.id, name = %key.name, "ssh key created");
            messages.push(format!("SSHKey {} created", key.id));
            changed = true;
            key
        }
    };

    ModuleResponse::new()
        .msg(messages.join(", "))
        .set_changed(changed)
        .set("ssh_keys", &[SshKeyRecord::from(&key)])
}

#[cfg(test)]
mod tests {
    use hc_infra::mock::FakeCloud;
    use serde_json::json;

    use super::*;

    const ED25519: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIGXvRSvhJvQJbZRxZ9b4gsJ4nQvqGvdR2fv4T6bWjVKQ deploy@ci";

    fn args(value: Value) -> SshKeyArgs {
        serde_json::from_value(value).unwrap()
    }

    fn stored(id: ResourceId, name: &str, fingerprint: &str) -> SshKey {
        SshKey {
            id,
            name: name.into(),
            fingerprint: fingerprint.into(),
            public_key: ED25519.into(),
        }
    }

    #[test]
    fn fingerprint_is_colon_separated_md5() {
        let fp = fingerprint(ED25519).unwrap();
        assert_eq!(fp.len(), 16 * 3 - 1);
        assert_eq!(fp.split(':').count(), 16);
        assert!(fp.split(':').all(|octet| octet.len() == 2));
    }

    #[test]
    fn fingerprint_ignores_options_and_comment() {
        let with_options = format!("no-pty,command=\"/bin/true\" {ED25519}");
        assert_eq!(fingerprint(&with_options), fingerprint(ED25519));
    }

    #[test]
    fn garbage_has_no_fingerprint() {
        assert_eq!(fingerprint("ssh-ed25519 not-base64!"), None);
        assert_eq!(fingerprint("ssh-rsa AAAAC3NzaC1lZDI1NTE5AAAAIGXvRSvhJvQJbZRxZ9b4gsJ4nQvqGvdR2fv4T6bWjVKQ"), None);
        assert_eq!(fingerprint(""), None);
    }

    #[test]
    fn present_validation() {
        let Err(err) = validate(args(json!({"id": 3}))) else {
            panic!("expected validation error");
        };
        assert_eq!(
            err.to_string(),
            "'id' has no effect, 'name' is required, 'public_key' is required"
        );

        let Err(err) = validate(args(json!({"name": "deploy", "public_key": "nope"}))) else {
            panic!("expected validation error");
        };
        assert_eq!(err.to_string(), "'public_key' is not a valid OpenSSH public key");
    }

    #[test]
    fn absent_needs_an_identity() {
        let Err(err) = validate(args(json!({"state": "absent"}))) else {
            panic!("expected validation error");
        };
        assert_eq!(err.to_string(), "'name' or 'id' is required");
    }

    #[tokio::test]
    async fn creates_missing_key() {
        let cloud = FakeCloud::new();
        let resp = run(args(json!({"name": "deploy", "public_key": ED25519})), &cloud)
            .await
            .unwrap();

        assert!(resp.has_changed());
        assert_eq!(cloud.ssh_keys().len(), 1);
        assert_eq!(resp.data("ssh_keys").unwrap()[0]["name"], "deploy");
    }

    #[tokio::test]
    async fn matching_fingerprint_is_kept() {
        let cloud = FakeCloud::new();
        cloud.add_ssh_key(stored(4, "deploy", &fingerprint(ED25519).unwrap()));

        let resp = run(args(json!({"name": "deploy", "public_key": ED25519})), &cloud)
            .await
            .unwrap();

        assert!(!resp.has_changed());
        assert_eq!(resp.message(), "SSHKey 4 exists with matching fingerprint");
        assert!(cloud.mutations().is_empty());
    }

    #[tokio::test]
    async fn changed_fingerprint_replaces_the_key() {
        let cloud = FakeCloud::new();
        cloud.add_ssh_key(stored(4, "deploy", "00:11:22"));

        let resp = run(args(json!({"name": "deploy", "public_key": ED25519})), &cloud)
            .await
            .unwrap();

        assert!(resp.has_changed());
        assert!(resp.message().starts_with("SSHKey 4 deleted (changed fingerprint), SSHKey "));
        assert_eq!(
            cloud.mutations(),
            vec!["delete_ssh_key:4", "create_ssh_key:deploy"]
        );
    }

    #[tokio::test]
    async fn absent_and_list() {
        let cloud = FakeCloud::new();
        cloud.add_ssh_key(stored(4, "deploy", "00"));
        cloud.add_ssh_key(stored(5, "ops", "01"));

        let resp = run(args(json!({"state": "absent", "name": "ghost"})), &cloud)
            .await
            .unwrap();
        assert_eq!(resp.message(), "No SSHKey found, nothing to do");

        let resp = run(args(json!({"state": "absent", "id": 4})), &cloud)
            .await
            .unwrap();
        assert_eq!(resp.message(), "SSHKey 4 deleted");
        assert!(resp.has_changed());

        let resp = run(args(json!({"state": "list"})), &cloud).await.unwrap();
        assert_eq!(resp.message(), "SSHKeys listed");
        let keys = resp.data("ssh_keys").unwrap().as_array().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0]["fingerprint"], "01");
    }
}
