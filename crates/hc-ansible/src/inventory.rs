//! Ansible dynamic inventory built from every server in the project.

use std::collections::{BTreeMap, BTreeSet};

use hc_infra::CloudClient;
use hc_infra::types::Server;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::Result;

/// Inventory JSON for `--list`: `_meta.hostvars` plus one group per
/// datacenter, location, server type, status and image.
pub async fn collect(client: &dyn CloudClient) -> Result<Value> {
    let servers = client.list_servers().await?;
    debug!(servers = servers.len(), "building inventory");
    Ok(build(&servers))
}

pub fn build(servers: &[Server]) -> Value {
    let mut hostvars = serde_json::Map::new();
    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for server in servers {
        hostvars.insert(server.name.clone(), host_vars(server));
        for group in groups_of(server) {
            groups.entry(group).or_default().insert(server.name.clone());
        }
    }

    let mut inventory = serde_json::Map::new();
    inventory.insert("_meta".into(), json!({ "hostvars": hostvars }));
    for (group, hosts) in groups {
        inventory.insert(group, json!({ "hosts": hosts }));
    }
    Value::Object(inventory)
}

fn host_vars(server: &Server) -> Value {
    let ipv4 = server.public_ipv4.clone().unwrap_or_default();
    // The API hands out a /64; hosts are addressed by the network prefix.
    let ipv6 = server
        .public_ipv6
        .as_deref()
        .map(|net| net.split('/').next().unwrap_or(net).to_string())
        .unwrap_or_default();

    json!({
        "hcloud_id": server.id,
        "hcloud_name": server.name,
        "hcloud_public_ipv4": ipv4,
        "hcloud_public_ipv6": ipv6,
        "hcloud_location": server.datacenter.location.name,
        "hcloud_datacenter": server.datacenter.name,
        "hcloud_status": server.status,
        "hcloud_server_type": server.server_type,
        "hcloud_image": server.image.as_ref().map(|image| image.label()).unwrap_or_default(),
        "ansible_host": ipv4,
    })
}

fn groups_of(server: &Server) -> Vec<String> {
    let mut groups = vec![
        server.datacenter.name.clone(),
        server.datacenter.location.name.clone(),
        server.server_type.clone(),
        format!("status_{}", server.status),
    ];
    groups.extend(server.image.as_ref().map(|image| image.label()));
    groups.retain(|group| !group.is_empty());
    groups
}
