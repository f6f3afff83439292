use hc_infra::CloudClient;
use hc_infra::types::Server;

use super::config::DesiredState;
use crate::args::ResourceRef;
use crate::error::{ModuleError, Result};

/// Find the server a target refers to: by id first, then by name.
/// At most two reads; never mutates.
pub async fn locate(client: &dyn CloudClient, target: &ResourceRef) -> Result<Option<Server>> {
    if target.is_empty() {
        return Err(ModuleError::MissingIdentity);
    }
    if let Some(id) = target.id
        && let Some(server) = client.get_server(id).await?
    {
        return Ok(Some(server));
    }
    match &target.name {
        Some(name) => Ok(client.get_server_by_name(name).await?),
        None => Ok(None),
    }
}

/// Like [`locate`], but a miss is an error unless the server is meant to be
/// absent anyway.
pub async fn require(
    client: &dyn CloudClient,
    target: &ResourceRef,
    state: DesiredState,
) -> Result<Option<Server>> {
    let found = locate(client, target).await?;
    if found.is_none() && state != DesiredState::Absent {
        return Err(match (target.id, &target.name) {
            (Some(id), None) => ModuleError::NotFound(format!("Server with id {id} not found")),
            _ => ModuleError::NotFound(format!("Server with name \"{target}\" not found")),
        });
    }
    Ok(found)
}
