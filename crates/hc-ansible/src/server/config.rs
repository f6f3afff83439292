use std::fmt;
use std::str::FromStr;

use hc_infra::CloudClient;
use hc_infra::types::{Datacenter, Image, Iso, Location, RescueType, ResourceId};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::args::{self, ResourceRef};
use crate::error::{ModuleError, Result};

/// Raw module arguments as found in the args file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerArgs {
    pub token: Option<String>,
    pub state: Option<String>,
    pub id: Value,
    pub name: Value,
    pub image: Value,
    pub server_type: Option<String>,
    pub user_data: Option<String>,
    pub datacenter: Value,
    pub location: Value,
    pub rescue: Option<String>,
    pub ssh_keys: Value,
    pub iso: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DesiredState {
    #[default]
    Present,
    Absent,
    Running,
    Stopped,
    Restarted,
    List,
}

impl FromStr for DesiredState {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "restarted" => Ok(Self::Restarted),
            "list" => Ok(Self::List),
            _ => Err(ModuleError::Validation(
                "'state' must be present, absent, running, stopped, list or restarted".into(),
            )),
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Restarted => "restarted",
            Self::List => "list",
        })
    }
}

/// Validated desired configuration, with every catalog reference resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredServer {
    pub state: DesiredState,
    pub targets: Vec<ResourceRef>,
    pub image: Option<Image>,
    pub iso: Option<Iso>,
    pub server_type: Option<String>,
    pub user_data: Option<String>,
    pub datacenter: Option<Datacenter>,
    pub location: Option<Location>,
    pub rescue: Option<RescueType>,
    pub ssh_keys: Vec<ResourceId>,
}

impl DesiredServer {
    pub fn new(state: DesiredState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Whether the creation template needs resolving for this state.
    fn needs_template(&self) -> bool {
        !matches!(self.state, DesiredState::Absent | DesiredState::List)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn scalar_text(field: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.trim().to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(ModuleError::Validation(format!(
            "'{field}' unknown format: {other}"
        ))),
    }
}

/// Validate `args` and resolve every catalog reference.
///
/// All shape checks run before the first remote call; the remote calls made
/// here are reads only.
pub async fn resolve(args: ServerArgs, client: &dyn CloudClient) -> Result<DesiredServer> {
    let state = match non_empty(args.state) {
        Some(raw) => raw.parse()?,
        None => DesiredState::Present,
    };

    let targets = args::targets(args::parse_identities(&args.id, &args.name)?);

    let mut desired = DesiredServer {
        state,
        targets,
        ..DesiredServer::default()
    };
    // Deleting and listing never look at the creation fields.
    if !desired.needs_template() {
        return Ok(desired);
    }

    desired.rescue = non_empty(args.rescue)
        .map(|raw| raw.parse::<RescueType>())
        .transpose()
        .map_err(|_| {
            ModuleError::Validation("'rescue' must be linux64, linux32 or freebsd64".into())
        })?;

    let datacenter = scalar_text("datacenter", &args.datacenter)?;
    let location = scalar_text("location", &args.location)?;
    if datacenter.is_some() && location.is_some() {
        return Err(ModuleError::Validation(
            "'datacenter' and 'location' are mutually exclusive".into(),
        ));
    }

    desired.server_type = non_empty(args.server_type);
    desired.user_data = non_empty(args.user_data);

    desired.image = resolve_image(client, &args.image).await?;
    desired.iso = resolve_iso(client, &args.iso).await?;

    if let Some(name) = datacenter {
        let found = client.get_datacenter(&name).await?;
        desired.datacenter =
            Some(found.ok_or_else(|| {
                ModuleError::NotFound(format!("datacenter '{name}' not found"))
            })?);
    }
    if let Some(name) = location {
        let found = client.get_location(&name).await?;
        desired.location = Some(
            found.ok_or_else(|| ModuleError::NotFound(format!("location '{name}' not found")))?,
        );
    }

    desired.ssh_keys = resolve_ssh_keys(client, &args.ssh_keys).await?;

    debug!(
        state = %desired.state,
        targets = desired.targets.len(),
        "server arguments resolved"
    );
    Ok(desired)
}

async fn resolve_image(client: &dyn CloudClient, value: &Value) -> Result<Option<Image>> {
    if value.is_null() {
        return Ok(None);
    }
    let reference = ResourceRef::from_value(value)
        .ok_or_else(|| ModuleError::Validation(format!("image unknown format: {value}")))?;

    if let Some(id) = reference.id
        && let Some(image) = client.get_image(id).await?
    {
        return Ok(Some(image));
    }
    match &reference.name {
        Some(name) => client
            .get_image_by_name(name)
            .await?
            .map(Some)
            .ok_or_else(|| {
                ModuleError::NotFound(format!("requested image with name {name} not found"))
            }),
        None => Err(ModuleError::NotFound(format!(
            "requested image with id {} not found",
            reference.id.unwrap_or_default()
        ))),
    }
}

async fn resolve_iso(client: &dyn CloudClient, value: &Value) -> Result<Option<Iso>> {
    if value.is_null() {
        return Ok(None);
    }
    let reference = ResourceRef::from_value(value)
        .ok_or_else(|| ModuleError::Validation(format!("iso unknown format: {value}")))?;

    if let Some(id) = reference.id
        && let Some(iso) = client.get_iso(id).await?
    {
        return Ok(Some(iso));
    }
    match &reference.name {
        Some(name) => client
            .get_iso_by_name(name)
            .await?
            .map(Some)
            .ok_or_else(|| {
                ModuleError::NotFound(format!("requested ISO with name {name} not found"))
            }),
        None => Err(ModuleError::NotFound(format!(
            "requested ISO with id {} not found",
            reference.id.unwrap_or_default()
        ))),
    }
}

async fn resolve_ssh_keys(client: &dyn CloudClient, value: &Value) -> Result<Vec<ResourceId>> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };

    let mut ids = Vec::with_capacity(items.len());
    for item in &items {
        let reference = ResourceRef::from_value(item)
            .ok_or_else(|| ModuleError::Validation(format!("ssh key unknown format: {item}")))?;

        let mut found = None;
        if let Some(id) = reference.id {
            found = client.get_ssh_key(id).await?;
        }
        if found.is_none()
            && let Some(name) = &reference.name
        {
            found = client.get_ssh_key_by_name(name).await?;
        }
        match found {
            Some(key) => ids.push(key.id),
            None => {
                return Err(ModuleError::NotFound(format!(
                    "SSH Key \"{reference}\" not found"
                )));
            }
        }
    }
    Ok(ids)
}
