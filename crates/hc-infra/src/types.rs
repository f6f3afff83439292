use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::Error;

/// Provider-side numeric resource identifier.
pub type ResourceId = i64;

// ── Catalog ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub id: ResourceId,
    pub name: Option<String>,
}

impl Image {
    /// Image name, or `image_<id>` for snapshots and backups without one.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("image_{}", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iso {
    pub id: ResourceId,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub id: ResourceId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datacenter {
    pub id: ResourceId,
    pub name: String,
    pub location: Location,
}

// ── Servers ──────────────────────────────────────────────────────────

/// Provider-reported server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Initializing,
    Starting,
    Running,
    Stopping,
    Off,
    Deleting,
    Migrating,
    Rebuilding,
    Unknown,
}

impl ServerStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "initializing" => Self::Initializing,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "off" => Self::Off,
            "deleting" => Self::Deleting,
            "migrating" => Self::Migrating,
            "rebuilding" => Self::Rebuilding,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Off => "off",
            Self::Deleting => "deleting",
            Self::Migrating => "migrating",
            Self::Rebuilding => "rebuilding",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time read of a server. Superseded by a fresh read after every
/// mutating call, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub id: ResourceId,
    pub name: String,
    pub status: ServerStatus,
    pub image: Option<Image>,
    pub server_type: String,
    pub datacenter: Datacenter,
    pub iso: Option<Iso>,
    pub rescue_enabled: bool,
    pub public_ipv4: Option<String>,
    /// Assigned IPv6 network in CIDR notation.
    pub public_ipv6: Option<String>,
}

/// Rescue system flavours accepted by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescueType {
    Linux64,
    Linux32,
    Freebsd64,
}

impl RescueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux64 => "linux64",
            Self::Linux32 => "linux32",
            Self::Freebsd64 => "freebsd64",
        }
    }
}

impl fmt::Display for RescueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RescueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "linux64" => Ok(Self::Linux64),
            "linux32" => Ok(Self::Linux32),
            "freebsd64" => Ok(Self::Freebsd64),
            other => Err(Error::InvalidValue(format!(
                "rescue type '{other}' (expected linux64, linux32 or freebsd64)"
            ))),
        }
    }
}

/// Specification for creating a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub name: String,
    pub server_type: String,
    pub image: Image,
    pub datacenter: Option<String>,
    pub location: Option<String>,
    pub user_data: Option<String>,
    pub ssh_keys: Vec<ResourceId>,
    pub start_after_create: bool,
}

#[derive(Debug, Clone)]
pub struct ServerCreated {
    pub server: Server,
    pub action: Action,
}

// ── Actions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

/// Handle of an asynchronous operation started by a mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: ResourceId,
    pub command: String,
    pub status: ActionStatus,
    pub progress: i32,
    pub error: Option<String>,
}

impl Action {
    pub fn is_terminal(&self) -> bool {
        self.status != ActionStatus::Running
    }
}

// ── SSH keys ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKey {
    pub id: ResourceId,
    pub name: String,
    pub fingerprint: String,
    pub public_key: String,
}

// ── Floating IPs ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatingIpType {
    Ipv4,
    Ipv6,
}

impl FloatingIpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        }
    }
}

impl fmt::Display for FloatingIpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FloatingIpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            other => Err(Error::InvalidValue(format!(
                "floating ip type '{other}' (expected ipv4 or ipv6)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingIp {
    pub id: ResourceId,
    pub description: Option<String>,
    pub ip: String,
    pub ip_type: FloatingIpType,
    pub server: Option<ResourceId>,
    pub home_location: String,
}

/// Specification for creating a floating IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingIpSpec {
    pub ip_type: FloatingIpType,
    pub description: Option<String>,
    pub server: Option<ResourceId>,
    pub home_location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FloatingIpCreated {
    pub floating_ip: FloatingIp,
    pub action: Option<Action>,
}
