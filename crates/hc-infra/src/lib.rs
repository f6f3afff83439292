pub mod hetzner;
pub mod types;
pub mod watch;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use async_trait::async_trait;

use types::{
    Action, Datacenter, FloatingIp, FloatingIpCreated, FloatingIpSpec, Image, Iso, Location,
    RescueType, ResourceId, Server, ServerCreated, ServerSpec, SshKey,
};

pub use hetzner::HetznerCloud;
pub use watch::ActionWatcher;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("hetzner api error: {0}")]
    HetznerApi(String),

    #[error("action {id} ({command}) failed: {message}")]
    ActionFailed {
        id: ResourceId,
        command: String,
        message: String,
    },

    #[error("action {id} ({command}) did not finish within {secs}s")]
    ActionTimeout {
        id: ResourceId,
        command: String,
        secs: u64,
    },

    #[error("{0} disappeared while being reconciled")]
    Vanished(String),

    #[error("argument `token` or environment variable `HCLOUD_TOKEN` is required")]
    MissingToken,

    #[error("invalid {0}")]
    InvalidValue(String),
}

impl From<hcloud_api::Error> for Error {
    fn from(e: hcloud_api::Error) -> Self {
        match &e {
            hcloud_api::Error::Api {
                endpoint, status, ..
            } => Error::HetznerApi(format!(
                "{endpoint}: {} ({status})",
                e.api_message().unwrap_or_default()
            )),
            hcloud_api::Error::Request(_) => Error::HetznerApi(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Everything the provisioning modules need from the cloud.
///
/// Lookups return `Ok(None)` for a missing resource; only transport and API
/// failures are errors. Mutators that start asynchronous work return the
/// [`Action`] handle, which callers await through an [`ActionWatcher`].
#[async_trait]
pub trait CloudClient: Send + Sync + 'static {
    // ── Servers ──────────────────────────────────────────────────────

    async fn get_server(&self, id: ResourceId) -> Result<Option<Server>>;

    async fn get_server_by_name(&self, name: &str) -> Result<Option<Server>>;

    async fn list_servers(&self) -> Result<Vec<Server>>;

    async fn create_server(&self, spec: &ServerSpec) -> Result<ServerCreated>;

    async fn delete_server(&self, id: ResourceId) -> Result<()>;

    async fn rename_server(&self, id: ResourceId, name: &str) -> Result<Server>;

    async fn power_on(&self, id: ResourceId) -> Result<Action>;

    async fn power_off(&self, id: ResourceId) -> Result<Action>;

    async fn reboot(&self, id: ResourceId) -> Result<Action>;

    async fn reset(&self, id: ResourceId) -> Result<Action>;

    async fn attach_iso(&self, id: ResourceId, iso: &Iso) -> Result<Action>;

    async fn detach_iso(&self, id: ResourceId) -> Result<Action>;

    async fn enable_rescue(
        &self,
        id: ResourceId,
        rescue: RescueType,
        ssh_keys: &[ResourceId],
    ) -> Result<Action>;

    async fn disable_rescue(&self, id: ResourceId) -> Result<Action>;

    // ── Catalog ──────────────────────────────────────────────────────

    async fn get_image(&self, id: ResourceId) -> Result<Option<Image>>;

    async fn get_image_by_name(&self, name: &str) -> Result<Option<Image>>;

    async fn get_iso(&self, id: ResourceId) -> Result<Option<Iso>>;

    async fn get_iso_by_name(&self, name: &str) -> Result<Option<Iso>>;

    /// Look up a datacenter by numeric id or by name.
    async fn get_datacenter(&self, id_or_name: &str) -> Result<Option<Datacenter>>;

    /// Look up a location by numeric id or by name.
    async fn get_location(&self, id_or_name: &str) -> Result<Option<Location>>;

    // ── SSH keys ─────────────────────────────────────────────────────

    async fn get_ssh_key(&self, id: ResourceId) -> Result<Option<SshKey>>;

    async fn get_ssh_key_by_name(&self, name: &str) -> Result<Option<SshKey>>;

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>>;

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey>;

    async fn rename_ssh_key(&self, id: ResourceId, name: &str) -> Result<SshKey>;

    async fn delete_ssh_key(&self, id: ResourceId) -> Result<()>;

    // ── Floating IPs ─────────────────────────────────────────────────

    async fn get_floating_ip(&self, id: ResourceId) -> Result<Option<FloatingIp>>;

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>>;

    async fn create_floating_ip(&self, spec: &FloatingIpSpec) -> Result<FloatingIpCreated>;

    async fn set_floating_ip_description(
        &self,
        id: ResourceId,
        description: &str,
    ) -> Result<FloatingIp>;

    async fn assign_floating_ip(&self, id: ResourceId, server: ResourceId) -> Result<Action>;

    async fn unassign_floating_ip(&self, id: ResourceId) -> Result<Action>;

    async fn delete_floating_ip(&self, id: ResourceId) -> Result<()>;

    // ── Actions ──────────────────────────────────────────────────────

    async fn get_action(&self, id: ResourceId) -> Result<Action>;
}
