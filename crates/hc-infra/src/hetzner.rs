use async_trait::async_trait;
use hcloud_api::HcloudClient;
use tracing::{debug, info};

use crate::types::{
    Action, ActionStatus, Datacenter, FloatingIp, FloatingIpCreated, FloatingIpSpec,
    FloatingIpType, Image, Iso, Location, RescueType, ResourceId, Server, ServerCreated,
    ServerSpec, ServerStatus, SshKey,
};
use crate::{CloudClient, Error, Result};

/// Hetzner Cloud client backed by the `hcloud-api` REST crate.
pub struct HetznerCloud {
    client: HcloudClient,
}

impl HetznerCloud {
    pub fn new(client: HcloudClient) -> Self {
        Self { client }
    }

    /// Build from the module `token` argument, falling back to env vars:
    ///
    /// - `HCLOUD_TOKEN` (required when no token argument is given)
    /// - `HCLOUD_ENDPOINT` (optional API base URL override)
    pub fn from_env(token: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let token = match token.filter(|t| !t.is_empty()) {
            Some(t) => t.to_string(),
            None => std::env::var("HCLOUD_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
                .ok_or(Error::MissingToken)?,
        };

        let client = match std::env::var("HCLOUD_ENDPOINT") {
            Ok(endpoint) if !endpoint.is_empty() => {
                debug!(endpoint = %endpoint, "hetzner: using custom endpoint");
                HcloudClient::with_endpoint(token, endpoint)
            }
            _ => HcloudClient::new(token),
        };

        Ok(Self::new(client))
    }

    fn to_server(s: hcloud_api::Server) -> Server {
        Server {
            id: s.id,
            name: s.name,
            status: ServerStatus::parse(&s.status),
            image: s.image.map(Self::to_image),
            server_type: s.server_type.name,
            datacenter: Self::to_datacenter(s.datacenter),
            iso: s.iso.map(Self::to_iso),
            rescue_enabled: s.rescue_enabled,
            public_ipv4: s.public_net.ipv4.map(|v4| v4.ip),
            public_ipv6: s.public_net.ipv6.map(|v6| v6.ip),
        }
    }

    fn to_image(i: hcloud_api::Image) -> Image {
        Image {
            id: i.id,
            name: i.name,
        }
    }

    fn to_iso(i: hcloud_api::Iso) -> Iso {
        Iso {
            id: i.id,
            name: i.name,
        }
    }

    fn to_location(l: hcloud_api::Location) -> Location {
        Location {
            id: l.id,
            name: l.name,
        }
    }

    fn to_datacenter(d: hcloud_api::Datacenter) -> Datacenter {
        Datacenter {
            id: d.id,
            name: d.name,
            location: Self::to_location(d.location),
        }
    }

    fn to_action(a: hcloud_api::Action) -> Action {
        Action {
            id: a.id,
            command: a.command,
            status: match a.status {
                hcloud_api::ActionStatus::Running => ActionStatus::Running,
                hcloud_api::ActionStatus::Success => ActionStatus::Success,
                hcloud_api::ActionStatus::Error => ActionStatus::Error,
            },
            progress: a.progress,
            error: a.error.map(|e| format!("{} ({})", e.message, e.code)),
        }
    }

    fn to_ssh_key(k: hcloud_api::SshKey) -> SshKey {
        SshKey {
            id: k.id,
            name: k.name,
            fingerprint: k.fingerprint,
            public_key: k.public_key,
        }
    }

    fn to_floating_ip(f: hcloud_api::FloatingIp) -> Result<FloatingIp> {
        Ok(FloatingIp {
            id: f.id,
            description: f.description,
            ip: f.ip,
            ip_type: f.ip_type.parse::<FloatingIpType>()?,
            server: f.server,
            home_location: f.home_location.name,
        })
    }
}

#[async_trait]
impl CloudClient for HetznerCloud {
    async fn get_server(&self, id: ResourceId) -> Result<Option<Server>> {
        Ok(self.client.get_server(id).await?.map(Self::to_server))
    }

    async fn get_server_by_name(&self, name: &str) -> Result<Option<Server>> {
        Ok(self
            .client
            .get_server_by_name(name)
            .await?
            .map(Self::to_server))
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        let servers = self.client.list_servers().await?;
        Ok(servers.into_iter().map(Self::to_server).collect())
    }

    async fn create_server(&self, spec: &ServerSpec) -> Result<ServerCreated> {
        let resp = self
            .client
            .create_server(&hcloud_api::CreateServerRequest {
                name: spec.name.clone(),
                server_type: spec.server_type.clone(),
                image: spec.image.id.to_string(),
                location: spec.location.clone(),
                datacenter: spec.datacenter.clone(),
                user_data: spec.user_data.clone(),
                ssh_keys: spec.ssh_keys.clone(),
                start_after_create: spec.start_after_create,
            })
            .await?;

        info!(server_id = resp.server.id, name = %spec.name, "hetzner: server created");

        Ok(ServerCreated {
            server: Self::to_server(resp.server),
            action: Self::to_action(resp.action),
        })
    }

    async fn delete_server(&self, id: ResourceId) -> Result<()> {
        self.client.delete_server(id).await?;
        info!(server_id = id, "hetzner: server deleted");
        Ok(())
    }

    async fn rename_server(&self, id: ResourceId, name: &str) -> Result<Server> {
        let server = self
            .client
            .update_server(
                id,
                &hcloud_api::UpdateServerRequest {
                    name: name.to_string(),
                },
            )
            .await?;
        info!(server_id = id, name, "hetzner: server renamed");
        Ok(Self::to_server(server))
    }

    async fn power_on(&self, id: ResourceId) -> Result<Action> {
        Ok(Self::to_action(self.client.power_on_server(id).await?))
    }

    async fn power_off(&self, id: ResourceId) -> Result<Action> {
        Ok(Self::to_action(self.client.power_off_server(id).await?))
    }

    async fn reboot(&self, id: ResourceId) -> Result<Action> {
        Ok(Self::to_action(self.client.reboot_server(id).await?))
    }

    async fn reset(&self, id: ResourceId) -> Result<Action> {
        Ok(Self::to_action(self.client.reset_server(id).await?))
    }

    async fn attach_iso(&self, id: ResourceId, iso: &Iso) -> Result<Action> {
        let action = self
            .client
            .attach_iso(
                id,
                &hcloud_api::AttachIsoRequest {
                    iso: iso.id.to_string(),
                },
            )
            .await?;
        Ok(Self::to_action(action))
    }

    async fn detach_iso(&self, id: ResourceId) -> Result<Action> {
        Ok(Self::to_action(self.client.detach_iso(id).await?))
    }

    async fn enable_rescue(
        &self,
        id: ResourceId,
        rescue: RescueType,
        ssh_keys: &[ResourceId],
    ) -> Result<Action> {
        let resp = self
            .client
            .enable_rescue(
                id,
                &hcloud_api::EnableRescueRequest {
                    rescue_type: rescue.as_str().to_string(),
                    ssh_keys: ssh_keys.to_vec(),
                },
            )
            .await?;
        Ok(Self::to_action(resp.action))
    }

    async fn disable_rescue(&self, id: ResourceId) -> Result<Action> {
        Ok(Self::to_action(self.client.disable_rescue(id).await?))
    }

    async fn get_image(&self, id: ResourceId) -> Result<Option<Image>> {
        Ok(self.client.get_image(id).await?.map(Self::to_image))
    }

    async fn get_image_by_name(&self, name: &str) -> Result<Option<Image>> {
        Ok(self.client.get_image_by_name(name).await?.map(Self::to_image))
    }

    async fn get_iso(&self, id: ResourceId) -> Result<Option<Iso>> {
        Ok(self.client.get_iso(id).await?.map(Self::to_iso))
    }

    async fn get_iso_by_name(&self, name: &str) -> Result<Option<Iso>> {
        Ok(self.client.get_iso_by_name(name).await?.map(Self::to_iso))
    }

    async fn get_datacenter(&self, id_or_name: &str) -> Result<Option<Datacenter>> {
        let found = match id_or_name.parse::<ResourceId>() {
            Ok(id) => self.client.get_datacenter(id).await?,
            Err(_) => self.client.get_datacenter_by_name(id_or_name).await?,
        };
        Ok(found.map(Self::to_datacenter))
    }

    async fn get_location(&self, id_or_name: &str) -> Result<Option<Location>> {
        let found = match id_or_name.parse::<ResourceId>() {
            Ok(id) => self.client.get_location(id).await?,
            Err(_) => self.client.get_location_by_name(id_or_name).await?,
        };
        Ok(found.map(Self::to_location))
    }

    async fn get_ssh_key(&self, id: ResourceId) -> Result<Option<SshKey>> {
        Ok(self.client.get_ssh_key(id).await?.map(Self::to_ssh_key))
    }

    async fn get_ssh_key_by_name(&self, name: &str) -> Result<Option<SshKey>> {
        Ok(self
            .client
            .get_ssh_key_by_name(name)
            .await?
            .map(Self::to_ssh_key))
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        let keys = self.client.list_ssh_keys().await?;
        Ok(keys.into_iter().map(Self::to_ssh_key).collect())
    }

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey> {
        let key = self
            .client
            .create_ssh_key(&hcloud_api::CreateSshKeyRequest {
                name: name.to_string(),
                public_key: public_key.to_string(),
            })
            .await?;
        info!(ssh_key_id = key.id, name, "hetzner: ssh key created");
        Ok(Self::to_ssh_key(key))
    }

    async fn rename_ssh_key(&self, id: ResourceId, name: &str) -> Result<SshKey> {
        let key = self
            .client
            .update_ssh_key(
                id,
                &hcloud_api::UpdateSshKeyRequest {
                    name: name.to_string(),
                },
            )
            .await?;
        Ok(Self::to_ssh_key(key))
    }

    async fn delete_ssh_key(&self, id: ResourceId) -> Result<()> {
        self.client.delete_ssh_key(id).await?;
        info!(ssh_key_id = id, "hetzner: ssh key deleted");
        Ok(())
    }

    async fn get_floating_ip(&self, id: ResourceId) -> Result<Option<FloatingIp>> {
        self.client
            .get_floating_ip(id)
            .await?
            .map(Self::to_floating_ip)
            .transpose()
    }

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>> {
        self.client
            .list_floating_ips()
            .await?
            .into_iter()
            .map(Self::to_floating_ip)
            .collect()
    }

    async fn create_floating_ip(&self, spec: &FloatingIpSpec) -> Result<FloatingIpCreated> {
        let resp = self
            .client
            .create_floating_ip(&hcloud_api::CreateFloatingIpRequest {
                ip_type: spec.ip_type.as_str().to_string(),
                server: spec.server,
                home_location: spec.home_location.clone(),
                description: spec.description.clone(),
            })
            .await?;

        info!(floating_ip_id = resp.floating_ip.id, "hetzner: floating ip created");

        Ok(FloatingIpCreated {
            floating_ip: Self::to_floating_ip(resp.floating_ip)?,
            action: resp.action.map(Self::to_action),
        })
    }

    async fn set_floating_ip_description(
        &self,
        id: ResourceId,
        description: &str,
    ) -> Result<FloatingIp> {
        let ip = self
            .client
            .update_floating_ip(
                id,
                &hcloud_api::UpdateFloatingIpRequest {
                    description: description.to_string(),
                },
            )
            .await?;
        Self::to_floating_ip(ip)
    }

    async fn assign_floating_ip(&self, id: ResourceId, server: ResourceId) -> Result<Action> {
        let action = self
            .client
            .assign_floating_ip(id, &hcloud_api::AssignFloatingIpRequest { server })
            .await?;
        Ok(Self::to_action(action))
    }

    async fn unassign_floating_ip(&self, id: ResourceId) -> Result<Action> {
        Ok(Self::to_action(self.client.unassign_floating_ip(id).await?))
    }

    async fn delete_floating_ip(&self, id: ResourceId) -> Result<()> {
        self.client.delete_floating_ip(id).await?;
        info!(floating_ip_id = id, "hetzner: floating ip deleted");
        Ok(())
    }

    async fn get_action(&self, id: ResourceId) -> Result<Action> {
        Ok(Self::to_action(self.client.get_action(id).await?))
    }
}
