//! In-memory [`CloudClient`] for tests.
//!
//! Mutations take effect immediately; the returned actions are `Running`
//! for a configurable number of polls and then finish. Every call is
//! recorded as `"<method>:<arg>"` so tests can assert on ordering, and any
//! call key can be made to fail.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::types::{
    Action, ActionStatus, Datacenter, FloatingIp, FloatingIpCreated, FloatingIpSpec, Image, Iso,
    Location, RescueType, ResourceId, Server, ServerCreated, ServerSpec, ServerStatus, SshKey,
};
use crate::{CloudClient, Error, Result};

struct PendingAction {
    action: Action,
    remaining_polls: u32,
    final_status: ActionStatus,
    error: Option<String>,
}

#[derive(Default)]
struct State {
    next_id: ResourceId,
    servers: BTreeMap<ResourceId, Server>,
    images: Vec<Image>,
    isos: Vec<Iso>,
    datacenters: Vec<Datacenter>,
    ssh_keys: BTreeMap<ResourceId, SshKey>,
    floating_ips: BTreeMap<ResourceId, FloatingIp>,
    actions: HashMap<ResourceId, PendingAction>,
    pending_polls: u32,
    failing_calls: HashMap<String, String>,
    failing_actions: HashMap<String, String>,
    calls: Vec<String>,
    polls: Vec<ResourceId>,
}

impl State {
    fn next_id(&mut self) -> ResourceId {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, call: String) -> Result<()> {
        let failure = self.failing_calls.get(&call).cloned();
        self.calls.push(call);
        match failure {
            Some(message) => Err(Error::HetznerApi(message)),
            None => Ok(()),
        }
    }

    fn start_action(&mut self, command: &str) -> Action {
        let id = self.next_id();
        let (final_status, error) = match self.failing_actions.get(command) {
            Some(message) => (ActionStatus::Error, Some(message.clone())),
            None => (ActionStatus::Success, None),
        };
        let finished = self.pending_polls == 0;
        let action = Action {
            id,
            command: command.to_string(),
            status: if finished {
                final_status
            } else {
                ActionStatus::Running
            },
            progress: if finished { 100 } else { 0 },
            error: if finished { error.clone() } else { None },
        };
        self.actions.insert(
            id,
            PendingAction {
                action: action.clone(),
                remaining_polls: self.pending_polls,
                final_status,
                error,
            },
        );
        action
    }

    fn server_mut(&mut self, id: ResourceId) -> Result<&mut Server> {
        self.servers
            .get_mut(&id)
            .ok_or_else(|| Error::HetznerApi(format!("server {id} not found (404)")))
    }

    fn datacenter_for(&self, spec: &ServerSpec) -> Datacenter {
        let by_name = spec
            .datacenter
            .as_deref()
            .and_then(|name| self.datacenters.iter().find(|d| d.name == name));
        let by_location = spec
            .location
            .as_deref()
            .and_then(|loc| self.datacenters.iter().find(|d| d.location.name == loc));
        by_name
            .or(by_location)
            .or(self.datacenters.first())
            .cloned()
            .unwrap_or_else(FakeCloud::default_datacenter)
    }
}

pub struct FakeCloud {
    state: Mutex<State>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1000,
                ..State::default()
            }),
        }
    }
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn default_datacenter() -> Datacenter {
        Datacenter {
            id: 4,
            name: "fsn1-dc14".into(),
            location: Location {
                id: 1,
                name: "fsn1".into(),
            },
        }
    }

    /// A running `cx22` server on `debian-12` (image id 1) in `fsn1-dc14`.
    pub fn sample_server(id: ResourceId, name: &str) -> Server {
        Server {
            id,
            name: name.to_string(),
            status: ServerStatus::Running,
            image: Some(Image {
                id: 1,
                name: Some("debian-12".into()),
            }),
            server_type: "cx22".into(),
            datacenter: Self::default_datacenter(),
            iso: None,
            rescue_enabled: false,
            public_ipv4: Some(format!("192.0.2.{}", id % 250)),
            public_ipv6: Some(format!("2001:db8:{id:x}::/64")),
        }
    }

    // ── Seeding ──────────────────────────────────────────────────────

    pub fn add_server(&self, server: Server) -> ResourceId {
        let id = server.id;
        self.state().servers.insert(id, server);
        id
    }

    pub fn add_image(&self, image: Image) {
        self.state().images.push(image);
    }

    pub fn add_iso(&self, iso: Iso) {
        self.state().isos.push(iso);
    }

    pub fn add_datacenter(&self, datacenter: Datacenter) {
        self.state().datacenters.push(datacenter);
    }

    pub fn add_ssh_key(&self, key: SshKey) {
        self.state().ssh_keys.insert(key.id, key);
    }

    pub fn add_floating_ip(&self, ip: FloatingIp) {
        self.state().floating_ips.insert(ip.id, ip);
    }

    /// Make every call with this key (e.g. `"power_on:3"`) fail.
    pub fn fail(&self, call: &str, message: &str) {
        self.state()
            .failing_calls
            .insert(call.to_string(), message.to_string());
    }

    /// Make every action with this command finish with an error.
    pub fn fail_actions(&self, command: &str, message: &str) {
        self.state()
            .failing_actions
            .insert(command.to_string(), message.to_string());
    }

    /// Number of `get_action` polls each new action stays `Running` for.
    pub fn set_pending_polls(&self, polls: u32) {
        self.state().pending_polls = polls;
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Calls that change remote state, in order.
    pub fn mutations(&self) -> Vec<String> {
        const READS: [&str; 4] = ["get_", "list_", "find_", "lookup_"];
        self.calls()
            .into_iter()
            .filter(|c| !READS.iter().any(|prefix| c.starts_with(prefix)))
            .collect()
    }

    pub fn polled_actions(&self) -> Vec<ResourceId> {
        self.state().polls.clone()
    }

    pub fn server(&self, id: ResourceId) -> Option<Server> {
        self.state().servers.get(&id).cloned()
    }

    pub fn servers(&self) -> Vec<Server> {
        self.state().servers.values().cloned().collect()
    }

    pub fn ssh_keys(&self) -> Vec<SshKey> {
        self.state().ssh_keys.values().cloned().collect()
    }

    pub fn floating_ip(&self, id: ResourceId) -> Option<FloatingIp> {
        self.state().floating_ips.get(&id).cloned()
    }
}

#[async_trait]
impl CloudClient for FakeCloud {
    async fn get_server(&self, id: ResourceId) -> Result<Option<Server>> {
        let mut state = self.state();
        state.record(format!("get_server:{id}"))?;
        Ok(state.servers.get(&id).cloned())
    }

    async fn get_server_by_name(&self, name: &str) -> Result<Option<Server>> {
        let mut state = self.state();
        state.record(format!("get_server_by_name:{name}"))?;
        Ok(state.servers.values().find(|s| s.name == name).cloned())
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        let mut state = self.state();
        state.record("list_servers".into())?;
        Ok(state.servers.values().cloned().collect())
    }

    async fn create_server(&self, spec: &ServerSpec) -> Result<ServerCreated> {
        let mut state = self.state();
        state.record(format!("create_server:{}", spec.name))?;
        let id = state.next_id();
        let image = state
            .images
            .iter()
            .find(|i| i.id == spec.image.id)
            .cloned()
            .unwrap_or_else(|| spec.image.clone());
        let server = Server {
            id,
            name: spec.name.clone(),
            status: if spec.start_after_create {
                ServerStatus::Running
            } else {
                ServerStatus::Off
            },
            image: Some(image),
            server_type: spec.server_type.clone(),
            datacenter: state.datacenter_for(spec),
            iso: None,
            rescue_enabled: false,
            public_ipv4: Some(format!("192.0.2.{}", id % 250)),
            public_ipv6: Some(format!("2001:db8:{id:x}::/64")),
        };
        state.servers.insert(id, server.clone());
        let action = state.start_action("create_server");
        Ok(ServerCreated { server, action })
    }

    async fn delete_server(&self, id: ResourceId) -> Result<()> {
        let mut state = self.state();
        state.record(format!("delete_server:{id}"))?;
        state.servers.remove(&id);
        Ok(())
    }

    async fn rename_server(&self, id: ResourceId, name: &str) -> Result<Server> {
        let mut state = self.state();
        state.record(format!("rename_server:{id}"))?;
        let server = state.server_mut(id)?;
        server.name = name.to_string();
        Ok(server.clone())
    }

    async fn power_on(&self, id: ResourceId) -> Result<Action> {
        let mut state = self.state();
        state.record(format!("power_on:{id}"))?;
        state.server_mut(id)?.status = ServerStatus::Running;
        Ok(state.start_action("start_server"))
    }

    async fn power_off(&self, id: ResourceId) -> Result<Action> {
        let mut state = self.state();
        state.record(format!("power_off:{id}"))?;
        state.server_mut(id)?.status = ServerStatus::Off;
        Ok(state.start_action("stop_server"))
    }

    async fn reboot(&self, id: ResourceId) -> Result<Action> {
        let mut state = self.state();
        state.record(format!("reboot:{id}"))?;
        state.server_mut(id)?.status = ServerStatus::Running;
        Ok(state.start_action("reboot_server"))
    }

    async fn reset(&self, id: ResourceId) -> Result<Action> {
        let mut state = self.state();
        state.record(format!("reset:{id}"))?;
        state.server_mut(id)?.status = ServerStatus::Running;
        Ok(state.start_action("reset_server"))
    }

    async fn attach_iso(&self, id: ResourceId, iso: &Iso) -> Result<Action> {
        let mut state = self.state();
        state.record(format!("attach_iso:{id}"))?;
        state.server_mut(id)?.iso = Some(iso.clone());
        Ok(state.start_action("attach_iso"))
    }

    async fn detach_iso(&self, id: ResourceId) -> Result<Action> {
        let mut state = self.state();
        state.record(format!("detach_iso:{id}"))?;
        state.server_mut(id)?.iso = None;
        Ok(state.start_action("detach_iso"))
    }

    async fn enable_rescue(
        &self,
        id: ResourceId,
        _rescue: RescueType,
        _ssh_keys: &[ResourceId],
    ) -> Result<Action> {
        let mut state = self.state();
        state.record(format!("enable_rescue:{id}"))?;
        state.server_mut(id)?.rescue_enabled = true;
        Ok(state.start_action("enable_rescue"))
    }

    async fn disable_rescue(&self, id: ResourceId) -> Result<Action> {
        let mut state = self.state();
        state.record(format!("disable_rescue:{id}"))?;
        state.server_mut(id)?.rescue_enabled = false;
        Ok(state.start_action("disable_rescue"))
    }

    async fn get_image(&self, id: ResourceId) -> Result<Option<Image>> {
        let mut state = self.state();
        state.record(format!("get_image:{id}"))?;
        Ok(state.images.iter().find(|i| i.id == id).cloned())
    }

    async fn get_image_by_name(&self, name: &str) -> Result<Option<Image>> {
        let mut state = self.state();
        state.record(format!("get_image_by_name:{name}"))?;
        Ok(state
            .images
            .iter()
            .find(|i| i.name.as_deref() == Some(name))
            .cloned())
    }

    async fn get_iso(&self, id: ResourceId) -> Result<Option<Iso>> {
        let mut state = self.state();
        state.record(format!("get_iso:{id}"))?;
        Ok(state.isos.iter().find(|i| i.id == id).cloned())
    }

    async fn get_iso_by_name(&self, name: &str) -> Result<Option<Iso>> {
        let mut state = self.state();
        state.record(format!("get_iso_by_name:{name}"))?;
        Ok(state
            .isos
            .iter()
            .find(|i| i.name.as_deref() == Some(name))
            .cloned())
    }

    async fn get_datacenter(&self, id_or_name: &str) -> Result<Option<Datacenter>> {
        let mut state = self.state();
        state.record(format!("get_datacenter:{id_or_name}"))?;
        Ok(state
            .datacenters
            .iter()
            .find(|d| d.name == id_or_name || d.id.to_string() == id_or_name)
            .cloned())
    }

    async fn get_location(&self, id_or_name: &str) -> Result<Option<Location>> {
        let mut state = self.state();
        state.record(format!("get_location:{id_or_name}"))?;
        Ok(state
            .datacenters
            .iter()
            .map(|d| &d.location)
            .find(|l| l.name == id_or_name || l.id.to_string() == id_or_name)
            .cloned())
    }

    async fn get_ssh_key(&self, id: ResourceId) -> Result<Option<SshKey>> {
        let mut state = self.state();
        state.record(format!("get_ssh_key:{id}"))?;
        Ok(state.ssh_keys.get(&id).cloned())
    }

    async fn get_ssh_key_by_name(&self, name: &str) -> Result<Option<SshKey>> {
        let mut state = self.state();
        state.record(format!("get_ssh_key_by_name:{name}"))?;
        Ok(state.ssh_keys.values().find(|k| k.name == name).cloned())
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        let mut state = self.state();
        state.record("list_ssh_keys".into())?;
        Ok(state.ssh_keys.values().cloned().collect())
    }

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey> {
        let mut state = self.state();
        state.record(format!("create_ssh_key:{name}"))?;
        let key = SshKey {
            id: state.next_id(),
            name: name.to_string(),
            fingerprint: String::new(),
            public_key: public_key.to_string(),
        };
        state.ssh_keys.insert(key.id, key.clone());
        Ok(key)
    }

    async fn rename_ssh_key(&self, id: ResourceId, name: &str) -> Result<SshKey> {
        let mut state = self.state();
        state.record(format!("rename_ssh_key:{id}"))?;
        let key = state
            .ssh_keys
            .get_mut(&id)
            .ok_or_else(|| Error::HetznerApi(format!("ssh key {id} not found (404)")))?;
        key.name = name.to_string();
        Ok(key.clone())
    }

    async fn delete_ssh_key(&self, id: ResourceId) -> Result<()> {
        let mut state = self.state();
        state.record(format!("delete_ssh_key:{id}"))?;
        state.ssh_keys.remove(&id);
        Ok(())
    }

    async fn get_floating_ip(&self, id: ResourceId) -> Result<Option<FloatingIp>> {
        let mut state = self.state();
        state.record(format!("get_floating_ip:{id}"))?;
        Ok(state.floating_ips.get(&id).cloned())
    }

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>> {
        let mut state = self.state();
        state.record("list_floating_ips".into())?;
        Ok(state.floating_ips.values().cloned().collect())
    }

    async fn create_floating_ip(&self, spec: &FloatingIpSpec) -> Result<FloatingIpCreated> {
        let mut state = self.state();
        state.record("create_floating_ip".into())?;
        let id = state.next_id();
        let home_location = match (&spec.home_location, spec.server) {
            (Some(location), _) => location.clone(),
            (None, Some(server)) => state
                .servers
                .get(&server)
                .map(|s| s.datacenter.location.name.clone())
                .unwrap_or_else(|| "fsn1".into()),
            (None, None) => "fsn1".into(),
        };
        let ip = FloatingIp {
            id,
            description: spec.description.clone(),
            ip: format!("198.51.100.{}", id % 250),
            ip_type: spec.ip_type,
            server: spec.server,
            home_location,
        };
        state.floating_ips.insert(id, ip.clone());
        let action = spec
            .server
            .map(|_| state.start_action("assign_floating_ip"));
        Ok(FloatingIpCreated {
            floating_ip: ip,
            action,
        })
    }

    async fn set_floating_ip_description(
        &self,
        id: ResourceId,
        description: &str,
    ) -> Result<FloatingIp> {
        let mut state = self.state();
        state.record(format!("update_floating_ip:{id}"))?;
        let ip = state
            .floating_ips
            .get_mut(&id)
            .ok_or_else(|| Error::HetznerApi(format!("floating ip {id} not found (404)")))?;
        ip.description = Some(description.to_string());
        Ok(ip.clone())
    }

    async fn assign_floating_ip(&self, id: ResourceId, server: ResourceId) -> Result<Action> {
        let mut state = self.state();
        state.record(format!("assign_floating_ip:{id}"))?;
        let ip = state
            .floating_ips
            .get_mut(&id)
            .ok_or_else(|| Error::HetznerApi(format!("floating ip {id} not found (404)")))?;
        ip.server = Some(server);
        Ok(state.start_action("assign_floating_ip"))
    }

    async fn unassign_floating_ip(&self, id: ResourceId) -> Result<Action> {
        let mut state = self.state();
        state.record(format!("unassign_floating_ip:{id}"))?;
        let ip = state
            .floating_ips
            .get_mut(&id)
            .ok_or_else(|| Error::HetznerApi(format!("floating ip {id} not found (404)")))?;
        ip.server = None;
        Ok(state.start_action("unassign_floating_ip"))
    }

    async fn delete_floating_ip(&self, id: ResourceId) -> Result<()> {
        let mut state = self.state();
        state.record(format!("delete_floating_ip:{id}"))?;
        state.floating_ips.remove(&id);
        Ok(())
    }

    async fn get_action(&self, id: ResourceId) -> Result<Action> {
        let mut state = self.state();
        state.polls.push(id);
        let pending = state
            .actions
            .get_mut(&id)
            .ok_or_else(|| Error::HetznerApi(format!("action {id} not found (404)")))?;
        pending.remaining_polls = pending.remaining_polls.saturating_sub(1);
        if pending.remaining_polls == 0 {
            pending.action.status = pending.final_status;
            pending.action.progress = 100;
            pending.action.error = pending.error.clone();
        }
        Ok(pending.action.clone())
    }
}
