use serde::{Deserialize, Serialize};

// ── Shared ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub next_page: Option<u32>,
    pub last_page: Option<u32>,
    pub total_entries: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

// ── Actions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Action {
    pub id: i64,
    pub command: String,
    pub status: ActionStatus,
    #[serde(default)]
    pub progress: i32,
    pub error: Option<ActionError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionResponse {
    pub action: Action,
}

// ── Servers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub image: Option<Image>,
    pub iso: Option<Iso>,
    pub server_type: ServerType,
    pub datacenter: Datacenter,
    pub public_net: PublicNet,
    #[serde(default)]
    pub rescue_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerType {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicNet {
    pub ipv4: Option<PublicIpv4>,
    pub ipv6: Option<PublicIpv6>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicIpv4 {
    pub ip: String,
}

/// `ip` holds the assigned network in CIDR notation, e.g. `2001:db8::/64`.
#[derive(Debug, Clone, Deserialize)]
pub struct PublicIpv6 {
    pub ip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub server_type: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<i64>,
    pub start_after_create: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateServerResponse {
    pub server: Server,
    pub action: Action,
    pub root_password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateServerRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachIsoRequest {
    pub iso: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnableRescueRequest {
    #[serde(rename = "type")]
    pub rescue_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnableRescueResponse {
    pub action: Action,
    pub root_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerResponse {
    pub server: Server,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListServersResponse {
    pub servers: Vec<Server>,
    pub meta: Option<Meta>,
}

// ── Catalog (images, ISOs, datacenters, locations) ───────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Iso {
    pub id: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Datacenter {
    pub id: i64,
    pub name: String,
    pub location: Location,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageResponse {
    pub image: Image,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListImagesResponse {
    pub images: Vec<Image>,
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IsoResponse {
    pub iso: Iso,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListIsosResponse {
    pub isos: Vec<Iso>,
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatacenterResponse {
    pub datacenter: Datacenter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListDatacentersResponse {
    pub datacenters: Vec<Datacenter>,
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationResponse {
    pub location: Location,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListLocationsResponse {
    pub locations: Vec<Location>,
    pub meta: Option<Meta>,
}

// ── SSH keys ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SshKey {
    pub id: i64,
    pub name: String,
    pub fingerprint: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSshKeyRequest {
    pub name: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateSshKeyRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshKeyResponse {
    pub ssh_key: SshKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListSshKeysResponse {
    pub ssh_keys: Vec<SshKey>,
    pub meta: Option<Meta>,
}

// ── Floating IPs ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FloatingIp {
    pub id: i64,
    pub description: Option<String>,
    pub ip: String,
    #[serde(rename = "type")]
    pub ip_type: String,
    pub server: Option<i64>,
    pub home_location: Location,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFloatingIpRequest {
    #[serde(rename = "type")]
    pub ip_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFloatingIpResponse {
    pub floating_ip: FloatingIp,
    pub action: Option<Action>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateFloatingIpRequest {
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignFloatingIpRequest {
    pub server: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloatingIpResponse {
    pub floating_ip: FloatingIp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListFloatingIpsResponse {
    pub floating_ips: Vec<FloatingIp>,
    pub meta: Option<Meta>,
}
