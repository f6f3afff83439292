//! Typed Rust client for the Hetzner Cloud API.
//!
//! Covers the subset needed by the provisioning modules:
//! servers (CRUD and power/ISO/rescue actions), images, ISOs, datacenters,
//! locations, SSH keys, floating IPs and action polling.
//!
//! List endpoints follow `meta.pagination.next_page` until exhausted.

mod types;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use types::*;

pub const DEFAULT_ENDPOINT: &str = "https://api.hetzner.cloud/v1";

const PER_PAGE: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("hcloud api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("hcloud api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

impl Error {
    /// The `error.message` field of an API error body, falling back to the raw body.
    pub fn api_message(&self) -> Option<String> {
        match self {
            Error::Api { body, .. } => Some(
                serde_json::from_str::<ApiErrorBody>(body)
                    .map(|b| b.error.message)
                    .unwrap_or_else(|_| body.clone()),
            ),
            Error::Request(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A list response that carries one page of items plus pagination metadata.
trait Page: DeserializeOwned {
    type Item;

    fn into_parts(self) -> (Vec<Self::Item>, Option<Meta>);
}

macro_rules! page {
    ($resp:ty, $field:ident, $item:ty) => {
        impl Page for $resp {
            type Item = $item;

            fn into_parts(self) -> (Vec<$item>, Option<Meta>) {
                (self.$field, self.meta)
            }
        }
    };
}

page!(ListServersResponse, servers, Server);
page!(ListImagesResponse, images, Image);
page!(ListIsosResponse, isos, Iso);
page!(ListDatacentersResponse, datacenters, Datacenter);
page!(ListLocationsResponse, locations, Location);
page!(ListSshKeysResponse, ssh_keys, SshKey);
page!(ListFloatingIpsResponse, floating_ips, FloatingIp);

/// Move one page's items into `items` and return the page to fetch next.
fn collect_page<P: Page>(body: P, items: &mut Vec<P::Item>) -> Option<u32> {
    let (mut batch, meta) = body.into_parts();
    items.append(&mut batch);
    meta.and_then(|m| m.pagination).and_then(|p| p.next_page)
}

/// Client for the Hetzner Cloud REST API.
#[derive(Clone)]
pub struct HcloudClient {
    token: String,
    endpoint: String,
    http: reqwest::Client,
}

impl HcloudClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_endpoint(token, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(token: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, endpoint: &'static str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .header("Authorization", self.auth())
            .send()
            .await?;

        Self::check(resp, endpoint)
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    /// Like `get` but maps 404 to `None`.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        endpoint: &'static str,
    ) -> Result<Option<T>> {
        let resp = self
            .http
            .get(self.url(path))
            .header("Authorization", self.auth())
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Self::check(resp, endpoint)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(Error::from)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
        endpoint: &'static str,
    ) -> Result<T> {
        let mut req = self
            .http
            .request(method, self.url(path))
            .header("Authorization", self.auth());
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;

        Self::check(resp, endpoint)
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        endpoint: &'static str,
    ) -> Result<T> {
        self.send_json(reqwest::Method::POST, path, Some(body), endpoint)
            .await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str, endpoint: &'static str) -> Result<T> {
        self.send_json::<(), T>(reqwest::Method::POST, path, None, endpoint)
            .await
    }

    async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        endpoint: &'static str,
    ) -> Result<T> {
        self.send_json(reqwest::Method::PUT, path, Some(body), endpoint)
            .await
    }

    async fn delete(&self, path: &str, endpoint: &'static str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(path))
            .header("Authorization", self.auth())
            .send()
            .await?;

        Self::check(resp, endpoint).await?;
        Ok(())
    }

    async fn list<P: Page>(
        &self,
        path: &str,
        filter: &[(&str, String)],
        endpoint: &'static str,
    ) -> Result<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let mut query: Vec<(&str, String)> = filter.to_vec();
            query.push(("page", page.to_string()));
            query.push(("per_page", PER_PAGE.to_string()));

            let resp = self
                .http
                .get(self.url(path))
                .header("Authorization", self.auth())
                .query(&query)
                .send()
                .await?;

            let body: P = Self::check(resp, endpoint).await?.json().await?;
            match collect_page(body, &mut items) {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(items)
    }

    async fn find_by_name<P: Page>(
        &self,
        path: &str,
        name: &str,
        endpoint: &'static str,
    ) -> Result<Option<P::Item>> {
        let mut found = self
            .list::<P>(path, &[("name", name.to_string())], endpoint)
            .await?;
        if found.is_empty() {
            Ok(None)
        } else {
            Ok(Some(found.swap_remove(0)))
        }
    }

    // ── Actions ──────────────────────────────────────────────────────

    pub async fn get_action(&self, id: i64) -> Result<Action> {
        let resp: ActionResponse = self.get(&format!("/actions/{id}"), "get action").await?;
        Ok(resp.action)
    }

    // ── Servers ──────────────────────────────────────────────────────

    pub async fn get_server(&self, id: i64) -> Result<Option<Server>> {
        let resp: Option<ServerResponse> = self
            .get_optional(&format!("/servers/{id}"), "get server")
            .await?;
        Ok(resp.map(|r| r.server))
    }

    pub async fn get_server_by_name(&self, name: &str) -> Result<Option<Server>> {
        self.find_by_name::<ListServersResponse>("/servers", name, "list servers")
            .await
    }

    pub async fn list_servers(&self) -> Result<Vec<Server>> {
        self.list::<ListServersResponse>("/servers", &[], "list servers")
            .await
    }

    pub async fn create_server(&self, req: &CreateServerRequest) -> Result<CreateServerResponse> {
        self.post("/servers", req, "create server").await
    }

    pub async fn delete_server(&self, id: i64) -> Result<()> {
        self.delete(&format!("/servers/{id}"), "delete server").await
    }

    pub async fn update_server(&self, id: i64, req: &UpdateServerRequest) -> Result<Server> {
        let resp: ServerResponse = self
            .put(&format!("/servers/{id}"), req, "update server")
            .await?;
        Ok(resp.server)
    }

    async fn server_action(&self, id: i64, action: &str, endpoint: &'static str) -> Result<Action> {
        let resp: ActionResponse = self
            .post_empty(&format!("/servers/{id}/actions/{action}"), endpoint)
            .await?;
        Ok(resp.action)
    }

    pub async fn power_on_server(&self, id: i64) -> Result<Action> {
        self.server_action(id, "poweron", "power on server").await
    }

    pub async fn power_off_server(&self, id: i64) -> Result<Action> {
        self.server_action(id, "poweroff", "power off server").await
    }

    pub async fn reboot_server(&self, id: i64) -> Result<Action> {
        self.server_action(id, "reboot", "reboot server").await
    }

    pub async fn reset_server(&self, id: i64) -> Result<Action> {
        self.server_action(id, "reset", "reset server").await
    }

    pub async fn attach_iso(&self, id: i64, req: &AttachIsoRequest) -> Result<Action> {
        let resp: ActionResponse = self
            .post(&format!("/servers/{id}/actions/attach_iso"), req, "attach iso")
            .await?;
        Ok(resp.action)
    }

    pub async fn detach_iso(&self, id: i64) -> Result<Action> {
        self.server_action(id, "detach_iso", "detach iso").await
    }

    pub async fn enable_rescue(
        &self,
        id: i64,
        req: &EnableRescueRequest,
    ) -> Result<EnableRescueResponse> {
        self.post(
            &format!("/servers/{id}/actions/enable_rescue"),
            req,
            "enable rescue",
        )
        .await
    }

    pub async fn disable_rescue(&self, id: i64) -> Result<Action> {
        self.server_action(id, "disable_rescue", "disable rescue")
            .await
    }

    // ── Catalog ──────────────────────────────────────────────────────

    pub async fn get_image(&self, id: i64) -> Result<Option<Image>> {
        let resp: Option<ImageResponse> = self
            .get_optional(&format!("/images/{id}"), "get image")
            .await?;
        Ok(resp.map(|r| r.image))
    }

    pub async fn get_image_by_name(&self, name: &str) -> Result<Option<Image>> {
        self.find_by_name::<ListImagesResponse>("/images", name, "list images")
            .await
    }

    pub async fn get_iso(&self, id: i64) -> Result<Option<Iso>> {
        let resp: Option<IsoResponse> = self
            .get_optional(&format!("/isos/{id}"), "get iso")
            .await?;
        Ok(resp.map(|r| r.iso))
    }

    pub async fn get_iso_by_name(&self, name: &str) -> Result<Option<Iso>> {
        self.find_by_name::<ListIsosResponse>("/isos", name, "list isos")
            .await
    }

    pub async fn get_datacenter(&self, id: i64) -> Result<Option<Datacenter>> {
        let resp: Option<DatacenterResponse> = self
            .get_optional(&format!("/datacenters/{id}"), "get datacenter")
            .await?;
        Ok(resp.map(|r| r.datacenter))
    }

    pub async fn get_datacenter_by_name(&self, name: &str) -> Result<Option<Datacenter>> {
        self.find_by_name::<ListDatacentersResponse>("/datacenters", name, "list datacenters")
            .await
    }

    pub async fn get_location(&self, id: i64) -> Result<Option<Location>> {
        let resp: Option<LocationResponse> = self
            .get_optional(&format!("/locations/{id}"), "get location")
            .await?;
        Ok(resp.map(|r| r.location))
    }

    pub async fn get_location_by_name(&self, name: &str) -> Result<Option<Location>> {
        self.find_by_name::<ListLocationsResponse>("/locations", name, "list locations")
            .await
    }

    // ── SSH keys ─────────────────────────────────────────────────────

    pub async fn get_ssh_key(&self, id: i64) -> Result<Option<SshKey>> {
        let resp: Option<SshKeyResponse> = self
            .get_optional(&format!("/ssh_keys/{id}"), "get ssh key")
            .await?;
        Ok(resp.map(|r| r.ssh_key))
    }

    pub async fn get_ssh_key_by_name(&self, name: &str) -> Result<Option<SshKey>> {
        self.find_by_name::<ListSshKeysResponse>("/ssh_keys", name, "list ssh keys")
            .await
    }

    pub async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        self.list::<ListSshKeysResponse>("/ssh_keys", &[], "list ssh keys")
            .await
    }

    pub async fn create_ssh_key(&self, req: &CreateSshKeyRequest) -> Result<SshKey> {
        let resp: SshKeyResponse = self.post("/ssh_keys", req, "create ssh key").await?;
        Ok(resp.ssh_key)
    }

    pub async fn update_ssh_key(&self, id: i64, req: &UpdateSshKeyRequest) -> Result<SshKey> {
        let resp: SshKeyResponse = self
            .put(&format!("/ssh_keys/{id}"), req, "update ssh key")
            .await?;
        Ok(resp.ssh_key)
    }

    pub async fn delete_ssh_key(&self, id: i64) -> Result<()> {
        self.delete(&format!("/ssh_keys/{id}"), "delete ssh key")
            .await
    }

    // ── Floating IPs ─────────────────────────────────────────────────

    pub async fn get_floating_ip(&self, id: i64) -> Result<Option<FloatingIp>> {
        let resp: Option<FloatingIpResponse> = self
            .get_optional(&format!("/floating_ips/{id}"), "get floating ip")
            .await?;
        Ok(resp.map(|r| r.floating_ip))
    }

    pub async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>> {
        self.list::<ListFloatingIpsResponse>("/floating_ips", &[], "list floating ips")
            .await
    }

    pub async fn create_floating_ip(
        &self,
        req: &CreateFloatingIpRequest,
    ) -> Result<CreateFloatingIpResponse> {
        self.post("/floating_ips", req, "create floating ip").await
    }

    pub async fn update_floating_ip(
        &self,
        id: i64,
        req: &UpdateFloatingIpRequest,
    ) -> Result<FloatingIp> {
        let resp: FloatingIpResponse = self
            .put(&format!("/floating_ips/{id}"), req, "update floating ip")
            .await?;
        Ok(resp.floating_ip)
    }

    pub async fn assign_floating_ip(&self, id: i64, req: &AssignFloatingIpRequest) -> Result<Action> {
        let resp: ActionResponse = self
            .post(
                &format!("/floating_ips/{id}/actions/assign"),
                req,
                "assign floating ip",
            )
            .await?;
        Ok(resp.action)
    }

    pub async fn unassign_floating_ip(&self, id: i64) -> Result<Action> {
        let resp: ActionResponse = self
            .post_empty(
                &format!("/floating_ips/{id}/actions/unassign"),
                "unassign floating ip",
            )
            .await?;
        Ok(resp.action)
    }

    pub async fn delete_floating_ip(&self, id: i64) -> Result<()> {
        self.delete(&format!("/floating_ips/{id}"), "delete floating ip")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh_key_page(ids: &[i64], next_page: Option<u32>) -> ListSshKeysResponse {
        let keys: Vec<_> = ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "id": id,
                    "name": format!("key{id}"),
                    "fingerprint": "00:11",
                    "public_key": "ssh-ed25519 AAAA",
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({
            "ssh_keys": keys,
            "meta": {
                "pagination": {
                    "page": 1,
                    "per_page": 2,
                    "next_page": next_page,
                    "last_page": 2,
                    "total_entries": 3,
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn pages_accumulate_until_next_page_runs_out() {
        let mut items = Vec::new();

        assert_eq!(collect_page(ssh_key_page(&[1, 2], Some(2)), &mut items), Some(2));
        assert_eq!(collect_page(ssh_key_page(&[3], None), &mut items), None);

        let ids: Vec<i64> = items.iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn missing_meta_ends_pagination() {
        let body: ListSshKeysResponse =
            serde_json::from_value(serde_json::json!({ "ssh_keys": [] })).unwrap();
        let mut items = Vec::new();
        assert_eq!(collect_page(body, &mut items), None);
        assert!(items.is_empty());
    }

    #[test]
    fn api_message_prefers_error_body() {
        let err = Error::Api {
            endpoint: "get server",
            status: reqwest::StatusCode::UNAUTHORIZED,
            body: r#"{"error":{"code":"unauthorized","message":"unable to authenticate"}}"#.into(),
        };
        assert_eq!(err.api_message().as_deref(), Some("unable to authenticate"));

        let raw = Error::Api {
            endpoint: "get server",
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: "upstream down".into(),
        };
        assert_eq!(raw.api_message().as_deref(), Some("upstream down"));
    }

    #[test]
    fn server_payload_deserializes() {
        let body = serde_json::json!({
            "server": {
                "id": 42,
                "name": "web1",
                "status": "running",
                "image": { "id": 1, "name": "debian-12", "description": "Debian 12" },
                "iso": null,
                "server_type": { "id": 1, "name": "cx22" },
                "datacenter": {
                    "id": 4,
                    "name": "fsn1-dc14",
                    "location": { "id": 1, "name": "fsn1" }
                },
                "public_net": {
                    "ipv4": { "ip": "192.0.2.10" },
                    "ipv6": { "ip": "2001:db8::/64" }
                },
                "rescue_enabled": false,
                "labels": {}
            }
        });
        let resp: ServerResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.server.id, 42);
        assert_eq!(resp.server.datacenter.location.name, "fsn1");
        assert_eq!(resp.server.public_net.ipv6.unwrap().ip, "2001:db8::/64");
    }

    #[test]
    fn create_request_omits_unset_fields() {
        let req = CreateServerRequest {
            name: "web1".into(),
            server_type: "cx22".into(),
            image: "debian-12".into(),
            location: None,
            datacenter: None,
            user_data: None,
            ssh_keys: Vec::new(),
            start_after_create: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "web1",
                "server_type": "cx22",
                "image": "debian-12",
                "start_after_create": false
            })
        );
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let client = HcloudClient::with_endpoint("t", "http://localhost:4000/v1/");
        assert_eq!(client.url("/servers"), "http://localhost:4000/v1/servers");
    }
}
