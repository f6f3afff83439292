use hc_infra::types::{ResourceId, Server};
use serde::Serialize;

/// Module output for one server. Every field is always present; missing
/// values are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerRecord {
    pub id: ResourceId,
    pub name: String,
    pub image: String,
    pub server_type: String,
    pub status: String,
    pub datacenter: String,
    pub location: String,
    pub iso: String,
    pub public_ipv4: String,
    pub public_ipv6: String,
}

pub fn project(server: &Server) -> ServerRecord {
    ServerRecord {
        id: server.id,
        name: server.name.clone(),
        image: server.image.as_ref().map(|i| i.label()).unwrap_or_default(),
        server_type: server.server_type.clone(),
        status: server.status.to_string(),
        datacenter: server.datacenter.name.clone(),
        location: server.datacenter.location.name.clone(),
        iso: server
            .iso
            .as_ref()
            .and_then(|iso| iso.name.clone())
            .unwrap_or_default(),
        public_ipv4: server.public_ipv4.clone().unwrap_or_default(),
        public_ipv6: server.public_ipv6.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use hc_infra::mock::FakeCloud;
    use hc_infra::types::Iso;
    use serde_json::json;

    use super::*;

    #[test]
    fn record_shape_is_stable() {
        let mut server = FakeCloud::sample_server(42, "web1");
        server.public_ipv6 = None;

        assert_eq!(
            serde_json::to_value(project(&server)).unwrap(),
            json!({
                "id": 42,
                "name": "web1",
                "image": "debian-12",
                "server_type": "cx22",
                "status": "running",
                "datacenter": "fsn1-dc14",
                "location": "fsn1",
                "iso": "",
                "public_ipv4": "192.0.2.42",
                "public_ipv6": "",
            })
        );
    }

    #[test]
    fn attached_iso_and_unnamed_image() {
        let mut server = FakeCloud::sample_server(1, "web1");
        server.iso = Some(Iso {
            id: 7,
            name: Some("virtio-win.iso".into()),
        });
        if let Some(image) = server.image.as_mut() {
            image.name = None;
        }

        let record = project(&server);
        assert_eq!(record.iso, "virtio-win.iso");
        assert_eq!(record.image, "image_1");
    }
}
