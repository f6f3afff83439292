//! Convergence planning for one server.
//!
//! `plan` is pure: it compares a snapshot with the desired configuration and
//! returns the ordered list of remote operations that converge them. The
//! order is fixed: delete/create, media, power, rename, rescue, reset. Media
//! changes come before power changes so a restart never boots from an ISO
//! that is about to be detached.

use hc_infra::types::{
    Datacenter, Iso, Location, RescueType, ResourceId, Server, ServerSpec, ServerStatus,
};

use super::config::{DesiredServer, DesiredState};
use crate::args::ResourceRef;
use crate::error::{ModuleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReason {
    Absent,
    Recreate,
}

/// One decided, not yet executed, remote mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Delete(DeleteReason),
    Create(ServerSpec),
    DetachIso(Iso),
    AttachIso(Iso),
    PowerOn,
    PowerOff,
    Reboot,
    Reset,
    Rename(String),
    EnableRescue {
        rescue: RescueType,
        ssh_keys: Vec<ResourceId>,
    },
    DisableRescue,
}

impl Intent {
    pub fn is_power_change(&self) -> bool {
        matches!(
            self,
            Intent::PowerOn | Intent::PowerOff | Intent::Reboot | Intent::Reset
        )
    }
}

/// Whether `server` differs from `desired` in a field that cannot be changed
/// in place. Unset desired fields never force a recreate.
pub fn needs_recreate(server: &Server, desired: &DesiredServer) -> bool {
    if let (Some(want), Some(have)) = (&desired.image, &server.image)
        && want.id != have.id
    {
        return true;
    }
    if let Some(server_type) = &desired.server_type
        && &server.server_type != server_type
    {
        return true;
    }
    if let Some(datacenter) = &desired.datacenter
        && server.datacenter.name != datacenter.name
    {
        return true;
    }
    if let Some(location) = &desired.location
        && server.datacenter.location.name != location.name
    {
        return true;
    }
    false
}

/// Compute the intents that converge `current` towards `desired` for one
/// target. Validation problems are reported here, before anything runs.
pub fn plan(
    current: Option<&Server>,
    desired: &DesiredServer,
    target: &ResourceRef,
) -> Result<Vec<Intent>> {
    let mut intents = Vec::new();

    match desired.state {
        DesiredState::List => return Ok(intents),
        DesiredState::Absent => {
            if current.is_some() {
                intents.push(Intent::Delete(DeleteReason::Absent));
            }
            return Ok(intents);
        }
        _ => {}
    }

    let mut snapshot = current.cloned();
    let mut fallback_name = None;
    if let Some(server) = &snapshot
        && needs_recreate(server, desired)
    {
        intents.push(Intent::Delete(DeleteReason::Recreate));
        fallback_name = Some(server.name.clone());
        snapshot = None;
    }

    let created = snapshot.is_none();
    let server = match snapshot {
        Some(server) => server,
        None => {
            // An id names an existing server; only a recreate may replace it.
            let name = match (target.id, fallback_name) {
                (_, Some(old)) => target.name.clone().unwrap_or(old),
                (Some(_), None) => return Err(not_found(target)),
                (None, None) => target.name.clone().ok_or_else(|| not_found(target))?,
            };
            let spec = creation_spec(name, desired)?;
            let predicted = predict(&spec);
            intents.push(Intent::Create(spec));
            predicted
        }
    };

    // Media.
    let mut attached = server.iso.clone();
    if let Some(iso) = &attached
        && desired.iso.as_ref().is_none_or(|want| want.id != iso.id)
    {
        intents.push(Intent::DetachIso(iso.clone()));
        attached = None;
    }
    if attached.is_none()
        && let Some(iso) = &desired.iso
    {
        intents.push(Intent::AttachIso(iso.clone()));
    }

    // Power.
    match desired.state {
        DesiredState::Running | DesiredState::Restarted => {
            if server.status != ServerStatus::Running {
                intents.push(Intent::PowerOn);
            } else if desired.state == DesiredState::Restarted && !created {
                intents.push(Intent::Reboot);
            }
        }
        DesiredState::Stopped if server.status != ServerStatus::Off => {
            intents.push(Intent::PowerOff);
        }
        _ => {}
    }

    // Rename.
    if let Some(name) = &target.name
        && &server.name != name
    {
        intents.push(Intent::Rename(name.clone()));
    }

    // Rescue.
    let mut rescue_toggled = false;
    match (server.rescue_enabled, desired.rescue) {
        (true, None) => {
            intents.push(Intent::DisableRescue);
            rescue_toggled = true;
        }
        (false, Some(rescue)) => {
            intents.push(Intent::EnableRescue {
                rescue,
                ssh_keys: desired.ssh_keys.clone(),
            });
            rescue_toggled = true;
        }
        _ => {}
    }

    if rescue_toggled && desired.state != DesiredState::Stopped {
        intents.push(Intent::Reset);
    }

    Ok(intents)
}

fn not_found(target: &ResourceRef) -> ModuleError {
    match (target.id, &target.name) {
        (Some(id), _) => ModuleError::NotFound(format!("Server with id {id} not found")),
        (None, Some(name)) => ModuleError::NotFound(format!("Server with name \"{name}\" not found")),
        (None, None) => ModuleError::MissingIdentity,
    }
}

fn creation_spec(name: String, desired: &DesiredServer) -> Result<ServerSpec> {
    let mut missing = Vec::new();
    if desired.image.is_none() {
        missing.push("'image' is required".to_string());
    }
    if desired.server_type.is_none() {
        missing.push("'server_type' is required".to_string());
    }
    let (Some(image), Some(server_type)) = (&desired.image, &desired.server_type) else {
        return Err(ModuleError::Validation(format!(
            "Cannot create server '{name}': {}",
            missing.join(", ")
        )));
    };

    Ok(ServerSpec {
        name,
        server_type: server_type.clone(),
        image: image.clone(),
        datacenter: desired.datacenter.as_ref().map(|d| d.name.clone()),
        location: desired.location.as_ref().map(|l| l.name.clone()),
        user_data: desired.user_data.clone(),
        ssh_keys: desired.ssh_keys.clone(),
        start_after_create: desired.state != DesiredState::Stopped,
    })
}

/// The snapshot a freshly created server is expected to have.
fn predict(spec: &ServerSpec) -> Server {
    Server {
        id: 0,
        name: spec.name.clone(),
        status: if spec.start_after_create {
            ServerStatus::Running
        } else {
            ServerStatus::Off
        },
        image: Some(spec.image.clone()),
        server_type: spec.server_type.clone(),
        datacenter: Datacenter {
            id: 0,
            name: spec.datacenter.clone().unwrap_or_default(),
            location: Location {
                id: 0,
                name: spec.location.clone().unwrap_or_default(),
            },
        },
        iso: None,
        rescue_enabled: false,
        public_ipv4: None,
        public_ipv6: None,
    }
}

/// Apply `intents` to `current` as the remote side would, without any I/O.
pub fn simulate(current: Option<&Server>, intents: &[Intent]) -> Option<Server> {
    let mut state = current.cloned();
    for intent in intents {
        state = match (intent, state) {
            (Intent::Delete(_), _) => None,
            (Intent::Create(spec), _) => Some(predict(spec)),
            (_, None) => None,
            (intent, Some(mut server)) => {
                match intent {
                    Intent::DetachIso(_) => server.iso = None,
                    Intent::AttachIso(iso) => server.iso = Some(iso.clone()),
                    Intent::PowerOn | Intent::Reboot | Intent::Reset => {
                        server.status = ServerStatus::Running
                    }
                    Intent::PowerOff => server.status = ServerStatus::Off,
                    Intent::Rename(name) => server.name = name.clone(),
                    Intent::EnableRescue { .. } => server.rescue_enabled = true,
                    Intent::DisableRescue => server.rescue_enabled = false,
                    Intent::Delete(_) | Intent::Create(_) => {}
                }
                Some(server)
            }
        };
    }
    state
}

#[cfg(test)]
mod tests {
    use hc_infra::mock::FakeCloud;
    use hc_infra::types::Image;

    use super::*;

    fn image(id: ResourceId, name: &str) -> Image {
        Image {
            id,
            name: Some(name.into()),
        }
    }

    fn iso(id: ResourceId) -> Iso {
        Iso {
            id,
            name: Some(format!("iso-{id}")),
        }
    }

    fn running(name: &str) -> Server {
        FakeCloud::sample_server(1, name)
    }

    fn off(name: &str) -> Server {
        Server {
            status: ServerStatus::Off,
            ..running(name)
        }
    }

    fn desired(state: DesiredState) -> DesiredServer {
        DesiredServer::new(state)
    }

    fn web1() -> ResourceRef {
        ResourceRef::by_name("web1")
    }

    #[test]
    fn absent_and_missing_is_a_noop() {
        let intents = plan(None, &desired(DesiredState::Absent), &web1()).unwrap();
        assert!(intents.is_empty());
    }

    #[test]
    fn absent_and_present_deletes_only() {
        let mut want = desired(DesiredState::Absent);
        want.rescue = Some(RescueType::Linux64);
        let intents = plan(Some(&running("web1")), &want, &web1()).unwrap();
        assert_eq!(intents, vec![Intent::Delete(DeleteReason::Absent)]);
    }

    #[test]
    fn differing_template_recreates_first() {
        let current = running("web1");
        let cases: Vec<Box<dyn Fn(&mut DesiredServer)>> = vec![
            Box::new(|d: &mut DesiredServer| d.image = Some(image(2, "ubuntu-24.04"))),
            Box::new(|d: &mut DesiredServer| d.server_type = Some("cx32".into())),
            Box::new(|d: &mut DesiredServer| {
                d.datacenter = Some(Datacenter {
                    id: 2,
                    name: "nbg1-dc3".into(),
                    location: Location {
                        id: 2,
                        name: "nbg1".into(),
                    },
                })
            }),
            Box::new(|d: &mut DesiredServer| {
                d.location = Some(Location {
                    id: 3,
                    name: "hel1".into(),
                })
            }),
        ];

        for change in cases {
            for state in [
                DesiredState::Present,
                DesiredState::Running,
                DesiredState::Stopped,
                DesiredState::Restarted,
            ] {
                let mut want = desired(state);
                want.image = Some(image(1, "debian-12"));
                want.server_type = Some("cx22".into());
                change(&mut want);

                let intents = plan(Some(&current), &want, &web1()).unwrap();
                assert_eq!(intents[0], Intent::Delete(DeleteReason::Recreate));
                assert!(matches!(intents[1], Intent::Create(_)), "{intents:?}");
            }
        }
    }

    #[test]
    fn recreate_keeps_the_old_name_for_id_targets() {
        let mut want = desired(DesiredState::Present);
        want.image = Some(image(2, "ubuntu-24.04"));
        want.server_type = Some("cx22".into());

        let intents = plan(Some(&running("web1")), &want, &ResourceRef::by_id(1)).unwrap();
        let Intent::Create(spec) = &intents[1] else {
            panic!("expected create, got {intents:?}");
        };
        assert_eq!(spec.name, "web1");
    }

    #[test]
    fn unknown_current_image_does_not_recreate() {
        let mut current = running("web1");
        current.image = None;
        let mut want = desired(DesiredState::Present);
        want.image = Some(image(1, "debian-12"));
        assert!(plan(Some(&current), &want, &web1()).unwrap().is_empty());
    }

    #[test]
    fn creation_lists_every_missing_field() {
        let err = plan(None, &desired(DesiredState::Present), &web1()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot create server 'web1': 'image' is required, 'server_type' is required"
        );
    }

    #[test]
    fn missing_id_target_cannot_be_created() {
        let err = plan(None, &desired(DesiredState::Running), &ResourceRef::by_id(9)).unwrap_err();
        assert!(matches!(err, ModuleError::NotFound(_)));
    }

    #[test]
    fn missing_id_with_name_is_not_created() {
        let mut want = desired(DesiredState::Present);
        want.image = Some(image(1, "debian-12"));
        want.server_type = Some("cx22".into());
        let target = ResourceRef {
            id: Some(99),
            name: Some("web1".into()),
        };
        let err = plan(None, &want, &target).unwrap_err();
        assert_eq!(err.to_string(), "Server with id 99 not found");
    }

    #[test]
    fn create_stopped() {
        let mut want = desired(DesiredState::Stopped);
        want.image = Some(image(5, "debian-9"));
        want.server_type = Some("cx11".into());

        let intents = plan(None, &want, &web1()).unwrap();
        assert_eq!(intents.len(), 1);
        let Intent::Create(spec) = &intents[0] else {
            panic!("expected create, got {intents:?}");
        };
        assert_eq!(spec.name, "web1");
        assert!(!spec.start_after_create);
        assert_eq!(
            simulate(None, &intents).map(|s| s.status),
            Some(ServerStatus::Off)
        );
    }

    #[test]
    fn detach_then_reboot() {
        let mut current = running("web1");
        current.iso = Some(iso(7));
        let intents = plan(Some(&current), &desired(DesiredState::Restarted), &web1()).unwrap();
        assert_eq!(intents, vec![Intent::DetachIso(iso(7)), Intent::Reboot]);
    }

    #[test]
    fn media_changes_precede_power_changes() {
        let mut current = off("web1");
        current.iso = Some(iso(7));
        let mut want = desired(DesiredState::Restarted);
        want.iso = Some(iso(8));

        let intents = plan(Some(&current), &want, &web1()).unwrap();
        assert_eq!(
            intents,
            vec![
                Intent::DetachIso(iso(7)),
                Intent::AttachIso(iso(8)),
                Intent::PowerOn,
            ]
        );
    }

    #[test]
    fn same_iso_is_left_alone() {
        let mut current = running("web1");
        current.iso = Some(iso(7));
        let mut want = desired(DesiredState::Running);
        want.iso = Some(iso(7));
        assert!(plan(Some(&current), &want, &web1()).unwrap().is_empty());
    }

    #[test]
    fn power_on_then_rescue_then_reset() {
        let mut want = desired(DesiredState::Running);
        want.rescue = Some(RescueType::Linux64);
        want.ssh_keys = vec![9];

        let intents = plan(Some(&off("web1")), &want, &web1()).unwrap();
        assert_eq!(
            intents,
            vec![
                Intent::PowerOn,
                Intent::EnableRescue {
                    rescue: RescueType::Linux64,
                    ssh_keys: vec![9],
                },
                Intent::Reset,
            ]
        );

        let intents = plan(Some(&running("web1")), &want, &web1()).unwrap();
        assert_eq!(intents.len(), 2);
        assert_eq!(intents.last(), Some(&Intent::Reset));
    }

    #[test]
    fn reset_is_last_whenever_rescue_toggles() {
        for state in [
            DesiredState::Present,
            DesiredState::Running,
            DesiredState::Restarted,
        ] {
            let mut current = off("old-name");
            current.rescue_enabled = true;
            current.iso = Some(iso(7));

            let intents = plan(Some(&current), &desired(state), &web1()).unwrap();
            assert!(intents.contains(&Intent::DisableRescue));
            assert_eq!(intents.last(), Some(&Intent::Reset), "{state}: {intents:?}");
        }
    }

    #[test]
    fn stopped_never_resets() {
        let mut current = running("web1");
        current.rescue_enabled = true;
        let intents = plan(Some(&current), &desired(DesiredState::Stopped), &web1()).unwrap();
        assert_eq!(intents, vec![Intent::PowerOff, Intent::DisableRescue]);
    }

    #[test]
    fn rename_follows_power() {
        let target = ResourceRef {
            id: Some(1),
            name: Some("web2".into()),
        };
        let intents = plan(Some(&off("web1")), &desired(DesiredState::Running), &target).unwrap();
        assert_eq!(intents, vec![Intent::PowerOn, Intent::Rename("web2".into())]);
    }

    #[test]
    fn restarted_after_create_does_not_reboot() {
        let mut want = desired(DesiredState::Restarted);
        want.image = Some(image(1, "debian-12"));
        want.server_type = Some("cx22".into());
        let intents = plan(None, &want, &web1()).unwrap();
        assert_eq!(intents.len(), 1);
    }

    #[test]
    fn second_pass_is_a_noop() {
        let datacenter = FakeCloud::default_datacenter();
        let mut currents = vec![None, Some(running("web1")), Some(off("old"))];
        let mut with_iso = running("web1");
        with_iso.iso = Some(iso(7));
        with_iso.rescue_enabled = true;
        currents.push(Some(with_iso));

        let mut templates = Vec::new();
        for state in [
            DesiredState::Present,
            DesiredState::Running,
            DesiredState::Stopped,
            DesiredState::Absent,
        ] {
            for image_id in [1, 2] {
                for (iso_wanted, rescue) in [
                    (None, None),
                    (Some(iso(8)), None),
                    (None, Some(RescueType::Linux32)),
                    (Some(iso(7)), Some(RescueType::Freebsd64)),
                ] {
                    let mut want = desired(state);
                    want.image = Some(image(image_id, "debian-12"));
                    want.server_type = Some("cx22".into());
                    want.datacenter = Some(datacenter.clone());
                    want.iso = iso_wanted;
                    want.rescue = rescue;
                    templates.push(want);
                }
            }
        }

        for current in &currents {
            for want in &templates {
                let first = plan(current.as_ref(), want, &web1()).unwrap();
                let after = simulate(current.as_ref(), &first);
                let second = plan(after.as_ref(), want, &web1()).unwrap();
                assert!(
                    second.is_empty(),
                    "not idempotent for {current:?} / {want:?}: {first:?} then {second:?}"
                );
            }
        }
    }

    #[test]
    fn power_intents_are_classified() {
        assert!(Intent::Reset.is_power_change());
        assert!(!Intent::DisableRescue.is_power_change());
    }
}
