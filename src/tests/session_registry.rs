use crate::sim::SimBackend;
use crate::{BridgeError, GroupId, PortDirection, Session, SessionConfig};

fn open_with(config: SessionConfig) -> Session<SimBackend> {
    Session::open(SimBackend::new(44_100, 128), config).unwrap()
}

#[test]
fn group_ids_start_at_zero_and_increase() {
    let mut session = open_with(SessionConfig::default());
    let (_a, first) = session.add_group("a", 1, 1).unwrap();
    let (_b, second) = session.add_group("b", 2, 0).unwrap();
    let (_c, third) = session.add_group("c", 0, 2).unwrap();
    assert_eq!(first.get(), 0);
    assert_eq!(second.get(), 1);
    assert_eq!(third.get(), 2);
    assert_eq!(
        session.groups().map(|g| g.name().to_string()).collect::<Vec<_>>(),
        ["a", "b", "c"]
    );
}

#[test]
fn first_group_activates_the_client() {
    let mut session = open_with(SessionConfig::default());
    assert!(!session.is_active());
    session.add_midi("keys").unwrap();
    assert!(!session.is_active());
    session.add_group("g", 1, 1).unwrap();
    assert!(session.is_active());
    assert_eq!(session.sample_rate(), 44_100);
    assert_eq!(session.buffer_size(), 128);
}

#[test]
fn ports_are_registered_with_group_names() {
    let mut session = open_with(SessionConfig::default());
    let (_rx, id) = session.add_group("deck", 2, 1).unwrap();
    let group = session.group(id).unwrap();
    let names: Vec<&str> = group.ports().iter().map(|p| p.name()).collect();
    assert_eq!(names, ["deck-in-1", "deck-in-2", "deck-out-1"]);
    assert_eq!(group.port_count(PortDirection::Input), 2);
    assert_eq!(group.port_count(PortDirection::Output), 1);

    let engine_ports = session.backend().engine().port_names();
    for name in names {
        assert!(engine_ports.iter().any(|p| p == name));
    }
}

#[test]
fn read_on_empty_group_is_silence() {
    let mut session = open_with(SessionConfig::default());
    let (_rx, id) = session.add_group("quiet", 3, 0).unwrap();
    assert_eq!(session.read(id).unwrap(), vec![0.0, 0.0, 0.0]);
    assert_eq!(session.group(id).unwrap().counters().silent_reads, 3);

    let mut out = [9.0f32; 5];
    assert_eq!(session.read_into(id, &mut out).unwrap(), 3);
    assert_eq!(out, [0.0, 0.0, 0.0, 9.0, 9.0]);
}

#[test]
fn write_pads_missing_values_and_ignores_extras() {
    let mut session = open_with(SessionConfig::default());
    let (_rx, id) = session.add_group("w", 0, 3).unwrap();
    assert_eq!(session.write(id, &[0.5]).unwrap(), 3);
    assert_eq!(session.write(id, &[0.1, 0.2, 0.3, 0.4, 0.5]).unwrap(), 3);
    let ports = session.group(id).unwrap().ports();
    assert!(ports.iter().all(|p| p.read_space() == 8));
}

#[test]
fn write_to_full_ring_drops_samples() {
    let config = SessionConfig {
        ring_capacity: 16,
        ..SessionConfig::default()
    };
    let mut session = open_with(config);
    let (_rx, id) = session.add_group("tiny", 0, 1).unwrap();
    for _ in 0..4 {
        assert_eq!(session.write(id, &[1.0]).unwrap(), 1);
    }
    assert_eq!(session.write(id, &[1.0]).unwrap(), 0);
    assert_eq!(session.output_room(id).unwrap(), 0);
    assert_eq!(session.group(id).unwrap().counters().dropped_writes, 1);
}

#[test]
fn unknown_group_is_reported() {
    let mut session = open_with(SessionConfig::default());
    let ghost = GroupId::from(7);
    assert!(matches!(
        session.write(ghost, &[0.0]),
        Err(BridgeError::UnknownGroup(id)) if id == ghost
    ));
    assert!(matches!(session.read(ghost), Err(BridgeError::UnknownGroup(_))));
    assert!(session.pending_input(ghost).is_err());
    assert!(session.group(ghost).is_none());
}

#[test]
fn limits_are_enforced() {
    let config = SessionConfig {
        max_groups: 2,
        max_midi: 1,
        ..SessionConfig::default()
    };
    let mut session = open_with(config);
    session.add_group("a", 1, 0).unwrap();
    session.add_group("b", 1, 0).unwrap();
    assert!(matches!(
        session.add_group("c", 1, 0),
        Err(BridgeError::GroupLimit(2))
    ));
    session.add_midi("m").unwrap();
    assert!(matches!(session.add_midi("n"), Err(BridgeError::MidiLimit(1))));
}

#[test]
fn failed_registration_does_not_consume_an_id() {
    let mut session = open_with(SessionConfig::default());
    let (_rx, first) = session.add_group("dup", 1, 0).unwrap();
    assert!(matches!(
        session.add_group("dup", 1, 0),
        Err(BridgeError::DuplicatePort(_))
    ));
    let (_rx, next) = session.add_group("fresh", 1, 0).unwrap();
    assert_eq!(next.get(), first.get() + 1);
}

#[test]
fn invalid_config_is_rejected_at_open() {
    let config = SessionConfig {
        ring_capacity: 10,
        ..SessionConfig::default()
    };
    assert!(matches!(
        Session::open(SimBackend::default(), config),
        Err(BridgeError::InvalidConfig(_))
    ));
}

#[test]
fn status_reports_every_group() {
    let mut session = open_with(SessionConfig::default());
    session.add_group("a", 1, 2).unwrap();
    session.add_midi("keys").unwrap();
    let status = session.status();
    assert!(status.active);
    assert_eq!(status.groups.len(), 1);
    assert_eq!(status.groups[0].ports.len(), 3);
    assert_eq!(status.midi[0].port_name, "keys-in");
    assert!((status.latency_ms - 128.0 / 44.1).abs() < 1e-3);
}

#[test]
fn failed_group_releases_ports_already_registered() {
    let mut session = open_with(SessionConfig::default());
    let engine = session.backend().engine();
    engine.add_external_port("x-out-1").unwrap();

    assert!(matches!(
        session.add_group("x", 2, 1),
        Err(BridgeError::DuplicatePort(name)) if name == "x-out-1"
    ));
    assert!(!engine.port_names().iter().any(|name| name.starts_with("x-in-")));
    assert_eq!(session.groups().count(), 0);

    let (_rx, id) = session.add_group("x", 2, 0).unwrap();
    assert_eq!(id.get(), 0);
}

#[test]
fn stopped_process_step_rejects_groups_without_leaking() {
    let mut session = open_with(SessionConfig::default());
    let engine = session.backend().engine();
    let (_rx, first) = session.add_group("a", 1, 1).unwrap();
    engine.shutdown();

    assert!(matches!(
        session.add_group("b", 1, 1),
        Err(BridgeError::ProcessStopped)
    ));
    assert!(!engine.port_names().iter().any(|name| name.starts_with("b-")));
    assert_eq!(session.groups().map(|g| g.id()).collect::<Vec<_>>(), [first]);

    assert!(matches!(
        session.add_midi("keys"),
        Err(BridgeError::ProcessStopped)
    ));
    assert!(!engine.port_names().iter().any(|name| name == "keys-in"));
}
