use jackmux::sim::{SYSTEM_PORTS, SimBackend};
use jackmux::{BridgeError, Session, SessionConfig};

fn session() -> Session<SimBackend> {
    Session::open(SimBackend::default(), SessionConfig::new("router")).unwrap()
}

#[test]
fn connect_and_disconnect_pass_through_to_engine() {
    let mut session = session();
    session.add_group("synth", 0, 2).unwrap();
    let engine = session.backend().engine();

    session.connect("synth-out-1", SYSTEM_PORTS[2]).unwrap();
    session.connect("synth-out-2", SYSTEM_PORTS[3]).unwrap();
    assert_eq!(engine.connections().len(), 2);

    session.disconnect("synth-out-1", SYSTEM_PORTS[2]).unwrap();
    assert_eq!(
        engine.connections(),
        vec![("synth-out-2".to_string(), SYSTEM_PORTS[3].to_string())]
    );
}

#[test]
fn routing_errors_name_the_failure() {
    let mut session = session();
    session.add_group("synth", 0, 1).unwrap();

    let err = session.connect("synth-out-9", SYSTEM_PORTS[2]).unwrap_err();
    assert!(matches!(&err, BridgeError::UnknownPort(name) if name == "synth-out-9"));

    session.connect("synth-out-1", SYSTEM_PORTS[2]).unwrap();
    let err = session.connect("synth-out-1", SYSTEM_PORTS[2]).unwrap_err();
    assert!(err.to_string().contains("already connected"));

    let err = session.disconnect("synth-out-1", SYSTEM_PORTS[3]).unwrap_err();
    assert!(matches!(err, BridgeError::RoutingRejected { .. }));
}

#[test]
fn routing_leaves_groups_untouched() {
    let mut session = session();
    let (_rx, id) = session.add_group("fx", 1, 1).unwrap();
    let before = session.group(id).unwrap().status();

    session.connect(SYSTEM_PORTS[0], "fx-in-1").unwrap();
    session.connect("fx-out-1", SYSTEM_PORTS[2]).unwrap();

    let after = session.group(id).unwrap().status();
    assert_eq!(before.counters, after.counters);
    assert_eq!(before.ports.len(), after.ports.len());
    assert_eq!(session.write(id, &[0.5]).unwrap(), 1);
}

#[test]
fn external_ports_can_be_added() {
    let session = session();
    let engine = session.backend().engine();
    engine.add_external_port("reverb:in_1").unwrap();
    assert!(matches!(
        engine.add_external_port("reverb:in_1"),
        Err(BridgeError::DuplicatePort(_))
    ));
    session.connect(SYSTEM_PORTS[0], "reverb:in_1").unwrap();
}
