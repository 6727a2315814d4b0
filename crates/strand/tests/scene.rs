//! Hierarchy, sets, animation time and session bookkeeping

use std::sync::Arc;

use strand::{Config, Error, Interpolation, Node, NodeKind, Session, Value};
use strand_host::MemoryHost;

fn setup_with(config: Config) -> (Arc<MemoryHost>, Session) {
    let _ = env_logger::builder().is_test(true).try_init();
    let host = Arc::new(MemoryHost::new());
    let session = Session::with_config(host.clone(), config).unwrap();
    (host, session)
}

fn setup() -> (Arc<MemoryHost>, Session) {
    setup_with(Config::default())
}

fn names(nodes: impl Iterator<Item = impl std::ops::Deref<Target = Node>>) -> Vec<String> {
    nodes.map(|n| n.name().unwrap()).collect()
}

#[test]
fn test_hierarchy_navigation() {
    let (_host, session) = setup();
    let root = session.create_dag("transform", Some("root"), None).unwrap();
    let hip = session.create_dag("joint", Some("hip"), Some(&root)).unwrap();
    let knee = session.create_dag("joint", Some("knee"), Some(&hip)).unwrap();
    let mesh = session.create_dag("mesh", Some("body"), Some(&root)).unwrap();
    session.create_dag("transform", Some("other"), None).unwrap();

    assert_eq!(knee.parent(None).unwrap(), Some(hip.clone()));
    assert_eq!(knee.parent(Some("transform")).unwrap(), None);
    assert_eq!(root.parent(None).unwrap(), None);

    assert_eq!(names(root.children(None).unwrap()), vec!["hip", "body"]);
    assert_eq!(names(root.children(Some("mesh")).unwrap()), vec!["body"]);
    assert_eq!(root.child(Some("joint")).unwrap(), Some(hip.clone()));
    assert_eq!(names(root.descendents(None).unwrap()), vec!["hip", "knee", "body"]);
    assert_eq!(names(root.descendents(Some("joint")).unwrap()), vec!["hip", "knee"]);

    assert_eq!(names(hip.siblings(None).unwrap()), vec!["body"]);
    assert_eq!(names(root.siblings(None).unwrap()), vec!["other"]);

    assert_eq!(knee.root().unwrap(), root);
    assert_eq!(knee.level().unwrap(), 2);
    assert_eq!(root.level().unwrap(), 0);
    assert_eq!(mesh.kind(), NodeKind::Dag);
}

#[test]
fn test_reparent_to_top() {
    let (_host, session) = setup();
    let root = session.create_dag("transform", Some("root"), None).unwrap();
    let arm = session.create_dag("transform", Some("arm"), Some(&root)).unwrap();

    arm.reparent(None).unwrap();
    assert_eq!(arm.path().unwrap(), "|arm");
    assert!(root.children(None).unwrap().next().is_none());
    assert!(root.reparent(Some(&root)).is_err());
}

#[test]
fn test_visibility() {
    let (_host, session) = setup();
    let node = session.create_dag("transform", Some("a"), None).unwrap();

    assert!(node.is_visible().unwrap());
    node.hide().unwrap();
    assert!(!node.is_visible().unwrap());
    node.show().unwrap();
    assert!(node.is_visible().unwrap());
}

#[test]
fn test_capabilities_follow_kind() {
    let (_host, session) = setup();
    let dag = session.create_node("transform", None).unwrap();
    let set = session.create_node("objectSet", None).unwrap();
    let curve = session.create_node("animCurveTL", None).unwrap();

    assert!(dag.as_dag().is_some() && dag.as_set().is_none());
    assert!(set.as_set().is_some() && set.as_dag().is_none());
    assert!(curve.as_anim_curve().is_some());
    assert!(matches!(
        session.create_dag("network", None, None),
        Err(Error::Type { .. })
    ));
}

#[test]
fn test_set_membership() {
    let (host, session) = setup();
    let set = session.create_node("objectSet", Some("rig")).unwrap().as_set().unwrap();
    let a = session.create_node("transform", Some("a")).unwrap();
    let b = session.create_node("joint", Some("b")).unwrap();

    assert!(set.is_empty().unwrap());
    set.add(&a).unwrap();
    set.update([&a, &b]).unwrap();
    assert_eq!(set.len().unwrap(), 2);
    assert!(set.contains(&b).unwrap());
    assert_eq!(set.member(Some("joint")).unwrap(), Some(b.clone()));

    set.remove(&a).unwrap();
    assert!(!set.contains(&a).unwrap());
    assert!(matches!(set.remove(&a), Err(Error::NotFound { .. })));

    host.undo().unwrap();
    assert!(set.contains(&a).unwrap());

    set.clear().unwrap();
    assert!(set.is_empty().unwrap());
    host.undo().unwrap();
    assert_eq!(set.len().unwrap(), 2);
}

#[test]
fn test_undo_of_add_keeps_existing_membership() {
    let (host, session) = setup();
    let set = session.create_node("objectSet", None).unwrap().as_set().unwrap();
    let a = session.create_node("transform", None).unwrap();

    set.add(&a).unwrap();
    set.add(&a).unwrap();
    host.undo().unwrap();
    assert!(set.contains(&a).unwrap());
    host.undo().unwrap();
    assert!(!set.contains(&a).unwrap());
}

#[test]
fn test_flatten_nested_sets() {
    let (_host, session) = setup();
    let outer = session.create_node("objectSet", Some("outer")).unwrap().as_set().unwrap();
    let inner = session.create_node("objectSet", Some("inner")).unwrap().as_set().unwrap();
    let a = session.create_node("transform", Some("a")).unwrap();
    let b = session.create_node("joint", Some("b")).unwrap();
    let c = session.create_node("joint", Some("c")).unwrap();

    outer.update([&a, inner.as_node()]).unwrap();
    inner.update([&b, &c, &a]).unwrap();
    inner.add(outer.as_node()).unwrap();

    let flat = outer.flatten(None).unwrap();
    assert_eq!(flat.len(), 3);
    for node in [&a, &b, &c] {
        assert!(flat.contains(node));
    }
    assert_eq!(outer.flatten(Some("joint")).unwrap().len(), 2);
}

#[test]
fn test_deleted_members_are_skipped() {
    let (_host, session) = setup();
    let set = session.create_node("objectSet", None).unwrap().as_set().unwrap();
    let a = session.create_node("transform", None).unwrap();
    let b = session.create_node("transform", None).unwrap();
    set.update([&a, &b]).unwrap();

    let members = set.members(None).unwrap();
    b.delete().unwrap();
    assert_eq!(members.collect::<Vec<_>>(), vec![a.clone()]);
}

#[test]
fn test_time_context_restores_time() {
    let (_host, session) = setup();
    let node = session.create_node("transform", Some("a")).unwrap();
    node.attribute("tx")
        .unwrap()
        .write_keys([(0.0, 0.0), (10.0, 10.0)], Interpolation::Linear)
        .unwrap();

    assert_eq!(session.current_time(), 0.0);
    {
        let context = session.at_time(4.0);
        assert_eq!(context.time(), 4.0);
        assert_eq!(context.previous(), 0.0);
        assert_eq!(session.current_time(), 4.0);
        assert!(node.get("tx").unwrap().approx_eq(&Value::Float(4.0)));
    }
    assert_eq!(session.current_time(), 0.0);

    let value = session.with_time(8.0, || node.get("tx").unwrap());
    assert!(value.approx_eq(&Value::Float(8.0)));
    assert_eq!(session.current_time(), 0.0);
}

#[test]
fn test_time_context_restores_on_panic() {
    let (_host, session) = setup();
    let inner = session.clone();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        inner.with_time(3.0, || panic!("evaluation failed"))
    }));
    assert!(outcome.is_err());
    assert_eq!(session.current_time(), 0.0);
}

#[test]
fn test_curve_interpolation() {
    let (_host, session) = setup();
    let curve = session
        .create_node("animCurveTU", None)
        .unwrap()
        .as_anim_curve()
        .unwrap();
    curve
        .keys(&[0.0, 10.0], &[0.0, 10.0], Interpolation::Step)
        .unwrap();

    assert_eq!(curve.evaluate(5.0).unwrap(), 0.0);
    assert_eq!(curve.evaluate(10.0).unwrap(), 10.0);
    assert_eq!(curve.evaluate(20.0).unwrap(), 10.0);
}

#[test]
fn test_stats_count_wrappers() {
    let (_host, session) = setup();
    let node = session.create_node("transform", Some("a")).unwrap();
    assert_eq!(session.stats().node_init, 1);

    session.encode("a").unwrap();
    session.wrap(node.handle()).unwrap();
    let stats = session.stats();
    assert_eq!(stats.node_init, 1);
    assert_eq!(stats.node_reuse, 2);

    session.reset_stats();
    assert_eq!(session.stats().node_reuse, 0);
}

#[test]
fn test_timings_do_not_change_results() {
    let (_host, session) = setup_with(Config {
        timings: true,
        ..Config::default()
    });
    let node = session.create_node("transform", Some("a")).unwrap();
    node.set("tx", 2.0).unwrap();
    assert_eq!(node.get("tx").unwrap(), Value::Float(2.0));
}

#[test]
fn test_session_from_environment() {
    let host = Arc::new(MemoryHost::new());
    let session = Session::new(host).unwrap();
    assert!(session.ls(None).next().is_none());
}
