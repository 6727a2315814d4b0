//! Wrapper identity, hashing and destruction tracking

use std::sync::Arc;

use strand::{Config, Error, Session, MIN_HOST_VERSION};
use strand_core::Host;
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

#[test]
fn test_same_handle_same_instance() {
    let (_host, session) = setup();
    let node = session.create_node("transform", Some("a")).unwrap();

    let again = session.encode("a").unwrap();
    let wrapped = session.wrap(node.handle()).unwrap();

    assert!(node.same_instance(&again));
    assert!(node.same_instance(&wrapped));
    assert_eq!(node, again);
    assert!(session.stats().node_reuse >= 2);
}

#[test]
fn test_hash_round_trip() {
    let (_host, session) = setup();
    let node = session.create_node("network", Some("data")).unwrap();

    let by_hash = session.from_hash(node.hash()).unwrap();
    assert!(by_hash.same_instance(&node));

    let by_hex = session.from_hex(&node.hex()).unwrap();
    assert!(by_hex.same_instance(&node));
    assert_eq!(session.to_hash(node.handle()).unwrap(), node.hash());
    assert_eq!(session.as_hash(node.handle()).unwrap(), node.hash());
    assert!(session.from_hex("not hex").is_none());
}

#[test]
fn test_deleted_node_goes_dead() {
    let (_host, session) = setup();
    let node = session.create_node("transform", Some("doomed")).unwrap();
    let hash = node.hash();

    node.delete().unwrap();

    assert!(!node.exists());
    assert!(node.destroyed());
    assert!(matches!(node.name(), Err(Error::Existence { .. })));
    assert!(matches!(node.attribute("tx"), Err(Error::Existence { .. })));
    assert!(session.from_hash(hash).is_none());
    assert!(matches!(session.encode("doomed"), Err(Error::Existence { .. })));
}

#[test]
fn test_host_deletion_is_observed() {
    let (host, session) = setup();
    let root = session.create_dag("transform", Some("root"), None).unwrap();
    let child = session.create_dag("transform", Some("child"), Some(&root)).unwrap();
    let plug = child.attribute("tx").unwrap();

    host.delete_node(root.handle()).unwrap();

    assert!(!root.exists());
    assert!(!child.exists());
    assert!(matches!(plug.read(), Err(Error::Existence { .. })));
    assert!(session.from_hash(child.hash()).is_none());
    assert_eq!(session.path_cache_len(), 0);
}

#[test]
fn test_dead_wrapper_keeps_last_path() {
    let (host, session) = setup();
    let node = session.create_node("transform", Some("gone")).unwrap();
    host.delete_node(node.handle()).unwrap();

    match node.path() {
        Err(Error::Existence { path }) => assert_eq!(path, "|gone"),
        other => panic!("expected existence error, got {:?}", other),
    }
    assert_eq!(node.to_string(), "|gone (dead)");
}

#[test]
fn test_recycled_hash_gets_new_wrapper() {
    let (host, session) = setup();
    let first = session.create_node("network", None).unwrap();
    host.delete_node(first.handle()).unwrap();

    let handle = host.create_node("network", None, None).unwrap();
    let second = session.wrap(handle).unwrap();

    assert_eq!(second.hash(), first.hash());
    assert!(!second.same_instance(&first));
    assert!(first.destroyed());
    assert!(second.exists());
    assert!(session.from_hash(second.hash()).unwrap().same_instance(&second));
}

#[test]
fn test_new_scene_kills_every_wrapper() {
    let (host, session) = setup();
    let a = session.create_node("transform", None).unwrap();
    let b = session.create_node("network", None).unwrap();

    host.new_scene();

    assert!(a.destroyed());
    assert!(b.destroyed());
    assert_eq!(session.identity_len(), 0);
    assert_eq!(host.subscription_count(), 0);
}

#[test]
fn test_dropped_wrapper_releases_subscription() {
    let (host, session) = setup();
    let handle = {
        let node = session.create_node("network", Some("temp")).unwrap();
        assert_eq!(host.subscription_count(), 1);
        node.handle()
    };

    assert_eq!(host.subscription_count(), 0);
    let hash = session.as_hash(handle).unwrap();
    assert!(session.from_hash(hash).is_none());
    assert!(session.wrap(handle).unwrap().exists());
}

#[test]
fn test_clear_forgets_wrappers() {
    let (_host, session) = setup();
    let node = session.create_node("transform", Some("kept")).unwrap();
    node.attribute("tx").unwrap();
    assert!(session.path_cache_len() > 0);

    session.clear();

    assert_eq!(session.identity_len(), 0);
    assert_eq!(session.path_cache_len(), 0);
    assert_eq!(node.name().unwrap(), "kept");
    let fresh = session.encode("kept").unwrap();
    assert!(!fresh.same_instance(&node));
    assert_eq!(fresh, node);
}

#[test]
fn test_node_reuse_disabled() {
    let (_host, session) = setup_with(Config {
        node_reuse: false,
        ..Config::default()
    });
    let node = session.create_node("transform", Some("a")).unwrap();
    let again = session.encode("a").unwrap();

    assert!(!node.same_instance(&again));
    assert_eq!(node, again);
    assert_eq!(session.identity_len(), 0);
    assert_eq!(session.stats().node_reuse, 0);
}

#[test]
fn test_safe_mode_disables_reuse() {
    let (_host, session) = setup_with(Config {
        safe_mode: true,
        ..Config::default()
    });
    assert!(!session.config().node_reuse);
    assert!(!session.config().plug_reuse);

    let node = session.create_node("transform", Some("a")).unwrap();
    node.attribute("tx").unwrap();
    node.attribute("tx").unwrap();

    assert!(!session.encode("a").unwrap().same_instance(&node));
    assert_eq!(session.path_cache_len(), 0);
    assert_eq!(session.stats().plug_reuse, 0);
}

#[test]
fn test_rogue_mode_skips_subscriptions() {
    let (host, session) = setup_with(Config {
        rogue_mode: true,
        ..Config::default()
    });
    let node = session.create_node("transform", Some("a")).unwrap();
    assert_eq!(host.subscription_count(), 0);

    node.delete().unwrap();
    assert!(!node.exists());
}

#[test]
fn test_unsupported_host_version() {
    let old = Arc::new(MemoryHost::with_version(MIN_HOST_VERSION - 1));
    match Session::with_config(old.clone(), Config::default()) {
        Err(Error::UnsupportedHost { version, minimum }) => {
            assert_eq!(version, MIN_HOST_VERSION - 1);
            assert_eq!(minimum, MIN_HOST_VERSION);
        }
        other => panic!("expected unsupported host, got {:?}", other),
    }

    let forced = Session::with_config(
        old,
        Config {
            ignore_version: true,
            ..Config::default()
        },
    );
    assert!(forced.is_ok());
}

#[test]
fn test_ls_and_type_filter() {
    let (_host, session) = setup();
    let a = session.create_node("transform", Some("a")).unwrap();
    let b = session.create_node("joint", Some("b")).unwrap();
    let c = session.create_node("joint", Some("c")).unwrap();

    let joints: Vec<_> = session.ls(Some("joint")).collect();
    assert_eq!(joints.len(), 2);
    assert!(joints.contains(&b) && joints.contains(&c));
    assert!(!joints.contains(&a));
    assert_eq!(session.ls(None).count(), 3);
    assert!(b.is_a("joint").unwrap());
}

#[test]
fn test_names_and_paths() {
    let (_host, session) = setup();
    let root = session.create_dag("transform", Some("root"), None).unwrap();
    let arm = session.create_dag("joint", Some("arm"), Some(&root)).unwrap();
    let tagged = session.create_node("network", Some("rig:data")).unwrap();

    assert_eq!(arm.path().unwrap(), "|root|arm");
    assert_eq!(arm.name().unwrap(), "arm");
    assert_eq!(tagged.namespace().unwrap(), "rig");
    assert_eq!(arm.namespace().unwrap(), "");

    let short = arm.shortest_path().unwrap();
    assert!(session.encode(&short).unwrap().same_instance(&arm));
    assert!(matches!(session.encode("|nowhere"), Err(Error::Existence { .. })));
}

#[test]
fn test_node_locking() {
    let (_host, session) = setup();
    let node = session.create_node("transform", Some("a")).unwrap();

    node.lock(true).unwrap();
    assert!(node.is_locked().unwrap());
    assert!(matches!(node.delete(), Err(Error::Locked { .. })));
    assert!(node.exists());

    node.lock(false).unwrap();
    node.delete().unwrap();
    assert!(!node.exists());
}
