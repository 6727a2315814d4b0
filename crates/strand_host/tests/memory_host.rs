//! Integration tests for the in-memory host

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use strand_core::{AttributeSpec, Host, HostError, Interpolation, Key, NodeKind, Value};
use strand_host::MemoryHost;

#[test]
fn test_dag_paths_and_lookup() {
    let host = MemoryHost::new();
    let root = host.create_node("transform", Some("root"), None).unwrap();
    let arm = host.create_node("joint", Some("arm"), Some(root)).unwrap();

    assert_eq!(host.node_path(arm).unwrap(), "|root|arm");
    assert_eq!(host.lookup("arm").unwrap(), arm);
    assert_eq!(host.lookup("root|arm").unwrap(), arm);
    assert_eq!(host.lookup("|root|arm").unwrap(), arm);
    assert!(matches!(host.lookup("|arm"), Err(HostError::NotFound(_))));
    assert_eq!(host.children(root).unwrap(), vec![arm]);
    assert_eq!(host.node_kind(arm).unwrap(), NodeKind::Dag);
}

#[test]
fn test_parenting_rules() {
    let host = MemoryHost::new();
    let a = host.create_node("transform", None, None).unwrap();
    let b = host.create_node("transform", None, Some(a)).unwrap();
    let net = host.create_node("network", None, None).unwrap();

    assert!(host.reparent_node(a, Some(b)).is_err());
    assert!(host.create_node("transform", None, Some(net)).is_err());
    host.reparent_node(b, None).unwrap();
    assert_eq!(host.parent(b).unwrap(), None);
    assert!(host.children(a).unwrap().is_empty());
}

#[test]
fn test_destroy_callback_sees_live_node() {
    let host = Arc::new(MemoryHost::new());
    let node = host.create_node("transform", Some("doomed"), None).unwrap();
    let child = host.create_node("transform", None, Some(node)).unwrap();

    let saw_valid = Arc::new(AtomicBool::new(false));
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let host_ref = Arc::downgrade(&host);
        let saw_valid = saw_valid.clone();
        let fired = fired.clone();
        host.subscribe_destroyed(node, Box::new(move |h| {
            if let Some(host) = host_ref.upgrade() {
                saw_valid.store(host.is_valid(h), Ordering::SeqCst);
            }
            fired.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }
    {
        let fired = fired.clone();
        host.subscribe_destroyed(child, Box::new(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    host.delete_node(node).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert!(saw_valid.load(Ordering::SeqCst));
    assert!(!host.is_valid(node));
    assert!(!host.is_valid(child));
    assert_eq!(host.subscription_count(), 0);
}

#[test]
fn test_hash_reused_after_delete() {
    let host = MemoryHost::new();
    let a = host.create_node("network", None, None).unwrap();
    let hash = host.hash_code(a).unwrap();
    host.delete_node(a).unwrap();

    let b = host.create_node("network", None, None).unwrap();
    assert_ne!(a, b);
    assert_eq!(host.hash_code(b).unwrap(), hash);
    assert!(host.hash_code(a).is_err());
}

#[test]
fn test_locked_node_cannot_be_deleted() {
    let host = MemoryHost::new();
    let node = host.create_node("network", None, None).unwrap();
    host.set_node_locked(node, true).unwrap();
    assert!(matches!(host.delete_node(node), Err(HostError::Locked(_))));
    assert!(matches!(host.rename_node(node, "other"), Err(HostError::Locked(_))));
    host.set_node_locked(node, false).unwrap();
    host.delete_node(node).unwrap();
}

#[test]
fn test_snapshot_restore_round_trip() {
    let host = MemoryHost::new();
    let src = host.create_node("transform", Some("src"), None).unwrap();
    let dst = host.create_node("transform", Some("dst"), None).unwrap();
    let set = host.create_node("objectSet", None, None).unwrap();
    host.add_attribute(dst, &AttributeSpec::double("weight")).unwrap();
    host.write_plug(&host.find_plug(dst, "weight").unwrap(), &Value::from(0.5)).unwrap();
    host.write_plug(&host.find_plug(src, "tx").unwrap(), &Value::from(4.0)).unwrap();
    host.connect(&host.find_plug(src, "tx").unwrap(), &host.find_plug(dst, "ty").unwrap()).unwrap();
    host.add_set_member(set, dst).unwrap();

    let snapshot = host.delete_node(dst).unwrap();
    assert!(host.set_members(set).unwrap().is_empty());
    assert!(host.connections(src).unwrap().is_empty());

    let restored = host.restore_node(&snapshot, &HashMap::new()).unwrap();
    let (old, new) = restored[0];
    assert_eq!(old, dst);
    assert_ne!(new, dst);
    assert_eq!(host.node_name(new).unwrap(), "dst");

    let weight = host.read_plug(&host.find_plug(new, "weight").unwrap(), None).unwrap();
    assert_eq!(weight, Value::Float(0.5));
    let ty = host.read_plug(&host.find_plug(new, "ty").unwrap(), None).unwrap();
    assert_eq!(ty, Value::Float(4.0));
    assert_eq!(host.set_members(set).unwrap(), vec![new]);
}

#[test]
fn test_anim_curve_drives_plug() {
    let host = MemoryHost::new();
    let node = host.create_node("transform", None, None).unwrap();
    let curve = host.create_node("animCurveTL", None, None).unwrap();
    for (time, value) in [(0.0, 0.0), (1.0, 10.0)] {
        host.set_key(curve, Key { time, value, interpolation: Interpolation::Linear }).unwrap();
    }
    host.connect(
        &host.find_plug(curve, "output").unwrap(),
        &host.find_plug(node, "translateX").unwrap(),
    )
    .unwrap();

    let tx = host.find_plug(node, "tx").unwrap();
    assert_eq!(host.read_plug(&tx, Some(0.5)).unwrap(), Value::Float(5.0));
    host.set_current_time(1.0);
    assert_eq!(host.read_plug(&tx, None).unwrap(), Value::Float(10.0));
}

#[test]
fn test_computed_outputs() {
    let host = MemoryHost::new();
    let mult = host.create_node("multDoubleLinear", None, None).unwrap();
    host.write_plug(&host.find_plug(mult, "i1").unwrap(), &Value::from(3.0)).unwrap();
    host.write_plug(&host.find_plug(mult, "i2").unwrap(), &Value::from(4.0)).unwrap();
    let output = host.find_plug(mult, "output").unwrap();
    assert_eq!(host.read_plug(&output, None).unwrap(), Value::Float(12.0));
    assert!(host.write_plug(&output, &Value::from(1.0)).is_err());
    assert!(!host.plug_info(&output).unwrap().writable);
}

#[test]
fn test_array_indices() {
    let host = MemoryHost::new();
    let node = host.create_node("network", None, None).unwrap();
    host.add_attribute(node, &AttributeSpec::double("values").array()).unwrap();
    let values = host.find_plug(node, "values").unwrap();
    assert!(host.plug_info(&values).unwrap().is_array);
    assert!(host.existing_indices(&values).unwrap().is_empty());

    host.write_plug(&values.element(3), &Value::from(1.0)).unwrap();
    host.write_plug(&values.element(1), &Value::from(2.0)).unwrap();
    assert_eq!(host.existing_indices(&values).unwrap(), vec![1, 3]);
    assert_eq!(
        host.read_plug(&values, None).unwrap(),
        Value::Array(vec![Value::Float(2.0), Value::Float(1.0)])
    );
}

#[test]
fn test_connection_rules() {
    let host = MemoryHost::new();
    let a = host.create_node("transform", None, None).unwrap();
    let b = host.create_node("transform", None, None).unwrap();
    let c = host.create_node("transform", None, None).unwrap();
    let dst = host.find_plug(c, "tx").unwrap();

    host.connect(&host.find_plug(a, "tx").unwrap(), &dst).unwrap();
    assert!(matches!(
        host.connect(&host.find_plug(b, "tx").unwrap(), &dst),
        Err(HostError::Connection(_))
    ));
    assert!(matches!(
        host.disconnect(&host.find_plug(b, "tx").unwrap(), &dst),
        Err(HostError::Connection(_))
    ));
    assert_eq!(host.connected_to(&dst, true, false).unwrap().len(), 1);
    assert!(host.connected_to(&dst, false, true).unwrap().is_empty());
}

#[test]
fn test_undo_redo_runs_closures() {
    let host = MemoryHost::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let (up, down) = (counter.clone(), counter.clone());
    counter.fetch_add(1, Ordering::SeqCst);
    host.register_undo(
        "increment",
        Box::new(move || {
            down.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }),
        Box::new(move || {
            up.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    assert_eq!(host.undo_description().as_deref(), Some("increment"));
    assert!(host.undo().unwrap());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(host.redo().unwrap());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(host.undo().unwrap());
    assert!(!host.undo().unwrap());
}

#[test]
fn test_new_scene_destroys_everything() {
    let host = MemoryHost::new();
    let fired = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let node = host.create_node("network", None, None).unwrap();
        let fired = fired.clone();
        host.subscribe_destroyed(node, Box::new(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }
    host.register_undo("noop", Box::new(|| Ok(())), Box::new(|| Ok(())));

    host.new_scene();
    assert_eq!(fired.load(Ordering::SeqCst), 3);
    assert_eq!(host.node_count(), 0);
    assert!(!host.can_undo());
}
