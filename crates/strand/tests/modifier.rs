//! Batched mutations, rollback and undo

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use strand::{
    AttributeSpec, Config, Error, Interpolation, ModifierOptions, ModifierState, Session, Value,
};
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
fn test_failed_batch_leaves_no_trace() {
    let (host, session) = setup();

    let result = session.transaction(|m| {
        let a = m.create_node("transform", Some("A"))?;
        let b = m.create_node("transform", Some("B"))?;
        m.connect(&a.attribute("tx")?, &b.attribute("tx")?, false)?;
        m.set_attr(&b.attribute("tx")?, "not a number")
    });

    match result {
        Err(Error::Modifier(failure)) => {
            assert!(failure.rolled_back);
            assert_eq!(failure.history.len(), 4);
            assert!(failure.history[0].starts_with("create_node"));
            let message = failure.to_string();
            assert!(message.contains("these tasks were attempted"));
            assert!(message.contains("- connect("));
        }
        other => panic!("expected a modifier error, got {:?}", other),
    }
    assert!(session.encode("A").is_err());
    assert!(session.encode("B").is_err());
    assert_eq!(host.node_count(), 0);
    assert_eq!(host.undo_count(), 0);
}

#[test]
fn test_nested_batches_are_independent() {
    let (host, session) = setup();

    // An outer rollback leaves work committed by an inner batch alone
    let result = session.transaction(|m| {
        let outer = m.create_node("transform", Some("outer"))?;
        session.create_node("transform", Some("inner"))?;
        m.set_attr(&outer.attribute("tx")?, "not a number")
    });
    assert!(matches!(result, Err(Error::Modifier(_))));
    assert!(session.encode("outer").is_err());
    assert!(session.encode("inner").unwrap().exists());
    assert_eq!(host.undo_count(), 1);

    // A failed inner batch leaves the outer batch's work in place
    let kept = session
        .transaction(|m| {
            let kept = m.create_node("transform", Some("kept"))?;
            let failed = session.transaction(|inner| {
                let doomed = inner.create_node("transform", Some("doomed"))?;
                inner.set_attr(&doomed.attribute("tx")?, "not a number")
            });
            assert!(failed.is_err());
            m.set_attr(&kept.attribute("tx")?, 2.0)?;
            Ok(kept)
        })
        .unwrap();
    assert!(kept.exists());
    assert_eq!(kept.get("tx").unwrap(), Value::Float(2.0));
    assert!(session.encode("doomed").is_err());
    assert_eq!(host.undo_count(), 2);
}

#[test]
fn test_forwarding_stays_bounded() {
    let (host, session) = setup();
    session
        .transaction(|m| {
            let node = m.create_node("transform", Some("A"))?;
            m.set_attr(&node.attribute("tx")?, 4.0)
        })
        .unwrap();
    assert_eq!(session.forwarding_len(), 0);

    for _ in 0..10 {
        assert!(host.undo().unwrap());
        assert!(host.redo().unwrap());
    }
    assert_eq!(session.forwarding_len(), 1);
    assert_eq!(session.encode("A").unwrap().get("tx").unwrap(), Value::Float(4.0));

    // Flushing history releases everything the batch recorded
    host.new_scene();
    assert_eq!(session.forwarding_len(), 0);
}

#[test]
fn test_committed_batch_is_one_undo_step() {
    let (host, session) = setup();

    let node = session
        .transaction(|m| {
            let node = m.create_node("transform", Some("A"))?;
            m.set_attr(&node.attribute("tx")?, 4.0)?;
            m.add_attr(&node, AttributeSpec::double("weight"))?;
            Ok(node)
        })
        .unwrap();
    assert_eq!(host.undo_count(), 1);
    assert_eq!(node.get("tx").unwrap(), Value::Float(4.0));

    assert!(host.undo().unwrap());
    assert!(!node.exists());
    assert!(session.encode("A").is_err());

    assert!(host.redo().unwrap());
    let again = session.encode("A").unwrap();
    assert_eq!(again.get("tx").unwrap(), Value::Float(4.0));
    assert!(again.has_attr("weight"));

    // Replays keep resolving the re-created node
    assert!(host.undo().unwrap());
    assert!(!again.exists());
    assert!(host.redo().unwrap());
    assert!(session.encode("A").unwrap().has_attr("weight"));
}

#[test]
fn test_undo_attribute_edits() {
    let (host, session) = setup();
    let node = session.create_node("transform", Some("a")).unwrap();

    session
        .transaction(|m| {
            m.set_attr(&node.attribute("tx")?, 2.0)?;
            m.set_attr(&node.attribute("tx")?, 3.0)
        })
        .unwrap();
    assert_eq!(node.get("tx").unwrap(), Value::Float(3.0));

    host.undo().unwrap();
    assert_eq!(node.get("tx").unwrap(), Value::Float(0.0));
    host.redo().unwrap();
    assert_eq!(node.get("tx").unwrap(), Value::Float(3.0));
}

#[test]
fn test_undo_delete_restores_node() {
    let (host, session) = setup();
    let a = session.create_node("transform", Some("a")).unwrap();
    let b = session.create_node("transform", Some("b")).unwrap();
    a.attribute("tx").unwrap().connect(&b.attribute("tx").unwrap(), false).unwrap();
    b.set("sx", 2.0).unwrap();

    b.delete().unwrap();
    assert!(!b.exists());
    assert!(session.encode("b").is_err());

    host.undo().unwrap();
    let restored = session.encode("b").unwrap();
    assert!(restored.exists());
    assert!(!b.exists());
    assert!(!restored.same_instance(&b));
    assert_eq!(restored.get("sx").unwrap(), Value::Float(2.0));
    let source = restored.attribute("tx").unwrap().source().unwrap().unwrap();
    assert_eq!(source.node(), &a);

    host.redo().unwrap();
    assert!(!restored.exists());
    assert!(session.encode("b").is_err());
}

#[test]
fn test_undo_delete_of_hierarchy() {
    let (host, session) = setup();
    let root = session.create_dag("transform", Some("root"), None).unwrap();
    session.create_dag("joint", Some("arm"), Some(&root)).unwrap();

    root.delete().unwrap();
    assert!(session.encode("arm").is_err());

    host.undo().unwrap();
    let arm = session.encode("arm").unwrap().as_dag().unwrap();
    assert_eq!(arm.path().unwrap(), "|root|arm");
}

#[test]
fn test_naming_template() {
    let (_host, session) = setup();

    let mut m = session.modifier_with(ModifierOptions::default().with_template("rig_{type}"));
    let node = m.create_node("transform", None).unwrap();
    m.commit().unwrap();
    assert_eq!(node.name().unwrap(), "rig_transform");

    let mut m = session.modifier_with(ModifierOptions::default().with_template("{name}_{index}"));
    let first = m.create_node("joint", Some("arm")).unwrap();
    let second = m.create_node("joint", Some("arm")).unwrap();
    m.commit().unwrap();
    assert_eq!(first.name().unwrap(), "arm_1");
    assert_eq!(second.name().unwrap(), "arm_2");

    // An explicit name wins over a template without {name}
    let mut m = session.modifier_with(ModifierOptions::default().with_template("rig_{type}"));
    let named = m.create_node("network", Some("custom")).unwrap();
    m.commit().unwrap();
    assert_eq!(named.name().unwrap(), "custom");
}

#[test]
fn test_non_atomic_batch_keeps_applied_work() {
    let (host, session) = setup();

    let result = session.transaction_with(ModifierOptions::default().atomic(false), |m| {
        let a = m.create_node("transform", Some("a"))?;
        m.create_node("noSuchType", None)?;
        m.set_attr(&a.attribute("tx")?, 1.0)
    });

    match result {
        Err(Error::Modifier(failure)) => assert!(!failure.rolled_back),
        other => panic!("expected a modifier error, got {:?}", other),
    }
    assert!(session.encode("a").is_ok());
    assert_eq!(host.undo_count(), 1);
    host.undo().unwrap();
    assert!(session.encode("a").is_err());
}

#[test]
fn test_closed_modifier_refuses_work() {
    let (_host, session) = setup();
    let mut m = session.modifier();

    assert!(m.create_node("noSuchType", None).is_err());
    assert_eq!(m.state(), ModifierState::RolledBack);
    assert!(matches!(
        m.create_node("network", None),
        Err(Error::ModifierClosed(ModifierState::RolledBack))
    ));
    assert!(matches!(m.commit(), Err(Error::ModifierClosed(_))));
}

#[test]
fn test_dropped_modifier_reverts() {
    let (host, session) = setup();
    {
        let mut m = session.modifier();
        m.create_node("network", Some("temp")).unwrap();
        assert_eq!(m.len(), 1);
        assert!(session.encode("temp").is_ok());
    }
    assert!(session.encode("temp").is_err());
    assert_eq!(host.undo_count(), 0);

    let mut m = session.modifier();
    m.create_node("network", Some("abandoned")).unwrap();
    m.abandon();
    assert!(session.encode("abandoned").is_err());
}

#[test]
fn test_not_undoable_batch() {
    let (host, session) = setup();
    session
        .transaction_with(ModifierOptions::default().undoable(false), |m| {
            m.create_node("network", None)
        })
        .unwrap();
    assert_eq!(host.undo_count(), 0);
    assert_eq!(host.node_count(), 1);
}

#[test]
fn test_undo_disabled_by_config() {
    let (host, session) = setup_with(Config {
        undo: false,
        ..Config::default()
    });
    session.create_node("network", None).unwrap();
    assert!(!session.undo().enabled());
    assert_eq!(host.undo_count(), 0);
}

#[test]
fn test_single_operations_surface_raw_errors() {
    let (_host, session) = setup();
    assert!(matches!(
        session.create_node("noSuchType", None),
        Err(Error::Host(_))
    ));

    let node = session.create_node("network", Some("data")).unwrap();
    node.add_attr(AttributeSpec::double("weight")).unwrap();
    assert!(matches!(
        node.add_attr(AttributeSpec::double("weight")),
        Err(Error::Duplicate { .. })
    ));
}

#[test]
fn test_rename_and_undo() {
    let (host, session) = setup();
    let node = session.create_node("transform", Some("a")).unwrap();

    assert_eq!(node.rename("b").unwrap(), "b");
    assert!(session.encode("b").unwrap().same_instance(&node));

    host.undo().unwrap();
    assert_eq!(node.name().unwrap(), "a");
}

#[test]
fn test_reparent_and_undo() {
    let (host, session) = setup();
    let root = session.create_dag("transform", Some("root"), None).unwrap();
    let arm = session.create_dag("transform", Some("arm"), None).unwrap();

    root.add_child(&arm).unwrap();
    assert_eq!(arm.parent(None).unwrap(), Some(root.clone()));

    host.undo().unwrap();
    assert_eq!(arm.parent(None).unwrap(), None);
    assert_eq!(arm.path().unwrap(), "|arm");
}

#[test]
fn test_delete_attribute_and_undo() {
    let (host, session) = setup();
    let a = session.create_node("network", Some("a")).unwrap();
    let b = session.create_node("transform", Some("b")).unwrap();
    let weight = a.add_attr(AttributeSpec::double("weight")).unwrap();
    weight.write(0.25).unwrap();
    weight.connect(&b.attribute("sx").unwrap(), false).unwrap();

    a.remove_attr("weight").unwrap();
    assert!(!a.has_attr("weight"));
    assert!(!b.attribute("sx").unwrap().connected().unwrap());

    host.undo().unwrap();
    assert_eq!(a.get("weight").unwrap(), Value::Float(0.25));
    assert_eq!(b.get("sx").unwrap(), Value::Float(0.25));
}

#[test]
fn test_force_connect_undo_restores_previous_source() {
    let (host, session) = setup();
    let a = session.create_node("transform", Some("a")).unwrap();
    let b = session.create_node("transform", Some("b")).unwrap();
    let c = session.create_node("transform", Some("c")).unwrap();
    let b_tx = b.attribute("tx").unwrap();

    a.attribute("tx").unwrap().connect(&b_tx, false).unwrap();
    c.attribute("tx").unwrap().connect(&b_tx, true).unwrap();
    assert_eq!(b_tx.source().unwrap().unwrap().node(), &c);

    host.undo().unwrap();
    assert_eq!(b_tx.source().unwrap().unwrap().node(), &a);
}

#[test]
fn test_disconnect_undo() {
    let (host, session) = setup();
    let a = session.create_node("transform", Some("a")).unwrap();
    let b = session.create_node("transform", Some("b")).unwrap();
    let a_tx = a.attribute("tx").unwrap();
    a_tx.connect(&b.attribute("tx").unwrap(), false).unwrap();
    a_tx.connect(&b.attribute("ty").unwrap(), false).unwrap();

    assert_eq!(a_tx.disconnect(None, false, true).unwrap(), 2);
    assert!(!a_tx.connected().unwrap());

    host.undo().unwrap();
    assert_eq!(a_tx.connections(false, true).unwrap().count(), 2);
}

#[test]
fn test_set_keys_undo() {
    let (host, session) = setup();
    let curve = session
        .create_node("animCurveTU", None)
        .unwrap()
        .as_anim_curve()
        .unwrap();

    curve.key(0.0, 1.0, Interpolation::Linear).unwrap();
    curve
        .keys(&[0.0, 10.0], &[2.0, 4.0], Interpolation::Linear)
        .unwrap();
    assert_eq!(curve.get_keys().unwrap().len(), 2);
    assert_eq!(curve.evaluate(0.0).unwrap(), 2.0);

    host.undo().unwrap();
    let keys = curve.get_keys().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].value, 1.0);

    assert!(matches!(
        curve.keys(&[0.0], &[1.0, 2.0], Interpolation::Step),
        Err(Error::Type { .. })
    ));
}

#[test]
fn test_undo_bridge_perform() {
    let (host, session) = setup();
    let counter = Arc::new(AtomicI32::new(0));

    let up = counter.clone();
    let down = counter.clone();
    session
        .undo()
        .perform(
            "bump",
            move || {
                up.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            move || {
                down.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(host.undo_description().as_deref(), Some("bump"));

    host.undo().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    host.redo().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_undo_bridge_commit_has_no_redo() {
    let (host, session) = setup();
    let counter = Arc::new(AtomicI32::new(5));

    let undo = counter.clone();
    session.undo().commit("manual", move || {
        undo.store(0, Ordering::SeqCst);
        Ok(())
    });

    host.undo().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(host.redo().unwrap());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_failing_undo_surfaces_error() {
    let (host, session) = setup();
    session.undo().commit("broken", || {
        Err(Error::Connection("nothing to reconnect".to_string()))
    });
    assert!(host.undo().is_err());
}
