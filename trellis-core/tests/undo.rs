//! Integration Tests for Undo and Redo

use std::sync::Arc;

use pretty_assertions::assert_eq;

use trellis_core::config::EngineConfig;
use trellis_core::error::GraphError;
use parking_lot::Mutex;

use trellis_core::graph::{DirtyEvent, Graph, PlugEvent, PlugFlags, PlugSpec};
use trellis_core::metadata::{Lookup, Metadata, NodeValueChanged, PlugValueChanged};
use trellis_core::nodes::{AddNode, BasicNode};
use trellis_core::value::{Value, ValueType};

fn private_graph() -> Graph {
    Graph::builder().metadata(Arc::new(Metadata::new())).build()
}

/// Undo after N registrations restores N-1; redo restores N; both are
/// no-ops beyond the ends of the stack.
#[test]
fn undo_redo_n_registrations() {
    let mut graph = private_graph();
    let root = graph.root();
    let node = graph.add_node(root, "n", Arc::new(BasicNode)).unwrap();

    for i in 0..5 {
        let mut scope = graph.undo_scope(&format!("Register {i}"));
        scope
            .register_node_metadata(node, &format!("key{i}"), Some(Value::Int(i)), i % 2 == 0)
            .unwrap();
    }
    let keys = |g: &Graph| g.node_metadata_keys(node, Lookup::instance_only()).unwrap().len();
    assert_eq!(keys(&graph), 5);

    assert!(graph.undo().unwrap());
    assert_eq!(keys(&graph), 4);
    assert!(graph.redo().unwrap());
    assert_eq!(keys(&graph), 5);
    assert!(!graph.redo().unwrap());

    for expected in (0..5).rev() {
        assert!(graph.undo().unwrap());
        assert_eq!(keys(&graph), expected);
    }
    assert!(!graph.undo().unwrap());
    assert!(!graph.undo().unwrap());
    assert_eq!(keys(&graph), 0);
}

/// Overwriting an instance value and undoing restores the old value.
#[test]
fn undo_restores_overwritten_metadata() {
    let mut graph = private_graph();
    let root = graph.root();
    let node = graph.add_node(root, "n", Arc::new(BasicNode)).unwrap();
    graph.register_node_metadata(node, "k", Some("a".into()), false).unwrap();

    {
        let mut scope = graph.undo_scope("Overwrite");
        scope.register_node_metadata(node, "k", Some("b".into()), false).unwrap();
    }
    graph.undo().unwrap();
    assert_eq!(graph.node_metadata(node, "k").unwrap(), Some(Value::from("a")));
}

/// Structure edits undo and redo with stable identities.
#[test]
fn structure_round_trips() {
    let mut graph = private_graph();
    let root = graph.root();

    let added = {
        let mut scope = graph.undo_scope("Add");
        let add = scope.add_node(root, "add", Arc::new(AddNode)).unwrap();
        let extra = scope.add_plug(add.into(), PlugSpec::input("extra", ValueType::Float)).unwrap();
        scope.set_value(extra, 2.5).unwrap();
        add
    };
    let plugs = graph.plug_count();

    graph.undo().unwrap();
    assert!(graph.node("add").is_err());
    assert_eq!(graph.plug_count(), 0);

    graph.redo().unwrap();
    assert_eq!(graph.node("add").unwrap(), added);
    assert_eq!(graph.plug_count(), plugs);
    assert_eq!(*graph.get_value(graph.plug("add.extra").unwrap()).unwrap(), Value::Float(2.5));
}

/// Nested scopes merge into one transaction named by the outermost.
#[test]
fn nested_scopes_merge() {
    let mut graph = private_graph();
    let root = graph.root();
    graph.add_node(root, "add", Arc::new(AddNode)).unwrap();
    let op1 = graph.plug("add.op1").unwrap();
    let op2 = graph.plug("add.op2").unwrap();

    graph.begin_transaction("Outer");
    graph.set_value(op1, 1).unwrap();
    graph.begin_transaction("Inner");
    graph.set_value(op2, 2).unwrap();
    assert_eq!(graph.end_transaction(), None);
    assert_eq!(graph.end_transaction(), Some("Outer".to_owned()));

    assert_eq!(graph.history_stats().undo_count, 1);
    graph.undo().unwrap();
    assert_eq!(*graph.get_value(op1).unwrap(), Value::Int(0));
    assert_eq!(*graph.get_value(op2).unwrap(), Value::Int(0));
}

/// A new transaction clears redo; empty transactions are discarded.
#[test]
fn new_work_clears_redo() {
    let mut graph = private_graph();
    let root = graph.root();
    graph.add_node(root, "add", Arc::new(AddNode)).unwrap();
    let op1 = graph.plug("add.op1").unwrap();

    {
        let mut scope = graph.undo_scope("First");
        scope.set_value(op1, 1).unwrap();
    }
    graph.undo().unwrap();
    assert!(graph.can_redo());

    drop(graph.undo_scope("Nothing"));
    assert!(graph.can_redo());

    {
        let mut scope = graph.undo_scope("Second");
        scope.set_value(op1, 2).unwrap();
    }
    assert!(!graph.can_redo());
    assert_eq!(graph.undo_name(), Some("Second"));
}

/// The stack keeps at most `undo_depth` transactions.
#[test]
fn depth_is_bounded() {
    let mut graph = Graph::builder()
        .config(EngineConfig::default().with_undo_depth(2))
        .metadata(Arc::new(Metadata::new()))
        .build();
    let root = graph.root();
    graph.add_node(root, "add", Arc::new(AddNode)).unwrap();
    let op1 = graph.plug("add.op1").unwrap();

    for i in 1..=3 {
        let mut scope = graph.undo_scope(&format!("Set {i}"));
        scope.set_value(op1, i).unwrap();
    }
    assert_eq!(graph.history_stats().undo_count, 2);
    graph.undo().unwrap();
    graph.undo().unwrap();
    assert!(!graph.undo().unwrap());
    assert_eq!(*graph.get_value(op1).unwrap(), Value::Int(1));
}

/// A replay that cannot complete is rolled back and reported.
#[test]
fn failed_undo_rolls_back() {
    let mut graph = private_graph();
    let root = graph.root();
    let a = graph.add_node(root, "a", Arc::new(AddNode)).unwrap();
    graph.add_node(root, "b", Arc::new(AddNode)).unwrap();
    let b_op1 = graph.plug("b.op1").unwrap();

    {
        let mut scope = graph.undo_scope("Edit");
        scope.remove_node(a).unwrap();
        scope.set_value(b_op1, 5).unwrap();
    }

    // Unrecorded edit that takes the removed node's name.
    graph.add_node(root, "a", Arc::new(BasicNode)).unwrap();

    let err = graph.undo().unwrap_err();
    assert!(matches!(err, GraphError::Undo { operation: "undo", .. }), "{err}");
    assert_eq!(*graph.get_value(b_op1).unwrap(), Value::Int(5));
    assert!(graph.can_undo());
    assert!(!graph.can_redo());
}

/// Locking is an undoable edit.
#[test]
fn flags_undo() {
    let mut graph = private_graph();
    let root = graph.root();
    graph.add_node(root, "add", Arc::new(AddNode)).unwrap();
    let op1 = graph.plug("add.op1").unwrap();

    {
        let mut scope = graph.undo_scope("Lock");
        scope
            .set_flags(op1, PlugFlags::SERIALISABLE | PlugFlags::READ_ONLY)
            .unwrap();
    }
    assert!(graph.set_value(op1, 1).is_err());
    graph.undo().unwrap();
    graph.set_value(op1, 1).unwrap();
}

/// Record every graph and metadata notification as one line each.
fn record_notifications(graph: &Graph) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let signals = graph.signals();
    let l = log.clone();
    signals
        .plug_dirtied
        .observe(move |e: &DirtyEvent| l.lock().push(format!("dirtied {} {:?}", e.path, e.cause)));
    let l = log.clone();
    signals
        .plug_set
        .observe(move |e: &PlugEvent| l.lock().push(format!("set {}", e.path)));
    let l = log.clone();
    signals
        .plug_input_changed
        .observe(move |e: &PlugEvent| l.lock().push(format!("input {}", e.path)));
    let l = log.clone();
    graph.metadata().node_value_changed.observe(move |e: &NodeValueChanged| {
        l.lock().push(format!("node metadata {} {}", e.node_type.as_str(), e.key))
    });
    let l = log.clone();
    graph.metadata().plug_value_changed.observe(move |e: &PlugValueChanged| {
        l.lock().push(format!("plug metadata {} {}", e.plug_path, e.key))
    });
    log
}

/// Undo and redo of a single edit notify exactly what the edit notified.
#[test]
fn undo_and_redo_repeat_notifications() {
    let mut graph = private_graph();
    let root = graph.root();
    let a = graph.add_node(root, "a", Arc::new(AddNode)).unwrap();
    graph.add_node(root, "b", Arc::new(AddNode)).unwrap();
    let op1 = graph.plug("a.op1").unwrap();
    let b_op2 = graph.plug("b.op2").unwrap();
    graph.set_input(b_op2, Some(graph.plug("a.sum").unwrap())).unwrap();
    let log = record_notifications(&graph);

    let edits: Vec<Box<dyn Fn(&mut Graph)>> = vec![
        Box::new(move |g| g.set_value(op1, 7).unwrap()),
        Box::new(move |g| g.set_input(b_op2, None).unwrap()),
        Box::new(move |g| {
            g.register_plug_metadata(op1, "layout", Some("left".into()), true).unwrap()
        }),
        Box::new(move |g| g.register_node_metadata(a, "note", Some("hi".into()), false).unwrap()),
    ];

    for edit in edits {
        {
            let mut scope = graph.undo_scope("Edit");
            edit(&mut *scope);
        }
        let edited = std::mem::take(&mut *log.lock());
        assert!(!edited.is_empty());

        assert!(graph.undo().unwrap());
        let undone = std::mem::take(&mut *log.lock());
        assert_eq!(undone, edited);

        assert!(graph.redo().unwrap());
        let redone = std::mem::take(&mut *log.lock());
        assert_eq!(redone, edited);
    }
}
