//! Integration Tests for Metadata
//!
//! Each test builds its graph around a private registry so registrations
//! never leak between tests.

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;

use trellis_core::graph::{Graph, NodeId, NodeType, PlugSpec, TypeTag};
use trellis_core::metadata::{
    Lookup, Metadata, NodeRegistration, NodeValueChanged, PlugValueChanged, Subject,
};
use trellis_core::nodes::{AddNode, BasicNode};
use trellis_core::value::{Value, ValueType};

struct TypeA;

impl NodeType for TypeA {
    fn type_tag(&self) -> TypeTag {
        TypeTag::new("TypeA")
    }

    fn plugs(&self) -> Vec<PlugSpec> {
        vec![PlugSpec::input("in", ValueType::Int)]
    }
}

fn graph_with(metadata: &Arc<Metadata>) -> Graph {
    Graph::builder()
        .metadata(metadata.clone())
        .node_type(Arc::new(TypeA))
        .build()
}

fn add_node(graph: &mut Graph, name: &str) -> NodeId {
    let root = graph.root();
    graph.add_node(root, name, Arc::new(AddNode)).unwrap()
}

/// Register a type value, override per instance, clear the override.
#[test]
fn instance_value_overrides_and_reverts() {
    let metadata = Arc::new(Metadata::new());
    let mut graph = graph_with(&metadata);
    metadata.register_node_value("TypeA", "k", "a");
    let root = graph.root();
    let n = graph.create_node(root, "n", &TypeTag::new("TypeA")).unwrap();

    assert_eq!(graph.node_metadata(n, "k").unwrap(), Some(Value::from("a")));

    graph.register_node_metadata(n, "k", Some("b".into()), false).unwrap();
    assert_eq!(graph.node_metadata(n, "k").unwrap(), Some(Value::from("b")));

    graph.register_node_metadata(n, "k", None, false).unwrap();
    assert_eq!(graph.node_metadata(n, "k").unwrap(), Some(Value::from("a")));
}

/// Instance > derived > base > none.
#[test]
fn lookup_order() {
    let metadata = Arc::new(Metadata::new());
    let mut graph = graph_with(&metadata);
    let add = add_node(&mut graph, "add");
    let plain = graph.create_node(graph.root(), "plain", &TypeTag::node()).unwrap();

    assert_eq!(graph.node_metadata(add, "k").unwrap(), None);

    metadata.register_node_value("Node", "k", "base");
    assert_eq!(graph.node_metadata(add, "k").unwrap(), Some(Value::from("base")));

    metadata.register_node_value("AddNode", "k", "derived");
    assert_eq!(graph.node_metadata(add, "k").unwrap(), Some(Value::from("derived")));
    assert_eq!(graph.node_metadata(plain, "k").unwrap(), Some(Value::from("base")));

    graph.register_node_metadata(add, "k", Some("instance".into()), true).unwrap();
    assert_eq!(graph.node_metadata(add, "k").unwrap(), Some(Value::from("instance")));
    assert_eq!(graph.node_metadata(plain, "k").unwrap(), Some(Value::from("base")));
}

/// Lookups can skip inheritance or type-level values.
#[test]
fn lookup_options() {
    let metadata = Arc::new(Metadata::new());
    let mut graph = graph_with(&metadata);
    let add = add_node(&mut graph, "add");
    metadata.register_node_value("ComputeNode", "k", 1);

    let view = graph.node_view(add).unwrap();
    assert_eq!(metadata.node_value_with(view, "k", Lookup::default()), Some(Value::Int(1)));
    assert_eq!(metadata.node_value_with(view, "k", Lookup::without_inheritance()), None);
    assert_eq!(metadata.node_value_with(view, "k", Lookup::instance_only()), None);
}

/// Key enumeration: base, derived, then instance keys, each in
/// registration order; re-registration keeps the original position.
#[test]
fn registered_keys_in_order() {
    let metadata = Arc::new(Metadata::new());
    let mut graph = graph_with(&metadata);
    let add = add_node(&mut graph, "add");

    metadata.register_node_value("AddNode", "d1", 1);
    metadata.register_node_value("Node", "b1", 1);
    metadata.register_node_value("AddNode", "d2", 1);
    metadata.register_node_value("Node", "b2", 1);
    metadata.register_node_value("AddNode", "d1", 2);
    graph.register_node_metadata(add, "i1", Some(1.into()), false).unwrap();
    graph.register_node_metadata(add, "i2", Some(1.into()), true).unwrap();

    assert_eq!(
        graph.node_metadata_keys(add, Lookup::default()).unwrap(),
        ["b1", "b2", "d1", "d2", "i1", "i2"]
    );
    assert_eq!(graph.node_metadata_keys(add, Lookup::persistent_only()).unwrap(), ["i2"]);
    assert_eq!(graph.node_metadata(add, "d1").unwrap(), Some(Value::Int(2)));
}

#[rstest]
#[case("op1", Some("operand"))]
#[case("op2", Some("operand"))]
#[case("sum", Some("result"))]
fn plug_values_match_patterns(#[case] plug: &str, #[case] expected: Option<&str>) {
    let metadata = Arc::new(Metadata::new());
    let mut graph = graph_with(&metadata);
    let add = add_node(&mut graph, "add");
    metadata.register_plug_value("AddNode", "op[12]", "role", "operand");
    metadata.register_plug_value("Node", "*", "role", "result");

    let plug = graph.plug_of(add, plug).unwrap();
    assert_eq!(graph.plug_metadata(plug, "role").unwrap(), expected.map(Value::from));
}

/// Resolvers see the node being queried.
#[test]
fn resolvers_receive_the_node() {
    let metadata = Arc::new(Metadata::new());
    let mut graph = graph_with(&metadata);
    let add = add_node(&mut graph, "adder");
    metadata.register_node_resolver("AddNode", "label", |node| Some(Value::from(node.full_path())));
    metadata.register_plug_resolver("AddNode", "*", "label", |plug| Some(Value::from(plug.relative_path())));

    assert_eq!(graph.node_metadata(add, "label").unwrap(), Some(Value::from("adder")));
    let sum = graph.plug("adder.sum").unwrap();
    assert_eq!(graph.plug_metadata(sum, "label").unwrap(), Some(Value::from("sum")));
}

/// Bulk registration cleans docstring-style text.
#[test]
fn bulk_registration_cleans_text() {
    let metadata = Arc::new(Metadata::new());
    let mut graph = graph_with(&metadata);
    let add = add_node(&mut graph, "add");
    metadata.register_node(
        NodeRegistration::new("AddNode")
            .description(
                "
                Adds two numbers.

                  The result is wrapped on overflow.
                ",
            )
            .plug_description("op1", "First operand."),
    );

    let view = graph.node_view(add).unwrap();
    assert_eq!(
        metadata.node_description(view),
        "Adds two numbers.\n\n  The result is wrapped on overflow."
    );
    let op1 = graph.plug_view(graph.plug("add.op1").unwrap()).unwrap();
    assert_eq!(metadata.plug_description(op1), "First operand.");
    let op2 = graph.plug_view(graph.plug("add.op2").unwrap()).unwrap();
    assert_eq!(metadata.plug_description(op2), "");
}

/// Type and instance changes are announced; repeats are not.
#[test]
fn changes_are_announced_once() {
    let metadata = Arc::new(Metadata::new());
    let mut graph = graph_with(&metadata);
    let add = add_node(&mut graph, "add");
    let op1 = graph.plug("add.op1").unwrap();

    let nodes = Arc::new(Mutex::new(Vec::new()));
    let sink = nodes.clone();
    metadata
        .node_value_changed
        .observe(move |e: &NodeValueChanged| sink.lock().push(e.clone()));
    let plugs = Arc::new(Mutex::new(Vec::new()));
    let sink = plugs.clone();
    metadata
        .plug_value_changed
        .observe(move |e: &PlugValueChanged| sink.lock().push(e.clone()));

    metadata.register_node_value("AddNode", "k", 1);
    graph.register_node_metadata(add, "k", Some(2.into()), false).unwrap();
    graph.register_node_metadata(add, "k", Some(2.into()), false).unwrap();
    graph.register_node_metadata(add, "k", Some(2.into()), true).unwrap();
    graph.register_plug_metadata(op1, "k", Some(3.into()), false).unwrap();

    let nodes = nodes.lock();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0].node, None);
    assert_eq!(nodes[1].node, Some(add));
    assert_eq!(nodes[1].node_type, TypeTag::new("AddNode"));

    let plugs = plugs.lock();
    assert_eq!(plugs.len(), 1);
    assert_eq!(plugs[0].plug_path, "op1");
    assert_eq!(plugs[0].plug, Some(op1));
}

/// A broken listener on the registry is isolated and logged.
#[test]
fn failing_metadata_listener_is_isolated() {
    let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let metadata = Arc::new(Metadata::new());
    let count = Arc::new(Mutex::new(0));
    metadata
        .node_value_changed
        .observe(|_: &NodeValueChanged| panic!("broken listener"));
    let sink = count.clone();
    metadata
        .node_value_changed
        .observe(move |_: &NodeValueChanged| *sink.lock() += 1);

    metadata.register_node_value("AddNode", "a", 1);
    metadata.register_node_value("AddNode", "b", 2);

    assert_eq!(*count.lock(), 2);
    assert_eq!(metadata.type_node_value(&"AddNode".into(), "b"), Some(Value::Int(2)));
}

/// Instance metadata goes with a removed node and comes back with undo.
#[test]
fn instance_metadata_follows_node_lifetime() {
    let metadata = Arc::new(Metadata::new());
    let mut graph = graph_with(&metadata);
    let add = add_node(&mut graph, "add");
    graph.register_node_metadata(add, "note", Some("keep".into()), true).unwrap();

    {
        let mut scope = graph.undo_scope("Delete");
        scope.remove_node(add).unwrap();
    }
    assert!(metadata.instance_keys(Subject::Node(add), false).is_empty());

    graph.undo().unwrap();
    assert_eq!(graph.node_metadata(add, "note").unwrap(), Some(Value::from("keep")));
}

/// Metadata on plain nodes works without any type registrations.
#[test]
fn plain_nodes_accept_instance_values() {
    let metadata = Arc::new(Metadata::new());
    let mut graph = graph_with(&metadata);
    let root = graph.root();
    let node = graph.add_node(root, "box", Arc::new(BasicNode)).unwrap();
    graph.register_node_metadata(node, "colour", Some("red".into()), false).unwrap();
    assert_eq!(
        graph.node_metadata_keys(node, Lookup::instance_only()).unwrap(),
        ["colour"]
    );
}
