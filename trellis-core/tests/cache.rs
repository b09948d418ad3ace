//! Integration Tests for the Value Cache

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use smallvec::smallvec;

use trellis_core::compute::{Context, PlugHasher, ValueCache};
use trellis_core::config::EngineConfig;
use trellis_core::error::Result;
use trellis_core::graph::{AffectedPlugs, Graph, NodeType, NodeView, PlugId, PlugSpec, TypeTag};
use trellis_core::value::{Value, ValueType};

/// `out = in * 2`, counting how often it computes.
struct Doubler {
    computes: Arc<AtomicUsize>,
}

impl NodeType for Doubler {
    fn type_tag(&self) -> TypeTag {
        TypeTag::new("Doubler")
    }

    fn base_type(&self) -> Option<TypeTag> {
        Some(TypeTag::new("ComputeNode"))
    }

    fn plugs(&self) -> Vec<PlugSpec> {
        vec![
            PlugSpec::input("in", ValueType::Int),
            PlugSpec::output("out", ValueType::Int),
        ]
    }

    fn affects(&self, node: NodeView<'_>, input: PlugId) -> AffectedPlugs {
        match (node.plug("in"), node.plug("out")) {
            (Some(i), Some(out)) if i == input => smallvec![out],
            _ => AffectedPlugs::new(),
        }
    }

    fn is_computed(&self, node: NodeView<'_>, plug: PlugId) -> bool {
        node.plug("out") == Some(plug)
    }

    fn compute(&self, node: NodeView<'_>, _output: PlugId, context: &Context) -> Result<Value> {
        self.computes.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        let input = node.value("in", context)?;
        Ok(Value::Int(input.as_int().unwrap_or(0) * 2))
    }
}

fn doubler_graph(cache: Arc<ValueCache>, computes: Arc<AtomicUsize>, input: i64) -> Graph {
    let mut graph = Graph::builder().cache(cache).build();
    let root = graph.root();
    graph
        .add_node(root, "double", Arc::new(Doubler { computes }))
        .unwrap();
    graph.set_value(graph.plug("double.in").unwrap(), input).unwrap();
    graph
}

/// Concurrent requests for one hash compute once and share the result.
#[test]
fn singleflight_computes_once() {
    let cache = Arc::new(ValueCache::default());
    let computes = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));
    let mut hasher = PlugHasher::new();
    hasher.append_str("shared");
    let hash = hasher.finish();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let computes = computes.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get_or_compute(hash, || {
                        computes.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok(Value::from("expensive"))
                    })
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(computes.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|v| Arc::ptr_eq(v, &results[0])));
}

/// Threads reading the same output of one graph share one computation.
#[test]
fn concurrent_graph_reads_compute_once() {
    let computes = Arc::new(AtomicUsize::new(0));
    let graph = Arc::new(doubler_graph(Arc::new(ValueCache::default()), computes.clone(), 21));
    let out = graph.plug("double.out").unwrap();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let graph = graph.clone();
            thread::spawn(move || graph.get_value(out).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(*handle.join().unwrap(), Value::Int(42));
    }
    assert_eq!(computes.load(Ordering::SeqCst), 1);
}

/// Graphs sharing a cache share results for equal hashes.
#[test]
fn shared_cache_across_graphs() {
    let cache = Arc::new(ValueCache::default());
    let computes = Arc::new(AtomicUsize::new(0));
    let first = doubler_graph(cache.clone(), computes.clone(), 5);
    let second = doubler_graph(cache.clone(), computes.clone(), 5);

    let a = first.get_value(first.plug("double.out").unwrap()).unwrap();
    let b = second.get_value(second.plug("double.out").unwrap()).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(computes.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().hits, 1);
}

/// Eviction only costs a recomputation.
#[test]
fn evicted_values_are_recomputed() {
    let computes = Arc::new(AtomicUsize::new(0));
    let config = EngineConfig::default().with_cache_memory_limit(0);
    let cache = Arc::new(ValueCache::new(config.cache_memory_limit));
    let mut graph = Graph::builder().config(config).cache(cache.clone()).build();
    let root = graph.root();
    graph
        .add_node(root, "double", Arc::new(Doubler { computes: computes.clone() }))
        .unwrap();
    graph.set_value(graph.plug("double.in").unwrap(), 4).unwrap();
    let out = graph.plug("double.out").unwrap();

    assert_eq!(*graph.get_value(out).unwrap(), Value::Int(8));
    assert_eq!(*graph.get_value(out).unwrap(), Value::Int(8));
    assert_eq!(computes.load(Ordering::SeqCst), 2);
    assert!(cache.stats().evictions >= 2);
}

/// Changing an input yields a new hash and a fresh computation.
#[test]
fn dirtied_output_recomputes() {
    let computes = Arc::new(AtomicUsize::new(0));
    let mut graph = doubler_graph(Arc::new(ValueCache::default()), computes.clone(), 1);
    let input = graph.plug("double.in").unwrap();
    let out = graph.plug("double.out").unwrap();

    assert_eq!(*graph.get_value(out).unwrap(), Value::Int(2));
    graph.set_value(input, 10).unwrap();
    assert_eq!(*graph.get_value(out).unwrap(), Value::Int(20));
    graph.set_value(input, 1).unwrap();
    assert_eq!(*graph.get_value(out).unwrap(), Value::Int(2));
    assert_eq!(computes.load(Ordering::SeqCst), 2);
}
