//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis node framework.
//! It implements:
//!
//! - A tree of nodes with typed plugs and input connections
//! - Dirty propagation over the static `affects()` structure
//! - Content hashing and a shared, memory-bounded value cache
//! - A metadata registry with type inheritance and change notifications
//! - Transactional undo and redo
//! - Script serialisation in JSON and MessagePack
//!
//! The crate is designed to be used both as a native Rust library and, with
//! the `python` feature, as a Python extension module via PyO3.
//!
//! # Architecture
//!
//! - `graph`: nodes, plugs, connections, edits and dirty propagation
//! - `compute`: hashing, contexts, the value cache and evaluation
//! - `metadata`: the metadata registry
//! - `undo`: transactions and the undo stack
//! - `script`: serialisation
//! - `nodes`: built-in node types
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_core::graph::Graph;
//! use trellis_core::nodes::AddNode;
//! use trellis_core::value::Value;
//!
//! let mut graph = Graph::new();
//! let root = graph.root();
//! graph.add_node(root, "a", Arc::new(AddNode))?;
//! graph.add_node(root, "b", Arc::new(AddNode))?;
//!
//! graph.set_value(graph.plug("a.op1")?, 2)?;
//! graph.set_input(graph.plug("b.op1")?, Some(graph.plug("a.sum")?))?;
//!
//! assert_eq!(*graph.get_value(graph.plug("b.sum")?)?, Value::Int(2));
//! # Ok::<(), trellis_core::error::GraphError>(())
//! ```

pub mod compute;
pub mod config;
pub mod error;
pub mod graph;
pub mod metadata;
pub mod nodes;
pub mod script;
pub mod signal;
pub mod undo;
pub mod value;

#[cfg(feature = "python")]
mod bindings;

pub use error::{GraphError, Result};
