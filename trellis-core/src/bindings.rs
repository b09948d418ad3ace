//! The `_core` extension module: a graph handle for scripting hosts.
//!
//! Plugs and nodes are addressed by path from Python; ids never cross the
//! boundary.

use parking_lot::Mutex;
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyBytes, PyFloat, PyList, PyString};

use crate::config::EngineConfig;
use crate::error::GraphError;
use crate::graph::{Graph, TypeTag};
use crate::script::Script;
use crate::value::Value;

fn to_py_err(err: GraphError) -> PyErr {
    match err {
        GraphError::NotFound { .. } | GraphError::UnknownNodeType(_) => PyKeyError::new_err(err.to_string()),
        GraphError::TypeMismatch { .. } => PyTypeError::new_err(err.to_string()),
        GraphError::Compute { .. } | GraphError::Undo { .. } => PyRuntimeError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

fn value_from_py(obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_instance_of::<PyBool>() {
        return Ok(Value::Bool(obj.extract()?));
    }
    if obj.is_instance_of::<PyFloat>() {
        return Ok(Value::Float(obj.extract()?));
    }
    if obj.is_instance_of::<PyString>() {
        return Ok(Value::String(obj.extract()?));
    }
    if let Ok(i) = obj.extract::<i64>() {
        return Ok(Value::Int(i));
    }
    if obj.is_instance_of::<PyList>() {
        if let Ok(v) = obj.extract::<Vec<i64>>() {
            return Ok(Value::IntVector(v));
        }
        if let Ok(v) = obj.extract::<Vec<f64>>() {
            return Ok(Value::FloatVector(v));
        }
        if let Ok(v) = obj.extract::<Vec<String>>() {
            return Ok(Value::StringVector(v));
        }
    }
    Err(PyTypeError::new_err(format!(
        "cannot store a {} in a plug",
        obj.get_type().name()?
    )))
}

fn value_to_py(py: Python<'_>, value: &Value) -> PyObject {
    match value {
        Value::Bool(b) => b.into_py(py),
        Value::Int(i) => i.into_py(py),
        Value::Float(f) => f.into_py(py),
        Value::String(s) => s.into_py(py),
        Value::Color(c) => c.to_vec().into_py(py),
        Value::IntVector(v) => v.clone().into_py(py),
        Value::FloatVector(v) => v.clone().into_py(py),
        Value::StringVector(v) => v.clone().into_py(py),
    }
}

/// Python-exposed graph.
#[pyclass(name = "Graph")]
pub struct PyGraph {
    graph: Mutex<Graph>,
}

#[pymethods]
impl PyGraph {
    /// Create a graph, optionally from a JSON engine configuration.
    #[new]
    #[pyo3(signature = (config = None))]
    fn new(config: Option<&str>) -> PyResult<Self> {
        let config = match config {
            Some(json) => EngineConfig::from_json(json).map_err(to_py_err)?,
            None => EngineConfig::default(),
        };
        Ok(Self {
            graph: Mutex::new(Graph::with_config(config)),
        })
    }

    /// Add a node of a registered type; returns its (possibly renamed) path.
    #[pyo3(signature = (node_type, name, parent = ""))]
    fn add_node(&self, node_type: &str, name: &str, parent: &str) -> PyResult<String> {
        let mut graph = self.graph.lock();
        let parent = graph.node(parent).map_err(to_py_err)?;
        let node = graph
            .create_node(parent, name, &TypeTag::new(node_type))
            .map_err(to_py_err)?;
        Ok(graph.node_path(node))
    }

    fn remove_node(&self, path: &str) -> PyResult<()> {
        let mut graph = self.graph.lock();
        let node = graph.node(path).map_err(to_py_err)?;
        graph.remove_node(node).map_err(to_py_err)
    }

    fn get_value(&self, py: Python<'_>, plug: &str) -> PyResult<PyObject> {
        let graph = self.graph.lock();
        let plug = graph.plug(plug).map_err(to_py_err)?;
        let value = graph.get_value(plug).map_err(to_py_err)?;
        Ok(value_to_py(py, &value))
    }

    fn set_value(&self, plug: &str, value: &Bound<'_, PyAny>) -> PyResult<()> {
        let value = value_from_py(value)?;
        let mut graph = self.graph.lock();
        let plug = graph.plug(plug).map_err(to_py_err)?;
        graph.set_value(plug, value).map_err(to_py_err)
    }

    /// Connect `input` into `plug`, or disconnect when `input` is `None`.
    #[pyo3(signature = (plug, input = None))]
    fn set_input(&self, plug: &str, input: Option<&str>) -> PyResult<()> {
        let mut graph = self.graph.lock();
        let plug = graph.plug(plug).map_err(to_py_err)?;
        let input = input.map(|path| graph.plug(path)).transpose().map_err(to_py_err)?;
        graph.set_input(plug, input).map_err(to_py_err)
    }

    fn hash(&self, plug: &str) -> PyResult<String> {
        let graph = self.graph.lock();
        let plug = graph.plug(plug).map_err(to_py_err)?;
        let hash = graph
            .hash(plug, &crate::compute::Context::default())
            .map_err(to_py_err)?;
        Ok(hash.to_hex())
    }

    fn begin_transaction(&self, name: &str) {
        self.graph.lock().begin_transaction(name);
    }

    fn end_transaction(&self) -> Option<String> {
        self.graph.lock().end_transaction()
    }

    fn undo(&self) -> PyResult<bool> {
        self.graph.lock().undo().map_err(to_py_err)
    }

    fn redo(&self) -> PyResult<bool> {
        self.graph.lock().redo().map_err(to_py_err)
    }

    /// The graph as JSON script text.
    fn serialise(&self) -> PyResult<String> {
        self.graph.lock().serialise().to_text().map_err(to_py_err)
    }

    fn serialise_bytes<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyBytes>> {
        let bytes = self.graph.lock().serialise().to_bytes().map_err(to_py_err)?;
        Ok(PyBytes::new_bound(py, &bytes))
    }

    /// Execute JSON script text under the root.
    fn execute(&self, text: &str) -> PyResult<()> {
        let script = Script::from_text(text).map_err(to_py_err)?;
        self.graph.lock().execute(&script).map_err(to_py_err)
    }

    fn execute_bytes(&self, bytes: &[u8]) -> PyResult<()> {
        let script = Script::from_bytes(bytes).map_err(to_py_err)?;
        self.graph.lock().execute(&script).map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        let graph = self.graph.lock();
        format!("Graph(nodes={}, plugs={})", graph.node_count(), graph.plug_count())
    }
}

/// Python module definition.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyGraph>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
