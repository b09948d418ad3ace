//! Built-in Node Types
//!
//! - [`BasicNode`]: a plain container with no static plugs. Dynamic plugs
//!   and child nodes can be added freely.
//! - [`ScriptNode`]: the type of every graph's root.
//! - [`AddNode`]: sums two integer inputs. The reference computing node,
//!   used throughout the tests and benchmarks.

use std::sync::Arc;

use smallvec::smallvec;

use crate::compute::Context;
use crate::error::{GraphError, Result};
use crate::graph::{AffectedPlugs, NodeType, NodeView, PlugId, PlugSpec, TypeTag};
use crate::value::{Value, ValueType};

#[derive(Debug, Default, Clone, Copy)]
pub struct BasicNode;

impl NodeType for BasicNode {
    fn type_tag(&self) -> TypeTag {
        TypeTag::node()
    }

    fn base_type(&self) -> Option<TypeTag> {
        None
    }
}

/// The root of a graph.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptNode;

impl NodeType for ScriptNode {
    fn type_tag(&self) -> TypeTag {
        TypeTag::new("ScriptNode")
    }
}

/// `sum = op1 + op2`, wrapping on overflow.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddNode;

impl NodeType for AddNode {
    fn type_tag(&self) -> TypeTag {
        TypeTag::new("AddNode")
    }

    fn base_type(&self) -> Option<TypeTag> {
        Some(TypeTag::new("ComputeNode"))
    }

    fn plugs(&self) -> Vec<PlugSpec> {
        vec![
            PlugSpec::input("op1", ValueType::Int),
            PlugSpec::input("op2", ValueType::Int),
            PlugSpec::output("sum", ValueType::Int),
        ]
    }

    fn affects(&self, node: NodeView<'_>, input: PlugId) -> AffectedPlugs {
        let is_operand = ["op1", "op2"]
            .iter()
            .any(|name| node.plug(name) == Some(input));
        match node.plug("sum") {
            Some(sum) if is_operand => smallvec![sum],
            _ => AffectedPlugs::new(),
        }
    }

    fn is_computed(&self, node: NodeView<'_>, plug: PlugId) -> bool {
        node.plug("sum") == Some(plug)
    }

    fn compute(&self, node: NodeView<'_>, output: PlugId, context: &Context) -> Result<Value> {
        let operand = |name: &str| -> Result<i64> {
            let value = node.value(name, context)?;
            value.as_int().ok_or_else(|| GraphError::Compute {
                plug: node.graph().plug_path(output),
                message: format!("\"{name}\" is not an integer"),
            })
        };
        Ok(Value::Int(operand("op1")?.wrapping_add(operand("op2")?)))
    }
}

/// The types every graph can construct by tag.
pub fn builtins() -> Vec<Arc<dyn NodeType>> {
    vec![Arc::new(BasicNode), Arc::new(ScriptNode), Arc::new(AddNode)]
}
