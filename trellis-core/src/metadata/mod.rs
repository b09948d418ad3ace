//! Metadata
//!
//! A registry of descriptive values for node types, plug paths and
//! individual nodes and plugs, with change notifications. See
//! [`Metadata`] for the lookup rules.

mod pattern;
mod registry;
mod types;

pub use pattern::MatchPattern;
pub use registry::{
    cleandoc, InstanceValue, Lookup, Metadata, NodeRegistration, NodeResolver, NodeValueChanged,
    PlugResolver, PlugValueChanged, Subject, DESCRIPTION,
};
pub use types::TypeHierarchy;
