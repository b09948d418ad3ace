//! Node Graph
//!
//! This module implements the tree of nodes and plugs that everything else
//! operates on.
//!
//! # Overview
//!
//! - Nodes form a tree rooted at a script node. Each node is an instance of a
//!   [`NodeType`] and owns an ordered set of plugs and child nodes.
//! - Plugs are typed slots. A plug may take its value from another plug
//!   through an input connection; connections never form cycles.
//! - Changing a value or a connection dirties every plug that may depend on
//!   it (see [`dirty`](self) for the traversal rules).
//!
//! # Ownership
//!
//! The [`Graph`] stores nodes and plugs in arenas keyed by [`NodeId`] and
//! [`PlugId`]. Parent/child links and connections are ids, never references,
//! so removing a subtree is a matter of unlinking ids and undo can restore it
//! with the same identities.
//!
//! Read access for node types and metadata resolvers goes through the
//! borrowed [`NodeView`] and [`PlugView`] handles.

mod detach;
mod dirty;
mod edit;
mod ids;
mod metadata;
mod node;
mod node_type;
mod plug;
mod storage;
mod view;

pub use detach::DetachedSubtree;
pub use dirty::{DirtyCause, DirtyEvent, NodeEvent, PlugEvent};
pub use edit::InputChange;
pub use ids::{ChildId, NodeId, ParentId, PlugId};
pub use node_type::{AffectedPlugs, NodeType, NodeTypeRegistry, TypeTag};
pub use plug::{Direction, PlugFlags, PlugSpec, PlugType};
pub use storage::{Graph, GraphBuilder, GraphSignals};
pub use view::{NodeView, PlugView};
