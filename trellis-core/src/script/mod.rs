//! Script Serialisation
//!
//! A graph is saved as a [`Script`]: the list of [`Statement`]s that rebuild
//! it when executed against an empty (or populated) graph. Only what cannot
//! be derived from node types is written: nodes, dynamic plugs, non-default
//! values, persistent instance metadata and connections.
//!
//! Scripts have a text form (JSON) for files and diffs and a compact binary
//! form (MessagePack) for clipboards and transport.

mod serialise;
mod statement;

pub use statement::{Script, Statement};
