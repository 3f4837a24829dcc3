//! # Runtime
//!
//! The growth engine: a graph-structured stack of growing nodes advanced one
//! input position at a time, the parse graph recording every derivation, and
//! the resolver that orders competing derivations when the tree is built.
//!
//! Most users only need [`Parser`]; the stack types are public for tooling
//! that inspects node identities.

mod config;
mod graph;
mod gss;
mod heap;
mod parser;
mod resolver;

pub use config::{ParseMetrics, RuntimeConfig};
pub(crate) use graph::ParseGraph;
pub use gss::{GraphStructuredStack, GrowingNodeIndex, NodeId};
pub use heap::IndexedHeap;
pub use parser::{InterruptHandle, ParseOutput, Parser};
pub(crate) use resolver::AmbiguityResolver;
