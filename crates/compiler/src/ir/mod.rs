//! The intermediate representation bridging `.nms` source text and the
//! visual node-graph editor: a graph form ([`graph::IRGraph`]) that both
//! the AST and the editor's flat [`visual::VisualGraph`] convert to and
//! from, plus diffing and id-normalization utilities the editor needs
//! for undo/redo and round-trip verification.

pub mod ast_to_ir;
pub mod diff;
pub mod graph;
pub mod ir_to_ast;
pub mod normalize;
pub mod roundtrip;
pub mod text_gen;
pub mod visual;

pub use ast_to_ir::ast_to_ir;
pub use diff::{diff as diff_graphs, GraphDiff};
pub use graph::{IRConnection, IRGraph, IRNode, IRNodeType, NodeId, PortId, PropertyValue};
pub use ir_to_ast::ir_to_ast;
pub use normalize::IDNormalizer;
pub use roundtrip::{RoundTripReport, RoundTripValidator};
pub use text_gen::ast_to_text;
pub use visual::{ir_to_visual, visual_to_ir, VisualGraph};
