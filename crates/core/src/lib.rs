//! Shared types for the NMS visual-novel scripting toolchain: source
//! spans, diagnostics, the token model, the bytecode model, and the
//! `.nmc` artifact codec. Consumed by `nms-compiler` and `nms-runtime`.

pub mod bytecode;
pub mod codec;
pub mod diagnostics;
pub mod span;
pub mod token;

pub use bytecode::{CompiledCharacter, CompiledScript, Instruction, Opcode};
pub use diagnostics::{Diagnostic, DiagnosticCollection, ErrorCode, Severity};
pub use span::{SourceLocation, Span};
pub use token::{Literal, Token, TokenKind};
