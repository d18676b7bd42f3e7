//! # cmdsync canonical model
//!
//! The canonical per-function / per-device command representation shared by
//! both extraction paths (execution logs and source scanning), its
//! line-oriented text grammar, and the structural diff between two documents.
//!
//! ## Grammar
//!
//! ```text
//! !!!func <name>
//! !!device <device>
//! <command-line>
//! <command-line>
//! !!device <device2>
//! ...
//! ```
//!
//! Failure markers, `ctrl+z` → `return` rewriting, expectation annotations
//! and description lines are presentation-only decoration: the parser keeps
//! the raw lines and never restores record-level outcome metadata.

mod diff;
mod format;
mod parse;
mod types;

pub use diff::diff_documents;
pub use format::{format_document, format_function, DEVICE_MARKER, FAILURE_PREFIX, FUNC_MARKER};
pub use parse::parse_document;
pub use types::{
    CanonicalDocument, CommandKind, CommandRecord, DeviceBlock, ExecResult, ExpectKind,
    Expectation, FunctionTranscript,
};
