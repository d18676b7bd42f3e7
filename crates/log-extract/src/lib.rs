//! # cmdsync log extraction
//!
//! Turns raw execution-log JSON trees into [`cmdsync_canonical`] documents:
//!
//! ```text
//! *.pytestlog.json
//!     │
//!     ├──> decode     (base64-tagged leaves, escaped newlines)
//!     │
//!     ├──> walker     (phases → steps → send/CheckCommand call records)
//!     │
//!     └──> canonical  (per-function, per-device command blocks)
//! ```
//!
//! The log schema is undocumented and drifts across framework versions, so
//! every walk step pattern-matches defensively and skips what it does not
//! recognize; nothing in this crate aborts on a malformed node.

mod catalog;
mod decode;
mod error;
mod walker;

pub use catalog::CommandCatalog;
pub use decode::decode_tree;
pub use error::{ExtractError, Result};
pub use walker::{extract_document, script_name};
