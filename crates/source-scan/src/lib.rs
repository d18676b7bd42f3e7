//! # cmdsync source scanning
//!
//! Static recovery of device-command call sites from test-script source, and
//! the surgical per-function rewrite that closes the round trip:
//!
//! ```text
//! script source
//!     │
//!     ├──> scanner   (`X.Y.send(..)` / `X.Y.CheckCommand(..)` call sites)
//!     │
//!     ├──> locate    (function spans: syntax tree, or indentation fallback)
//!     │
//!     └──> rewrite   (replace one function body at a time, rest untouched)
//! ```
//!
//! Scripts are never executed; everything here is text and syntax-tree
//! analysis over a Python-like surface.

mod error;
mod locate;
mod rewrite;
mod scanner;

pub use error::{Result, ScanError};
pub use locate::{indent_span, syntax_spans, FunctionSpan};
pub use rewrite::rewrite_functions;
pub use scanner::{check_call_index, scan_calls, scan_document, CallSite};
