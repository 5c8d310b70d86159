//! Tree-sitter grammars for JavaScript and TypeScript.
//!
//! Only used to check converted output for new syntax errors. Detection
//! itself stays lexical.

pub mod errors;
pub mod parser;
pub mod pool;

pub use errors::SyntaxError;
pub use parser::{ErrorNode, ParsedSource, ScriptParser};
pub use pool::with_parser;
