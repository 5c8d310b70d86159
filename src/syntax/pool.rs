//! Thread-local parser pool.
//!
//! One parser per language and thread, created on first use and reused for
//! every later file of a batch.

use crate::context::Language;
use crate::syntax::{ScriptParser, SyntaxError};
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static PARSERS: RefCell<HashMap<Language, ScriptParser>> = RefCell::new(HashMap::new());
}

/// Run `f` with the pooled parser for `language`.
pub fn with_parser<F, R>(language: Language, f: F) -> Result<R, SyntaxError>
where
    F: FnOnce(&mut ScriptParser) -> R,
{
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(language) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(ScriptParser::new(language)?)
            }
        };
        Ok(f(parser))
    })
}
