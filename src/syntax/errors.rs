use crate::context::Language;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyntaxError {
    #[error("no grammar for {0:?} sources")]
    Unsupported(Language),

    #[error("failed to set language for parser")]
    LanguageSet,

    #[error("failed to parse source code")]
    ParseFailed,
}
