//! End-to-end tests of the conversion pipeline against real files.

mod common;
mod rollback;
mod scenarios;
