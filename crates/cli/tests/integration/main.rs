//! CLI integration tests for prebake.

mod cache_tests;
mod common;
mod module_tests;
