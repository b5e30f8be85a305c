//! prebake-lib: build and cache helpers for CI jobs
//!
//! This crate provides the two procedures the `prebake` binary exposes:
//! - `module`: compiles a project to a WebAssembly module, patches its memory
//!   import, optimizes it and prunes its exports
//! - `cache`: warm-starts a per-branch, per-job build cache from the freshest
//!   cache of the same job

pub mod cache;
pub mod config;
pub mod consts;
pub mod module;
pub mod util;
