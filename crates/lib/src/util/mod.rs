//! Shared utilities.
//!
//! Common utilities used across the crate including test helpers.
