/// Application name.
pub const APP_NAME: &str = "prebake";

/// Cache root used when neither `--cache-root` nor `PREBAKE_CACHE_ROOT` is given.
pub const DEFAULT_CACHE_ROOT: &str = "/ci-cache";

/// Cache kind segment for cargo target directories.
pub const DEFAULT_CACHE_KIND: &str = "targets";

/// Compilation target for contract modules.
pub const WASM_TARGET: &str = "wasm32-unknown-unknown";

/// Maximum number of 64KiB pages the patched memory import may grow to.
pub const DEFAULT_MEMORY_MAX_PAGES: u32 = 16;

/// Exports kept by the prune stage.
pub const DEFAULT_EXPORTS: &[&str] = &["call", "deploy"];
