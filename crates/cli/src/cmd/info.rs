use prebake_lib::consts::{APP_NAME, DEFAULT_CACHE_KIND, DEFAULT_CACHE_ROOT, DEFAULT_EXPORTS, DEFAULT_MEMORY_MAX_PAGES, WASM_TARGET};

use crate::output::print_stat;

pub fn cmd_info() {
  println!("{} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));
  println!();
  println!("Module:");
  print_stat("Target", WASM_TARGET);
  print_stat("Memory max pages", &DEFAULT_MEMORY_MAX_PAGES.to_string());
  print_stat("Exports", &DEFAULT_EXPORTS.join(","));
  println!("Cache:");
  print_stat("Root", DEFAULT_CACHE_ROOT);
  print_stat("Kind", DEFAULT_CACHE_KIND);
  print_stat("Layout", "<root>/<project>/<kind>/<ref>/<job>");
}
