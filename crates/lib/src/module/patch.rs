//! Memory-import rewriting for disassembled modules.
//!
//! Contracts import their linear memory from the host as
//! `(import "env" "memory" (memory (;0;) 2))`. The host requires a declared
//! maximum, so the declaration is rewritten to `(memory (;0;) 2 16)`.

use tracing::debug;

use super::types::ModuleError;

const IMPORT_PREFIX: &str = "(import \"env\" \"memory\" (memory";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemoryLimits {
  initial: u32,
  maximum: Option<u32>,
}

/// Rewrites the first `env.memory` import so its maximum is `max_pages`.
///
/// Everything outside the limits of that one declaration is preserved as-is.
/// Returns `Ok(None)` when the text contains no such import; callers decide
/// whether that is fatal. An import whose limits are not plain page counts
/// (a `shared` or 64-bit memory) is an error rather than a miss.
pub fn patch_memory_import(wat: &str, max_pages: u32) -> Result<Option<String>, ModuleError> {
  let Some((body_start, body_end)) = locate_limits(wat) else {
    return Ok(None);
  };
  let (index_comment, limits_text) = split_index_comment(&wat[body_start..body_end]);
  let Some(limits) = parse_limits(limits_text) else {
    return Err(ModuleError::UnsupportedMemoryImport {
      limits: limits_text.trim().to_string(),
    });
  };

  if limits.initial > max_pages {
    return Err(ModuleError::MemoryLimits {
      initial: limits.initial,
      max: max_pages,
    });
  }

  debug!(
    initial = limits.initial,
    old_max = ?limits.maximum,
    new_max = max_pages,
    "patching memory import"
  );

  let mut patched = String::with_capacity(wat.len() + 4);
  patched.push_str(&wat[..body_start]);
  patched.push_str(index_comment);
  patched.push_str(&format!(" {} {}", limits.initial, max_pages));
  patched.push_str(&wat[body_end..]);
  Ok(Some(patched))
}

/// Byte range between `(memory` and the `)` closing the memory type.
///
/// The range includes the optional `(;N;)` index comment.
fn locate_limits(wat: &str) -> Option<(usize, usize)> {
  let start = wat.find(IMPORT_PREFIX)? + IMPORT_PREFIX.len();
  let rest = &wat[start..];
  let search_from = if rest.trim_start().starts_with("(;") {
    rest.find(";)")? + 2
  } else {
    0
  };
  let end = search_from + rest[search_from..].find(')')?;
  Some((start, start + end))
}

/// Splits ` (;0;) 2 16` into (` (;0;)`, ` 2 16`).
fn split_index_comment(body: &str) -> (&str, &str) {
  match body.find(";)") {
    Some(end) if body.trim_start().starts_with("(;") => body.split_at(end + 2),
    _ => ("", body),
  }
}

fn parse_limits(text: &str) -> Option<MemoryLimits> {
  let mut numbers = text.split_whitespace();
  let initial = numbers.next()?.parse().ok()?;
  let maximum = match numbers.next() {
    Some(n) => Some(n.parse().ok()?),
    None => None,
  };
  if numbers.next().is_some() {
    return None;
  }
  Some(MemoryLimits { initial, maximum })
}
