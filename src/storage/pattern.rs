use crate::interface::{TransportError, TransportResult};
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

lazy_static::lazy_static! {
    static ref GLOB_LRU_CACHE: Mutex<LruCache<String, Arc<Regex>>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(200).unwrap_or(NonZeroUsize::MIN)));
}

/// Convert a glob pattern (`*`, `?`, `\` escapes) into an anchored regex
#[inline]
fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push_str("(?s)^");

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Fast path for patterns that need no regex
#[inline]
fn fast_path_glob(text: &str, pattern: &str) -> Option<bool> {
    if pattern.contains(['?', '\\']) {
        return None;
    }

    match pattern.matches('*').count() {
        0 => Some(text == pattern),
        // "prefix*", the shape used for entity key scans
        1 if pattern.ends_with('*') => Some(text.starts_with(&pattern[..pattern.len() - 1])),
        1 if pattern.starts_with('*') => Some(text.ends_with(&pattern[1..])),
        _ => None,
    }
}

fn get_or_compile_regex(pattern: &str) -> TransportResult<Arc<Regex>> {
    {
        let mut cache = GLOB_LRU_CACHE.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(regex) = cache.get(pattern) {
            return Ok(Arc::clone(regex));
        }
    }

    let compiled = Regex::new(&glob_to_regex(pattern))
        .map_err(|e| TransportError::Command(format!("Invalid key pattern: {}", e)))?;
    let compiled = Arc::new(compiled);

    {
        let mut cache = GLOB_LRU_CACHE.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(pattern.to_string(), Arc::clone(&compiled));
    }

    Ok(compiled)
}

/// Match a key against a glob pattern
#[inline]
pub fn glob_match(text: &str, pattern: &str) -> TransportResult<bool> {
    if let Some(result) = fast_path_glob(text, pattern) {
        return Ok(result);
    }

    let regex = get_or_compile_regex(pattern)?;
    Ok(regex.is_match(text))
}
