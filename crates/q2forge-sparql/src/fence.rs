//! Locating fenced code blocks in model output.
//!
//! Models are asked to wrap queries in a markdown fence tagged `sparql` and
//! structured payloads in a fence tagged `json`. They frequently add prose
//! around the fence, repeat a "corrected" query further down, or forget to
//! close the last fence. Matching is therefore lazy (each block ends at the
//! next closing fence) and callers decide what to do with more than one.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Every fenced block with a given tag, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlocks {
    blocks: Vec<String>,
}

impl FencedBlocks {
    /// First block in the text. Later blocks are ignored: they are usually
    /// self-correction commentary rather than the intended answer.
    pub fn first(&self) -> Option<&str> {
        self.blocks.first().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|s| s.as_str())
    }
}

fn fence_regex(tag: &str) -> Option<Regex> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = match cache.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    let key = tag.to_ascii_lowercase();
    if let Some(re) = guard.get(&key) {
        return Some(re.clone());
    }
    // ```<tag> ... ``` with the tag matched case-insensitively. The body may
    // start on the fence line itself.
    let pattern = format!(r"(?is)```[ \t]*{}\b[ \t]*\r?\n?(.*?)```", regex::escape(tag));
    let re = Regex::new(&pattern).ok()?;
    guard.insert(key, re.clone());
    Some(re)
}

/// Find every fenced block tagged `tag` (e.g. `sparql`, `json`).
///
/// Block bodies are trimmed; empty bodies are dropped.
pub fn find_fenced_blocks(text: &str, tag: &str) -> FencedBlocks {
    let Some(re) = fence_regex(tag) else {
        return FencedBlocks { blocks: Vec::new() };
    };
    let blocks = re
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    FencedBlocks { blocks }
}
