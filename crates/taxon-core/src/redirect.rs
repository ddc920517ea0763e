//! Helpers over `from → to` redirect maps.
//!
//! A redirect map holds one entry per superseded canonical id. Chains are
//! stored hop by hop, so `Q1 → Q2` and `Q2 → Q3` mean `Q1` ultimately lives
//! at `Q3`.

use std::collections::{HashMap, HashSet};

/// Follow `id` through `redirects` to the end of its chain.
///
/// Returns `id` itself when it is not redirected. A cyclic chain stops at the
/// last id before the cycle closes; use [`find_cycle`] to reject those.
pub fn follow<'a>(redirects: &'a HashMap<String, String>, id: &'a str) -> &'a str {
  let mut current = id;
  let mut seen = HashSet::from([id]);
  while let Some(next) = redirects.get(current) {
    if !seen.insert(next.as_str()) {
      break;
    }
    current = next.as_str();
  }
  current
}

/// Return a canonical id that takes part in a redirect cycle, if any.
pub fn find_cycle(redirects: &HashMap<String, String>) -> Option<&str> {
  let mut starts: Vec<&String> = redirects.keys().collect();
  starts.sort();

  for start in starts {
    let mut seen = HashSet::from([start.as_str()]);
    let mut current = start.as_str();
    while let Some(next) = redirects.get(current) {
      if !seen.insert(next.as_str()) {
        return Some(next.as_str());
      }
      current = next.as_str();
    }
  }
  None
}
