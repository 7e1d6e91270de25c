//! Shared execution context and fragment merging.
//!
//! The shared context is the accumulating state of one run: a single
//! mapping from string key to JSON value, seeded with the original goal
//! text under a protected key. It is owned exclusively by the
//! coordinator; tasks receive cloned snapshots and return fragments,
//! which are folded back in as an explicit merge step between waves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Context key that holds the original goal text. Never overwritten by
/// a merge.
pub const GOAL_KEY: &str = "goal";

/// A partial context produced by one successful task, to be merged into
/// the shared context.
pub type Fragment = BTreeMap<String, Value>;

/// Build a one-entry fragment.
pub fn fragment(key: &str, value: impl Into<Value>) -> Fragment {
    let mut frag = Fragment::new();
    frag.insert(key.to_string(), value.into());
    frag
}

/// The accumulating state of one coordinator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedContext {
    entries: BTreeMap<String, Value>,
}

impl SharedContext {
    /// Create a context seeded with the goal text.
    pub fn with_goal(goal: &str) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(GOAL_KEY.to_string(), Value::String(goal.to_string()));
        Self { entries }
    }

    /// The goal text this run was seeded with.
    pub fn goal(&self) -> &str {
        self.entries
            .get(GOAL_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Check whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries, goal key included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the context has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// The underlying entries.
    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    /// Fold one fragment into the context.
    ///
    /// Every key except [`GOAL_KEY`] is overwritten with the fragment's
    /// value (last write wins). Merging is a pure overwrite, so applying
    /// the same fragment twice leaves the context unchanged.
    pub fn merge_fragment(&mut self, fragment: &Fragment) {
        for (key, value) in fragment {
            if key == GOAL_KEY {
                continue;
            }
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Fold a batch of fragments in, in iteration order.
    ///
    /// Later fragments win on key collision. When the batch comes from a
    /// wave, iteration order is task completion order, which is
    /// nondeterministic for tasks that ran in parallel.
    pub fn merge_all<'a>(&mut self, fragments: impl IntoIterator<Item = &'a Fragment>) {
        for fragment in fragments {
            self.merge_fragment(fragment);
        }
    }

    /// A filtered copy containing the goal key plus the given keys.
    ///
    /// Keys absent from the context are silently skipped. This is the
    /// data-visibility boundary between tasks: a task sees only what its
    /// `data_needs` declares.
    pub fn project(&self, keys: &[String]) -> SharedContext {
        let mut entries = BTreeMap::new();
        if let Some(goal) = self.entries.get(GOAL_KEY) {
            entries.insert(GOAL_KEY.to_string(), goal.clone());
        }
        for key in keys {
            if let Some(value) = self.entries.get(key) {
                entries.insert(key.clone(), value.clone());
            }
        }
        Self { entries }
    }
}
