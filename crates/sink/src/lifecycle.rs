//! Index lifecycle policy attachment.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;

/// Lifecycle policy attached to each target index once per process.
#[derive(Debug)]
pub struct LifecyclePolicy {
    name: String,
    applied: Mutex<HashSet<String>>,
}

impl LifecyclePolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            applied: Mutex::new(HashSet::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index settings body for `PUT /<target>/_settings`.
    pub fn settings_body(&self, target: &str) -> Value {
        json!({
            "index": {
                "lifecycle": {
                    "name": self.name,
                    "rollover_alias": target,
                    "parse_origination_date": true,
                }
            }
        })
    }

    pub fn is_applied(&self, target: &str) -> bool {
        self.applied.lock().contains(target)
    }

    pub fn mark_applied(&self, target: &str) {
        self.applied.lock().insert(target.to_string());
    }
}
