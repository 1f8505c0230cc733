//! Origin id attached to state writes, events and service calls

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Names the action a state write, event or service call came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    /// ULID string
    pub id: String,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
