//! Advisory document locks - at most one per document id, held until
//! explicitly released.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub doc_id: i64,
    pub owner: String,
    pub date: DateTime<Utc>,
}

impl Lock {
    pub fn new(doc_id: i64, owner: impl Into<String>) -> Self {
        Self { doc_id, owner: owner.into(), date: Utc::now() }
    }
}
