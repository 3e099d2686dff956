//! Messaging thread between a contractor and a homeowner

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const COLLECTION: &str = "conversations";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Conversation id for a pair of users, independent of argument order.
pub fn conversation_id(user_a: &str, user_b: &str) -> String {
    let (first, second) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{}_{}", first, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_order_independent() {
        assert_eq!(conversation_id("bob", "alice"), "alice_bob");
        assert_eq!(conversation_id("alice", "bob"), "alice_bob");
    }
}
