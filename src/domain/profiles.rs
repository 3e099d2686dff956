//! Contractor profile record
//!
//! Only the aggregate `rating` is owned by the bid workflow; the rest of the
//! profile is maintained elsewhere and preserved on write.

use serde::{Deserialize, Serialize};

pub const COLLECTION: &str = "users";

pub mod fields {
    pub const RATING: &str = "rating";
    pub const RATING_VERSION: &str = "ratingVersion";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractorProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    /// Bumped on every aggregate write.
    #[serde(default)]
    pub rating_version: u64,
}

/// Response DTO for a contractor's aggregate rating
#[derive(Debug, Clone, Serialize)]
pub struct RatingResponse {
    pub contractor_id: String,
    pub rating: Option<f64>,
}
