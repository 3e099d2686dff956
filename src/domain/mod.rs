//! Domain types and DTOs
//!
//! Document shapes for bids, jobs, notifications, conversations and
//! contractor profiles, plus the pure rules over them.

pub mod bids;
pub mod conversations;
pub mod jobs;
pub mod notifications;
pub mod profiles;
pub mod timestamp;

pub use bids::{Bid, BidStatus, PlaceBidRequest};
pub use conversations::Conversation;
pub use jobs::{Job, JobStatus};
pub use notifications::BidNotification;
pub use profiles::ContractorProfile;
