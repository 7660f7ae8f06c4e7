//! Shared domain value types.

pub mod id;
pub mod quota_limit;

pub use id::{AcceleratorId, AttributeId, DeployableId, ReservationId, UsageId};
pub use quota_limit::QuotaLimit;
