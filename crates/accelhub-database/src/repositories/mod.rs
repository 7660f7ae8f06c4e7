//! Repository implementations for accelerator records and quota state.

pub mod accelerator;
pub mod attribute;
pub mod deployable;
pub mod quota_limit;
pub mod quota_usage;
pub mod reservation;

pub use accelerator::AcceleratorRepository;
pub use attribute::AttributeRepository;
pub use deployable::DeployableRepository;
pub use quota_limit::QuotaLimitRepository;
pub use quota_usage::QuotaUsageRepository;
pub use reservation::ReservationRepository;
