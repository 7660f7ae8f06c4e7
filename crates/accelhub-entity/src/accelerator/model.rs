//! Accelerator entity model.

use accelhub_core::types::AcceleratorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A physical or virtual accelerator device owned by a project.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Accelerator {
    /// Unique accelerator identifier.
    pub id: AcceleratorId,
    /// Human-readable name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Owning project.
    pub project_id: String,
    /// Creating user.
    pub user_id: Option<String>,
    /// Device class (`fpga`, `gpu`, ...). Also the quota resource name.
    pub device_type: String,
    /// Vendor-specific accelerator type.
    pub acc_type: Option<String>,
    /// Capability descriptor.
    pub acc_capability: Option<String>,
    /// PCI vendor id.
    pub vendor_id: Option<String>,
    /// PCI product id.
    pub product_id: Option<String>,
    /// Remotable flag (0 = local only).
    pub remotable: i32,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Data required to create an accelerator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccelerator {
    /// Human-readable name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Owning project.
    pub project_id: String,
    /// Creating user.
    pub user_id: Option<String>,
    /// Device class.
    pub device_type: String,
    /// Vendor-specific accelerator type.
    pub acc_type: Option<String>,
    /// Capability descriptor.
    pub acc_capability: Option<String>,
    /// PCI vendor id.
    pub vendor_id: Option<String>,
    /// PCI product id.
    pub product_id: Option<String>,
    /// Remotable flag.
    pub remotable: i32,
}

/// Partial update of an accelerator. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAccelerator {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New accelerator type.
    pub acc_type: Option<String>,
    /// New capability descriptor.
    pub acc_capability: Option<String>,
    /// New remotable flag.
    pub remotable: Option<i32>,
}
