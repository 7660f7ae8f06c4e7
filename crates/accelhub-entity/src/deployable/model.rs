//! Deployable entity model.

use accelhub_core::types::{AcceleratorId, DeployableId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A deployable sub-unit of an accelerator (e.g. an FPGA region or a
/// virtual function) that can be bound to an instance.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Deployable {
    /// Unique deployable identifier.
    pub id: DeployableId,
    /// Human-readable name.
    pub name: String,
    /// Parent deployable, if nested.
    pub parent_id: Option<DeployableId>,
    /// Root of the deployable tree.
    pub root_id: Option<DeployableId>,
    /// PCIe address on the host.
    pub pcie_address: String,
    /// Host the device is installed in.
    pub host: String,
    /// Board model.
    pub board: String,
    /// Vendor name.
    pub vendor: String,
    /// Firmware or bitstream version.
    pub version: String,
    /// Deployable type (`pf`, `vf`, ...).
    pub deployable_type: String,
    /// Whether the deployable can be handed to an instance.
    pub assignable: bool,
    /// Instance the deployable is bound to, if any.
    pub instance_id: Option<Uuid>,
    /// Availability state (`free`, `claimed`, ...).
    pub availability: String,
    /// Accelerator this deployable belongs to.
    pub accelerator_id: Option<AcceleratorId>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Deployable {
    /// Whether the deployable is currently bound to an instance.
    pub fn is_allocated(&self) -> bool {
        self.instance_id.is_some()
    }
}

/// Data required to create a deployable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeployable {
    /// Human-readable name.
    pub name: String,
    /// Parent deployable.
    pub parent_id: Option<DeployableId>,
    /// Root deployable.
    pub root_id: Option<DeployableId>,
    /// PCIe address.
    pub pcie_address: String,
    /// Host.
    pub host: String,
    /// Board model.
    pub board: String,
    /// Vendor.
    pub vendor: String,
    /// Version.
    pub version: String,
    /// Deployable type.
    pub deployable_type: String,
    /// Assignable flag.
    pub assignable: bool,
    /// Initial availability.
    pub availability: String,
    /// Owning accelerator.
    pub accelerator_id: Option<AcceleratorId>,
}

/// Partial update of a deployable. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDeployable {
    /// New name.
    pub name: Option<String>,
    /// New version.
    pub version: Option<String>,
    /// New assignable flag.
    pub assignable: Option<bool>,
    /// Bind to (`Some(Some(id))`) or release from (`Some(None)`) an instance.
    pub instance_id: Option<Option<Uuid>>,
    /// New availability state.
    pub availability: Option<String>,
}
