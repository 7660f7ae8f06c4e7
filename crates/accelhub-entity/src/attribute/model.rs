//! Attribute entity model.

use accelhub_core::types::{AttributeId, DeployableId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A free-form key/value attribute attached to a deployable.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attribute {
    /// Unique attribute identifier.
    pub id: AttributeId,
    /// Deployable the attribute describes.
    pub deployable_id: DeployableId,
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Data required to create an attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAttribute {
    /// Deployable the attribute describes.
    pub deployable_id: DeployableId,
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: String,
}
