//! Deployable domain entities.

pub mod model;

pub use model::{CreateDeployable, Deployable, UpdateDeployable};
