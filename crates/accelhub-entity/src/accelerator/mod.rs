//! Accelerator domain entities.

pub mod model;

pub use model::{Accelerator, CreateAccelerator, UpdateAccelerator};
