//! Deployable attribute entities.

pub mod model;

pub use model::{Attribute, CreateAttribute};
