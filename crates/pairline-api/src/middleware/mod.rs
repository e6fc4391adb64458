//! Tower layers.

pub mod cors;
