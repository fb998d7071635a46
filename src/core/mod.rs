//! Building blocks shared by the subscriber and seek pipelines.

pub mod compression;
pub mod shutdown;
