//! Collaborators and the pipeline that drives them.

pub mod metadata_store;
pub mod notifier;
pub mod object_store;
pub mod upload_pipeline;
