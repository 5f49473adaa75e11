//! Storage access and the selection / rating logic built on top of it.

pub mod listing;
pub mod memory_store;
pub mod object_store;
pub mod ratings_repository;
pub mod s3_store;
pub mod selector;

#[cfg(test)]
pub(crate) mod test_support;
