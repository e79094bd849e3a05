//! File-backed blob storage for the key-value scan backend.
//! Writes are atomic (temp file + rename); encryption at rest is optional,
//! using AES-GCM with keys sourced from the OS keyring (or test doubles).

pub mod file_blob_store;
pub mod key_provider;
