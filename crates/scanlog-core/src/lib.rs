//! Core abstractions for scanlog: the scan record model, the store contract
//! every backend implements, and the blob capability the key-value backend sits on.
//! No I/O happens here; backends live in their own crates.

pub mod blob;
#[cfg(any(test, feature = "conformance"))]
pub mod conformance;
pub mod scan;
pub mod store;
