//! Key-Value Client Module
//!
//! The minimal contract the rest of the crate needs from the remote key-value store,
//! plus the backends that implement it.
//!
//! ## Contract
//! Get / Put / Delete / Delete-by-prefix / List-by-prefix / Count-by-prefix, and a
//! liveness probe against a named endpoint. Values are JSON text.
//!
//! ## Submodules
//! - **`client`**: The `KvClient` and `KvConnector` traits and their shared types.
//! - **`etcd`**: Client for etcd v3 speaking the JSON gRPC gateway over HTTP.
//! - **`memory`**: In-process store used for local runs and by the test suite.
//! - **`protocol`**: Wire DTOs for the etcd JSON gateway.
//! - **`error`**: Errors surfaced by any backend.

pub mod client;
pub mod error;
pub mod etcd;
pub mod memory;
pub mod protocol;

#[cfg(test)]
mod tests;
