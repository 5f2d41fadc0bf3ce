//! DNS Record Management Backend
//!
//! Keeps DNS zones and domains in a remote key-value store and projects every domain into
//! the record layout a CoreDNS-style server reads from the same store.
//!
//! ## Architecture Modules
//!
//! - **`config`**: TOML configuration file model, defaults and loading.
//! - **`kv`**: The key-value client contract plus its two backends, an etcd v3 gateway
//!   client and an in-process store.
//! - **`connection`**: The connection manager. Owns the store handle, reconnects with
//!   exponential backoff and probes liveness in the background.
//! - **`storage`**: Zone and domain storage, the key-space layout and the record
//!   synchronizer that keeps the DNS server's view converged.
//! - **`health`**: The `/health` HTTP endpoint reporting store connectivity.

pub mod config;
pub mod connection;
pub mod health;
pub mod kv;
pub mod storage;
