//! Connection Management Module
//!
//! Keeps a usable handle to the remote key-value store while the store comes and goes,
//! without ever blocking process startup.
//!
//! ## Core Mechanisms
//! - **Lifecycle**: `Disconnected -> Connecting -> Connected`, falling back to
//!   `Disconnected` whenever a connect attempt or a health probe fails.
//! - **Reconnect loop**: A single background task woken through a coalescing trigger
//!   (capacity 1). Failures double the retry interval up to a ceiling; a success resets it.
//! - **Health checks**: A periodic probe while connected. A failed probe drops the handle
//!   and wakes the reconnect loop.
//! - **Readiness**: `wait_for_connection` lets request paths wait a bounded time for a
//!   handle instead of failing on the first transient outage.

pub mod manager;
pub mod types;
