//! Zone & Domain Storage Module
//!
//! Persists the management model (zones and their domains) in the key-value store and
//! projects every domain into the record layout the DNS server reads.
//!
//! ## Core Concepts
//! - **Key-space layout**: Zones, domains and DNS-server records each live under their
//!   own prefix. Record keys reverse the zone labels (`example.com` -> `com/example`) and
//!   end in a positional `x<index>` segment, exactly as the DNS server expects.
//! - **Synchronization**: A domain write is followed by a diff-based pass that makes the
//!   record keys under the domain's prefix carry exactly the domain's IP set.
//! - **Cascades**: Deleting a zone deletes its domains; deleting a domain deletes its
//!   records. Both are prefix deletes.
//! - **Availability**: Every operation first waits briefly for a store connection and
//!   fails with `StoreError::Unavailable` rather than blocking.
//!
//! Concurrent writes to the same domain are not serialized here; callers are expected
//! to keep one update per domain in flight, or to rely on repeated passes converging.

pub mod codec;
pub mod domain;
pub mod error;
pub mod keys;
pub mod sync;
pub mod types;
pub mod zone;
