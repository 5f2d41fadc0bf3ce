//! Configuration Module
//!
//! TOML configuration for the process: where the key-value store lives, how the
//! connection manager paces reconnects and health checks, where the DNS server's
//! records are rooted, and basic process settings (health server bind, log level).
//!
//! Every field has a default, so a missing section or an empty file yields a usable
//! configuration. Durations are whole seconds; zero means "use the default".

pub mod types;
