//! Health Endpoint
//!
//! Reports whether the process currently holds a live store connection. The answer comes
//! from the connection manager's cached state; the endpoint never touches the store.

pub mod handlers;
pub mod protocol;

#[cfg(test)]
mod tests;
