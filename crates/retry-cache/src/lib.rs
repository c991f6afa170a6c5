//! Process-wide message retry counters.
//!
//! Counters are keyed by outgoing message id and expire after a fixed TTL,
//! so a message that is never acknowledged cannot pin an entry forever.

mod cache;

pub use cache::RetryCache;
