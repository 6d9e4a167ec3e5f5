//! Client-side connection plumbing.
//!
//! - [`backoff`]: exponential backoff policy for reconnect attempts.
//! - [`retry`]: async loop that paces an operation with a backoff policy.
//! - [`stream`]: correlates multiplexed responses with their requests.

pub mod backoff;
pub mod retry;
pub mod stream;

pub use backoff::{Backoff, BackoffConfig, BackoffDecision, BackoffError, ExponentialBackoff};
pub use retry::retry;
pub use stream::{PeerSettings, PendingStream, StreamCorrelator, StreamError};
