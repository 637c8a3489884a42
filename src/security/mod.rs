//! Request admission control for the HTTP surface
//!
//! ```text
//! request ──► client identity ──► RateLimiter::check ──allowed──► agent
//!                                        │
//!                                        └─denied─► 429 (limit, window)
//! ```

pub mod rate_limit;

pub use rate_limit::{RateLimitError, RateLimiter};
