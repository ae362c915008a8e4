//! Authorization and admission policy for tool dispatch.
//!
//! [`CapabilityMatcher`] decides whether an agent may call a tool by way of
//! the capabilities it holds. [`RateLimiter`] bounds how often callers may
//! dispatch at all.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod matcher;
mod rate_limit;

pub use error::{PolicyError, PolicyResult};
pub use matcher::CapabilityMatcher;
pub use rate_limit::{RateLimit, RateLimitExceeded, RateLimitScope, RateLimiter, UNKNOWN_CALLER};
