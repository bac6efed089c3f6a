pub mod atomic_write;
pub mod canonicalization;
pub mod error;
pub mod logging;
pub mod paths;
pub mod rate_limiter;
pub mod retry;
