//! Resilience patterns for outbound calls
//!
//! Every call a service makes across a process boundary goes through the
//! deadline guard in [`timeout`]: the call either completes within a fixed
//! deadline or fails fast with a timeout error carrying the call's label.
//! Calls that complete but run long emit a slow-call diagnostic tagged with
//! the request correlation id.
//!
//! # Example: database query with a deadline
//!
//! ```rust,no_run
//! use resilience::{guard, DeadlineConfig, GuardError};
//!
//! # async fn query() -> Result<u64, String> { Ok(42) }
//! #[tokio::main]
//! async fn main() {
//!     let config = DeadlineConfig::default();
//!
//!     match guard(&config, "req-1234", "fetch rows", query()).await {
//!         Ok(rows) => println!("{rows}"),
//!         Err(GuardError::DeadlineExceeded { label, .. }) => eprintln!("{label} timed out"),
//!         Err(GuardError::Inner(e)) => eprintln!("{e}"),
//!     }
//! }
//! ```

pub mod timeout;

// Re-export main types for convenience
pub use timeout::{guard, with_deadline, DeadlineConfig, DeadlineExceeded, GuardError};
