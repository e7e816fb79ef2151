//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Verify environment → Load config → Init observability → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Listeners stop accepting → Tasks drain → Exit
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
