//! Process lifecycle coordination.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     host triggers → session loop exits → strategy updater exits
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
