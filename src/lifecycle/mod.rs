//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! SIGTERM / ctrl-c
//!     |
//!     v
//! Shutdown::trigger()
//!     |
//!     +--> gateway drains connections and exits
//!     +--> health monitor stops probing
//! ```
//!
//! # Design Decisions
//! - One broadcast channel fans the signal out to every subsystem;
//!   each holds its own receiver and decides how to wind down
//! - Config reload is not a lifecycle event. The watcher swaps the
//!   router generation in place without touching the listener

pub mod shutdown;

pub use shutdown::Shutdown;
