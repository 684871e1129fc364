//! Muster worker agent library.
//!
//! The worker agent runs on every fleet node and keeps one control
//! connection to the Muster master. Over that connection it registers
//! itself (or re-identifies after a drop), receives spawn commands, tracks
//! the job processes they create, and streams periodic host telemetry. A
//! kill order from the master tears the jobs down gracefully and ends the
//! process.
//!
//! ## Architecture
//!
//! ```text
//! Supervisor            (outer retry loop; owns identity, counter, jobs)
//! ├── registration      (three-message handshake per connection)
//! ├── dispatch loop     (receive → decode → route → track)
//! │   └── HandlerRegistry   (kind-keyed command handlers)
//! └── health reporter   (background task on the connection's send half)
//! ```
//!
//! Job processes outlive individual connections: a dropped socket never
//! tears down running work. Only the kill escalation in
//! [`job::terminate_all`] does.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod health;
pub mod job;
pub mod registration;
pub mod supervisor;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use config::AgentConfig;
pub use error::AgentError;
pub use job::{JobHandle, JobState, PendingJobSet};
pub use registration::{NodeIdentity, MAX_RECONNECT_TRIES};
pub use supervisor::{RunOutcome, Supervisor};
