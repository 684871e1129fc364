//! # muster-protocol
//!
//! Wire protocol for the Muster master/worker control channel.
//!
//! Workers and the master exchange one JSON object per frame over a
//! persistent WebSocket connection, discriminated by a `"type"` tag. This
//! crate owns the frame vocabulary and the codec for it.
//!
//! ## Design Principles
//!
//! - The frame vocabulary is a closed enum: routing is a `match`, never a
//!   runtime type probe.
//! - Decoding is total. A frame the codec cannot classify decodes to
//!   [`Decoded::Unrecognized`] so a misbehaving peer can never crash a
//!   worker off the fleet.
//! - Workers never interpret payloads positionally; every field is named.

pub mod envelope;
pub mod health;

pub use envelope::{decode, encode, CommandKind, Decoded, EncodeError, Envelope};
pub use health::HealthSample;
