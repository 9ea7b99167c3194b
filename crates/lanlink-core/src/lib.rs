//! lanlink-core — wire format, canonical events, and configuration.
//! Every other lanlink crate depends on this one.

pub mod config;
pub mod event;
pub mod wire;

pub use event::{CanonicalEvent, SystemNotice};
pub use wire::{FragmentEnvelope, Inbound, WireError, WireMessage};
