//! lanlinkd internals — the UDP transport and the outbound send worker.
//! The daemon binary in `main.rs` wires these together.

pub mod send_worker;
pub mod transport;
