//! # usbdisp-gadget — USB display gadget service
//!
//! Device-side service that receives bitmap updates as a stream of
//! bulk chunks, reassembles them and renders them into a 16-bpp
//! framebuffer surface using `usbdisp-core`.
//!
//! ## Sources
//!
//! - **UDP**: one datagram per chunk, for a host-side relay.
//! - **Replay**: a recorded chunk stream (see [`demo`] for a generator).

pub mod config;
pub mod demo;
pub mod service;
