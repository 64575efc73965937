//! Encoder invocation and session management.
//!
//! Sessions stream frames to the system `ffmpeg` over stdin while it encodes.

pub(crate) mod args;
pub(crate) mod session;
pub(crate) mod temp;
