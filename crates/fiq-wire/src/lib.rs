//! fiq-wire: binary codec and request/reply messages spoken between `fiqd`
//! and its clients.

pub mod codec;
pub mod protocol;

pub use codec::{DecodeError, Reader, Writer, FORMAT_VERSION};
pub use protocol::{Command, ProcessImageResult, Reply, Request};

/// Default daemon endpoint.
pub const DEFAULT_ENDPOINT: &str = "tcp://0.0.0.0:40411";
