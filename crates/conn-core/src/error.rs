//! Error taxonomy at each seam. No stringly-typed errors outside tests.

use std::io;

use thiserror::Error;

/// A decode failure produced by the pipeline's framing/codec layer.
///
/// This never propagates as a pipeline death — per the wire-framing
/// contract, decode failures become a [`crate::message::PackageIn`] carrying
/// a failure payload instead.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("failed to decode frame body: {0}")]
    Codec(#[from] bincode::Error),
    #[error("underlying I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A connect attempt failed before a socket was established.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect to {address} timed out after {timeout_ms}ms")]
    Timeout { address: String, timeout_ms: u64 },
    #[error("connect to {address} failed: {source}")]
    Io {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// A caller tried to submit work to a manager whose event loop has already
/// terminated.
#[derive(Debug, Error)]
#[error("manager mailbox is closed; the connection manager has terminated")]
pub struct SubmitError;
