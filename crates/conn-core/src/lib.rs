//! conn-core - the reconnecting, multiplexed connection to an event-store server.
//!
//! A long-lived `ConnectionManager` owns a single TCP session to a configured
//! endpoint, multiplexes concurrent client requests and server-initiated
//! subscription streams over it by correlation id, and re-establishes the
//! session with exponential backoff when it drops. Everything downstream of
//! the socket (individual command bodies, credentials, the client-facing
//! façade) lives outside this crate; see [`message`] and [`operation`] for
//! the seams.

pub mod client;
pub mod correlation;
pub mod error;
pub mod heartbeat;
pub mod manager;
pub mod message;
pub mod operation;
pub mod operation_table;
pub mod pipeline;
pub mod retry;
pub mod settings;

pub use client::{ClientHandle, ClientRegistry};
pub use correlation::CorrelationId;
pub use error::{ConnectError, FrameError, SubmitError};
pub use heartbeat::{HeartbeatEvent, HeartbeatId, HeartbeatTimer};
pub use manager::{ConnectionManager, ManagerHandle};
pub use message::{ClientEvent, Credentials, Message, OutLike, PackageIn, PackageOut};
pub use operation::Operation;
pub use operation_table::OperationTable;
pub use pipeline::{decode_frame, encode_frame, Pipeline, TcpPipeline};
pub use retry::RetrySchedule;
pub use settings::Settings;
