//! The per-request/per-subscription sub-state-machine contract.
//!
//! Concrete variants (one-shot request, transactional write, subscription,
//! persistent subscription) are a different crate's concern — this module
//! defines only the contract the manager depends on. The manager MUST NOT
//! assume any of these methods are idempotent across calls; it calls each
//! exactly once per triggering event.
//!
//! `inspectOut` is a dynamic partial function over outbound message types in
//! the source actor. Represented here, per the usual actor-to-state-machine
//! translation, as a predicate (`claims_outgoing`) plus a transform
//! (`apply_outgoing`) rather than an `Option<fn>`.

use crate::client::ClientHandle;
use crate::correlation::CorrelationId;
use crate::message::{Message, PackageOut};

/// A live send handle an operation uses to transmit on `connected`.
pub trait Sender {
    fn send(&mut self, pkg: PackageOut);
}

impl<F: FnMut(PackageOut)> Sender for F {
    fn send(&mut self, pkg: PackageOut) {
        self(pkg)
    }
}

/// Per-request sub-state-machine. Stored behind `Box<dyn Operation>` in the
/// [`crate::OperationTable`], so every state transition consumes the boxed
/// value and produces a new one (or `None` to signal removal).
pub trait Operation: Send {
    /// The operation's current correlation id.
    fn id(&self) -> CorrelationId;

    /// The client to which replies are delivered.
    fn client(&self) -> ClientHandle;

    /// Consume an inbound message addressed to this operation's correlation
    /// id. `None` means the operation is terminal and must be removed.
    fn inspect_in(self: Box<Self>, msg: Message) -> Option<Box<dyn Operation>>;

    /// Whether this operation wants to absorb `msg` as a follow-up outbound
    /// request from its own client (e.g. a live subscription claiming its
    /// `Unsubscribe`), instead of a fresh operation being created for it.
    fn claims_outgoing(&self, msg: &Message) -> bool;

    /// Apply a claimed outbound message. Only called when
    /// [`Operation::claims_outgoing`] returned `true` for `msg`.
    fn apply_outgoing(self: Box<Self>, msg: Message) -> Option<Box<dyn Operation>>;

    /// Invoked on (re)connect to replay or initialize this operation on the
    /// wire. `None` means drop without replay.
    fn connected(self: Box<Self>, send: &mut dyn Sender) -> Option<Box<dyn Operation>>;

    /// Invoked when the session is lost. `None` means drop and fail the
    /// client with `ConnectionLost`; `Some` means retain for replay on the
    /// next `connected`.
    fn connection_lost(self: Box<Self>) -> Option<Box<dyn Operation>>;

    /// Invoked when the originating client dies. An optional farewell
    /// package (e.g. `Unsubscribe`) is transmitted if present.
    fn client_terminated(self: Box<Self>) -> Option<PackageOut>;
}
