//! Test doubles and a minimal fake server shared across the scenario tests.
//!
//! Speaks the same length-delimited/bincode wire format `TcpPipeline` uses,
//! via the crate's public `encode_frame`/`decode_frame` helpers, so these
//! tests exercise `ConnectionManager` against a real `TcpListener` rather
//! than an in-process stub.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use conn_core::manager::OperationFactory;
use conn_core::operation::Sender as OpSender;
use conn_core::{
    ClientEvent, ClientHandle, CorrelationId, Message, Operation, PackageIn, PackageOut,
};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

static NEXT_PORT: AtomicU16 = AtomicU16::new(19_200);

/// A fresh loopback address, distinct per call, so scenario tests can run
/// concurrently without colliding on a bound port.
pub fn next_addr() -> SocketAddr {
    let port = NEXT_PORT.fetch_add(1, Ordering::SeqCst);
    format!("127.0.0.1:{port}").parse().expect("valid loopback address")
}

/// A fake event-store server: binds a socket and hands back each accepted
/// connection as a [`FakeConn`] the test drives by hand.
pub struct FakeServer {
    listener: TcpListener,
}

impl FakeServer {
    pub async fn bind(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.expect("bind fake server");
        Self { listener }
    }

    pub async fn accept(&self) -> FakeConn {
        let (socket, _) = self.listener.accept().await.expect("accept inbound connection");
        FakeConn {
            framed: Framed::new(socket, LengthDelimitedCodec::new()),
        }
    }
}

/// One accepted connection, read/written frame-at-a-time in the same
/// envelope shape the manager's pipeline uses.
pub struct FakeConn {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl FakeConn {
    /// Read the next frame the manager sent, decoded as a `PackageIn` from
    /// the server's point of view (correlation id + the message the client
    /// transmitted).
    pub async fn recv(&mut self) -> PackageIn {
        let bytes = self
            .framed
            .next()
            .await
            .expect("connection closed before a frame arrived")
            .expect("frame read error");
        conn_core::decode_frame(&bytes)
    }

    /// Send a reply carrying `message` under `correlation_id`.
    pub async fn send(&mut self, correlation_id: CorrelationId, message: Message) {
        let pkg = PackageOut {
            message,
            correlation_id,
            credentials: None,
        };
        let bytes = conn_core::encode_frame(&pkg);
        self.framed.send(bytes).await.expect("write reply frame");
    }

    /// Close the connection, simulating the peer going away.
    pub async fn close(self) {
        drop(self.framed);
    }
}

/// An [`OperationFactory`] that must never actually be invoked — for tests
/// that never have a claimable client submission reach the manager.
pub fn unreachable_factory() -> OperationFactory {
    Arc::new(|_pkg, _client, _to_client| {
        unreachable!("no outgoing package should have created an operation in this test")
    })
}

/// A one-shot request/response operation: delivers the first inbound
/// message to its client and then terminates. Replays its original request
/// on every `connected()`, so a request whose response never arrived gets
/// retried across a reconnect.
pub struct RequestOperation {
    request: PackageOut,
    client: ClientHandle,
    to_client: mpsc::UnboundedSender<ClientEvent>,
}

impl Operation for RequestOperation {
    fn id(&self) -> CorrelationId {
        self.request.correlation_id
    }

    fn client(&self) -> ClientHandle {
        self.client
    }

    fn inspect_in(self: Box<Self>, msg: Message) -> Option<Box<dyn Operation>> {
        let _ = self.to_client.send(ClientEvent::Message {
            correlation_id: self.request.correlation_id,
            message: msg,
        });
        None
    }

    fn claims_outgoing(&self, _msg: &Message) -> bool {
        false
    }

    fn apply_outgoing(self: Box<Self>, _msg: Message) -> Option<Box<dyn Operation>> {
        Some(self)
    }

    fn connected(self: Box<Self>, send: &mut dyn OpSender) -> Option<Box<dyn Operation>> {
        send.send(self.request.clone());
        Some(self)
    }

    fn connection_lost(self: Box<Self>) -> Option<Box<dyn Operation>> {
        Some(self)
    }

    fn client_terminated(self: Box<Self>) -> Option<PackageOut> {
        None
    }
}

pub fn request_operation_factory() -> OperationFactory {
    Arc::new(|pkg, client, to_client| {
        Box::new(RequestOperation {
            request: pkg,
            client,
            to_client,
        }) as Box<dyn Operation>
    })
}

/// A live-subscription operation: stays in the table across `SubscribeCompleted`
/// and further inbound events, claims its own `Unsubscribe`, replays its
/// original subscribe request on `connected()`, and survives `connection_lost`
/// so the next successful connect re-subscribes without failing the client.
pub struct SubscriptionOperation {
    subscribe: PackageOut,
    client: ClientHandle,
    to_client: mpsc::UnboundedSender<ClientEvent>,
}

impl Operation for SubscriptionOperation {
    fn id(&self) -> CorrelationId {
        self.subscribe.correlation_id
    }

    fn client(&self) -> ClientHandle {
        self.client
    }

    fn inspect_in(self: Box<Self>, msg: Message) -> Option<Box<dyn Operation>> {
        let terminal = matches!(msg, Message::UnsubscribeCompleted);
        let _ = self.to_client.send(ClientEvent::Message {
            correlation_id: self.subscribe.correlation_id,
            message: msg,
        });
        if terminal {
            None
        } else {
            Some(self)
        }
    }

    fn claims_outgoing(&self, msg: &Message) -> bool {
        matches!(msg, Message::Unsubscribe)
    }

    fn apply_outgoing(self: Box<Self>, _msg: Message) -> Option<Box<dyn Operation>> {
        Some(self)
    }

    fn connected(self: Box<Self>, send: &mut dyn OpSender) -> Option<Box<dyn Operation>> {
        send.send(self.subscribe.clone());
        Some(self)
    }

    fn connection_lost(self: Box<Self>) -> Option<Box<dyn Operation>> {
        Some(self)
    }

    fn client_terminated(self: Box<Self>) -> Option<PackageOut> {
        Some(PackageOut {
            message: Message::Unsubscribe,
            correlation_id: self.subscribe.correlation_id,
            credentials: None,
        })
    }
}

pub fn subscription_operation_factory() -> OperationFactory {
    Arc::new(|pkg, client, to_client| {
        Box::new(SubscriptionOperation {
            subscribe: pkg,
            client,
            to_client,
        }) as Box<dyn Operation>
    })
}
