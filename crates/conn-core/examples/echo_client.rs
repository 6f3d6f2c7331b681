//! Echo probe - connects to an event-store endpoint, sends one `Ping` per
//! round, and prints whatever comes back.
//!
//! Usage: cargo run --example echo_client -- [OPTIONS]
//!
//! Options:
//!   -a, --address <HOST:PORT>  endpoint to connect to [default: 127.0.0.1:1113]
//!   -c, --count <N>            number of pings to send [default: 1]

use std::time::Duration;

use conn_core::manager::tcp_pipeline_factory;
use conn_core::{ClientEvent, ConnectionManager, Message, OutLike, Settings};

fn parse_args() -> (String, usize) {
    let args: Vec<String> = std::env::args().collect();
    let mut address = "127.0.0.1:1113".to_string();
    let mut count = 1usize;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-a" | "--address" => {
                i += 1;
                if i < args.len() {
                    address = args[i].clone();
                }
            }
            "-c" | "--count" => {
                i += 1;
                if i < args.len() {
                    count = args[i].parse().unwrap_or(1);
                }
            }
            "-h" | "--help" => {
                println!("Echo probe - exercise conn-core against a live endpoint");
                println!();
                println!("Usage: cargo run --example echo_client -- [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -a, --address <HOST:PORT>  endpoint to connect to [default: 127.0.0.1:1113]");
                println!("  -c, --count <N>            number of pings to send [default: 1]");
                std::process::exit(0);
            }
            other => {
                eprintln!("unrecognized argument: {other}");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    (address, count)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (address, count) = parse_args();
    let address = address.parse().unwrap_or_else(|e| {
        eprintln!("invalid address {address:?}: {e}");
        std::process::exit(1);
    });

    let settings = Settings::new(address).with_max_reconnections(3);
    let handle = ConnectionManager::spawn(settings, tcp_pipeline_factory(), fresh_request_factory());
    let (client, mut inbox) = handle.register_client();

    for i in 0..count {
        if let Err(e) = handle.submit(client, OutLike::Out(Message::Ping)) {
            eprintln!("manager is gone: {e}");
            break;
        }
        match tokio::time::timeout(Duration::from_secs(10), inbox.recv()).await {
            Ok(Some(ClientEvent::Message { message, .. })) => println!("[{i}] reply: {message:?}"),
            Ok(Some(ClientEvent::Failure { failure, .. })) => println!("[{i}] failed: {failure}"),
            Ok(None) => {
                println!("[{i}] manager shut down");
                break;
            }
            Err(_) => println!("[{i}] timed out waiting for a reply"),
        }
    }
}

/// A one-shot request operation, built inline since concrete operation
/// variants are a caller's concern, not this crate's — this example only
/// needs enough of one to round-trip a `Ping`.
fn fresh_request_factory() -> conn_core::manager::OperationFactory {
    use conn_core::operation::Sender;
    use conn_core::{ClientHandle, CorrelationId, Operation, PackageOut};
    use tokio::sync::mpsc::UnboundedSender;

    struct PingOperation {
        request: PackageOut,
        client: ClientHandle,
        to_client: UnboundedSender<ClientEvent>,
    }

    impl Operation for PingOperation {
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
        fn connected(self: Box<Self>, send: &mut dyn Sender) -> Option<Box<dyn Operation>> {
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

    std::sync::Arc::new(|pkg, client, to_client| {
        Box::new(PingOperation {
            request: pkg,
            client,
            to_client,
        }) as Box<dyn Operation>
    })
}
