//! Echo server - simple request/response example.
//!
//! This example demonstrates:
//! - Building a server with the builder pattern
//! - Registering a route handler with typed input and output
//! - Stamping each envelope with its origin connection
//! - Draining in-flight work on Ctrl-C
//!
//! # Running
//!
//! ```text
//! RUST_LOG=smartnet=debug cargo run --example echo
//! ```
//!
//! Every JSON envelope sent on route 1001 comes back on route 1002 with the
//! same sequence number.

use serde::{Deserialize, Serialize};
use smartnet::channel::{append_handler, with_byte_order, with_codec, OriginStamp};
use smartnet::{
    ByteOrder, Channel, Codec, RequestContext, Resettable, Server, ServerConfig, Typed,
    ValueLoader,
};

const ROUTE_ECHO: i32 = 1001;
const ROUTE_ECHO_REPLY: i32 = 1002;

#[derive(Deserialize, Debug, Default)]
struct EchoInput {
    message: String,
}

impl Resettable for EchoInput {
    fn reset(&mut self) {
        self.message.clear();
    }
}

#[derive(Serialize, Debug)]
struct EchoOutput {
    echo: String,
    from: Option<u64>,
}

fn echo(ctx: &RequestContext<'_>, _channel: &Channel, input: &mut EchoInput) -> Typed<EchoOutput> {
    Typed::new(
        ROUTE_ECHO_REPLY,
        EchoOutput {
            echo: std::mem::take(&mut input.message),
            from: ctx.origin(),
        },
    )
}

#[tokio::main]
async fn main() -> smartnet::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server = Server::builder(ValueLoader::new(ServerConfig {
        service_name: "echo".into(),
        ..ServerConfig::default()
    }))
    .initializer(with_codec(Codec::Json))
    .initializer(with_byte_order(ByteOrder::Big))
    .initializer(append_handler(|| OriginStamp))
    .route(ROUTE_ECHO, "echo", echo)
    .build()?;

    let running = server.serve().await?;
    tracing::info!(address = ?server.local_addr(), "echo server listening");

    tokio::signal::ctrl_c().await?;
    server.shutdown().await?;
    running.cancelled().await;
    Ok(())
}
