//! Minimal gRPC-Web client for the greeter example.
//!
//! Sends one unary and one server-streaming call, then prints every decoded
//! message and the trailer block.
//!
//! Run with: cargo run --bin hello-client [name]

use bytes::Bytes;
use grpcweb_bridge_core::{
    FrameDecoder, GRPC_MESSAGE, GRPC_TIMEOUT_HEADER, decode_grpc_message, serialize_timeout,
    unpack_trailers, wrap_message,
};
use grpcweb_bridge_examples::{GREETER, HelloReply, HelloRequest, server_addr};
use http::Request;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use prost::Message;
use std::time::Duration;
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let name = std::env::args().nth(1).unwrap_or_else(|| "World".to_string());

    let unary = HelloRequest { name: name.clone(), count: 0 };
    call("SayHello", &unary, None).await?;

    let streaming = HelloRequest { name, count: 4 };
    call("SayHelloStream", &streaming, Some(Duration::from_secs(5))).await?;
    Ok(())
}

async fn call(
    method: &str,
    request: &HelloRequest,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let stream = TcpStream::connect(server_addr()?).await?;
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });

    let body = wrap_message(false, false, &request.encode_to_vec());
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/{GREETER}/{method}"))
        .header("content-type", "application/grpc-web+proto")
        .header("content-length", body.len())
        .header("host", "localhost")
        .header("x-user", "hello-client");
    if let Some(timeout) = timeout {
        builder = builder.header(GRPC_TIMEOUT_HEADER, serialize_timeout(timeout));
    }
    let req = builder.body(Full::new(body))?;

    println!("=== {method} ===");
    let mut resp = sender.send_request(req).await?;
    println!("HTTP {}", resp.status());
    for (name, value) in resp.headers() {
        println!("  {name}: {}", value.to_str().unwrap_or("<binary>"));
    }

    // Decode frames as they arrive
    let mut decoder = FrameDecoder::new();
    while let Some(chunk) = resp.body_mut().frame().await {
        let Ok(data) = chunk?.into_data() else {
            continue;
        };
        decoder.extend(&data);
        while let Some(frame) = decoder.decode_next()? {
            if frame.is_trailer {
                print_trailers(&frame.payload)?;
            } else {
                let reply = HelloReply::decode(frame.payload)?;
                println!("message: {}", reply.message);
            }
        }
    }
    decoder.finish()?;
    println!();
    Ok(())
}

fn print_trailers(block: &Bytes) -> anyhow::Result<()> {
    for (key, value) in unpack_trailers(block)? {
        if key == GRPC_MESSAGE {
            println!("trailer {key}: {}", decode_grpc_message(&value));
        } else {
            println!("trailer {key}: {value}");
        }
    }
    Ok(())
}
