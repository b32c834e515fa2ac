use std::net::SocketAddr;
use std::time::Duration;

use futures::Stream;
use grpcweb_bridge::codec::prost as codec;
use grpcweb_bridge::prelude::*;

/// `helloworld.Greeter` service name.
pub const GREETER: &str = "helloworld.Greeter";

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    /// Number of streamed replies; 0 means the default of 3.
    #[prost(uint32, tag = "2")]
    pub count: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloReply {
    #[prost(string, tag = "1")]
    pub message: String,
}

async fn say_hello(req: HelloRequest, ctx: CallContext) -> Result<HelloReply, CallError> {
    if req.name.is_empty() {
        return Err(ctx.abort(Code::InvalidArgument, "name must not be empty"));
    }

    let mut trailing = Metadata::new();
    if let Some(user) = ctx.invocation_metadata().get("x-user").and_then(|v| v.as_str()) {
        trailing
            .append("x-greeted-by", user.to_string())
            .map_err(CallError::handler)?;
    }
    ctx.set_trailing_metadata(trailing);

    Ok(HelloReply {
        message: format!("Hello, {}!", req.name),
    })
}

fn say_hello_stream(
    req: HelloRequest,
    ctx: CallContext,
) -> impl Stream<Item = Result<HelloReply, CallError>> + Send {
    let count = if req.count == 0 { 3 } else { req.count };
    async_stream::stream! {
        if let Ok(initial) = Metadata::new().with("x-reply-count", count.to_string()) {
            ctx.send_initial_metadata(initial);
        }
        for i in 1..=count {
            yield Ok(HelloReply {
                message: format!("Hello #{i}, {}!", req.name),
            });
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

/// The greeter's methods, ready to register.
pub fn greeter() -> ServiceDescriptor {
    let service = ServiceDescriptor::new(GREETER);
    let say_hello_path = service.method_path("SayHello");
    let stream_path = service.method_path("SayHelloStream");
    let upload_path = service.method_path("SayHelloUpload");

    service
        .method(codec::unary(say_hello_path, say_hello))
        .method(codec::server_streaming(stream_path, say_hello_stream))
        .method(MethodDescriptor::client_streaming(upload_path))
}

/// Returns the server address from the PORT env var, defaulting to 3000.
pub fn server_addr() -> anyhow::Result<SocketAddr> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    Ok(format!("127.0.0.1:{port}").parse()?)
}
