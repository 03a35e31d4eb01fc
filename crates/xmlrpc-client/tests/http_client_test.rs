//! HTTP client integration tests.
//!
//! Each test stands up an in-process hyper server with a canned handler and
//! drives the real client against it: request framing, fault decoding,
//! connection reuse and re-dial, Basic auth, the JSON codec, and the
//! one-call-in-flight rule.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use xmlrpc_client::{Client, ClientConfig, ClientError};
use xmlrpc_common::{Fault, JsonRpcCodec, Value};

type Handler = Arc<
    dyn Fn(Request<Incoming>) -> Pin<Box<dyn Future<Output = Response<Full<Bytes>>> + Send>>
        + Send
        + Sync,
>;

fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// Minimal test server: every accepted connection bumps a counter so tests
/// can observe reuse vs. re-dial.
struct TestServer {
    port: u16,
    connections: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let accepted = connections.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        accepted.fetch_add(1, Ordering::SeqCst);
                        let io = TokioIo::new(stream);
                        let handler = handler.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let handler = handler.clone();
                                async move { Ok::<_, Infallible>(handler(req).await) }
                            });
                            let _ = http1::Builder::new().serve_connection(io, service).await;
                        });
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Self {
            port,
            connections,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn xml_response(inner: &str) -> Response<Full<Bytes>> {
    let body = format!(
        "<?xml version=\"1.0\"?>\n<methodResponse>\n  <params>\n    <param>\n      \
         <value>{inner}</value>\n    </param>\n  </params>\n</methodResponse>\n"
    );
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/xml")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

#[tokio::test]
async fn test_call_frames_request_and_decodes_response() {
    let server = TestServer::start(handler(|req: Request<Incoming>| async move {
        assert_eq!(req.method(), hyper::Method::POST);
        assert_eq!(req.uri().path(), "/RPC2");
        assert_eq!(req.headers()["Content-Type"], "text/xml");

        let declared_len: usize = req.headers()["Content-Length"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let body = req.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.len(), declared_len);

        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("<methodName>rpc_ping</methodName>"));

        xml_response("<int>12345</int>")
    }))
    .await;

    let client = Client::new("127.0.0.1", server.port);
    let value = client.call("rpc_ping", &[]).await.unwrap();
    assert_eq!(value, Value::Int(12345));
}

#[tokio::test]
async fn test_fault_response_is_a_distinct_error() {
    let server = TestServer::start(handler(|_req| async move {
        let body = "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
                    <member><name>faultCode</name><value><int>7</int></value></member>\
                    <member><name>faultString</name><value>nope</value></member>\
                    </struct></value></fault></methodResponse>";
        Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/xml")
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }))
    .await;

    let client = Client::new("127.0.0.1", server.port);
    let err = client.call("whatever", &[]).await.unwrap_err();
    assert_eq!(err.fault(), Some(&Fault::new(7, "nope")));
}

#[tokio::test]
async fn test_connection_is_reused_across_calls() {
    let server =
        TestServer::start(handler(|_req| async move { xml_response("<int>1</int>") })).await;

    let client = Client::new("127.0.0.1", server.port);
    for _ in 0..3 {
        client.call("rpc_ping", &[]).await.unwrap();
    }
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn test_connection_close_triggers_redial() {
    let server = TestServer::start(handler(|_req| async move {
        let mut response = xml_response("<int>1</int>");
        response
            .headers_mut()
            .insert("Connection", "close".parse().unwrap());
        response
    }))
    .await;

    let client = Client::new("127.0.0.1", server.port);
    client.call("rpc_ping", &[]).await.unwrap();
    client.call("rpc_ping", &[]).await.unwrap();
    assert_eq!(server.connection_count(), 2);
}

#[tokio::test]
async fn test_userinfo_is_sent_as_basic_auth() {
    let server = TestServer::start(handler(|req: Request<Incoming>| async move {
        assert_eq!(
            req.headers()["Authorization"],
            "Basic YWxhZGRpbjpvcGVuc2VzYW1l"
        );
        xml_response("<boolean>1</boolean>")
    }))
    .await;

    let client = Client::new("127.0.0.1", server.port)
        .with_config(ClientConfig::default().with_user_info("aladdin:opensesame"));
    let value = client.call("login", &[]).await.unwrap();
    assert_eq!(value, Value::Bool(true));
}

#[tokio::test]
async fn test_second_concurrent_call_is_rejected() {
    let server = TestServer::start(handler(|_req| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        xml_response("<int>1</int>")
    }))
    .await;

    let client = Client::new("127.0.0.1", server.port);
    let slow = client.call("rpc_ping", &[]);
    let racing = async {
        // let the first call claim the sequence slot
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.call("rpc_ping", &[]).await
    };

    let (first, second) = tokio::join!(slow, racing);
    assert_eq!(first.unwrap(), Value::Int(1));
    assert!(matches!(second.unwrap_err(), ClientError::CallInFlight));

    // idle again: the next call goes through
    assert_eq!(client.call("rpc_ping", &[]).await.unwrap(), Value::Int(1));
}

#[tokio::test]
async fn test_non_success_status_is_a_status_error() {
    let server = TestServer::start(handler(|_req| async move {
        Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(Full::new(Bytes::from("Unknown method \"nope\"\n")))
            .unwrap()
    }))
    .await;

    let client = Client::new("127.0.0.1", server.port);
    let err = client.call("nope", &[]).await.unwrap_err();
    match err {
        ClientError::Status { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("Unknown method"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_json_codec_call() {
    let server = TestServer::start(handler(|req: Request<Incoming>| async move {
        assert_eq!(req.uri().path(), "/");
        assert_eq!(req.headers()["Content-Type"], "application/json");

        let body = req.into_body().collect().await.unwrap().to_bytes();
        let request: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(request["method"], "echo");
        assert_eq!(request["id"], 1);

        let response = serde_json::json!({
            "result": request["params"],
            "err": null,
        });
        Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(serde_json::to_vec(&response).unwrap())))
            .unwrap()
    }))
    .await;

    let client = Client::with_codec("127.0.0.1", server.port, Arc::new(JsonRpcCodec::new()));
    let value = client
        .call("echo", &[Value::Int(5), Value::Bool(true)])
        .await
        .unwrap();
    assert_eq!(value, Value::Array(vec![Value::Int(5), Value::Bool(true)]));
}

#[tokio::test]
async fn test_transport_error_when_nothing_listens() {
    // bind-then-drop to get a port with no listener
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = Client::new("127.0.0.1", port);
    let err = client.call("rpc_ping", &[]).await.unwrap_err();
    assert!(matches!(err, ClientError::Io(_)));
    assert!(err.fault().is_none());
}
