use futures::{SinkExt, StreamExt};
use profile_rpc::domain::ports::Store;
use profile_rpc::{AppConfig, Component, RegisterProfileEndpoint, ServiceError, SqliteStore, WampSession};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type RouterStream = WebSocketStream<TcpStream>;

const REGISTRATION: u64 = 77;

fn wamp_subprotocol(_request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    response
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("wamp.2.json"));
    Ok(response)
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> RouterStream {
    let (tcp, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_hdr_async(tcp, wamp_subprotocol)
        .await
        .unwrap()
}

async fn send(ws: &mut RouterStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn recv(ws: &mut RouterStream) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            _ => continue,
        }
    }
}

/// Answers HELLO and the one REGISTER, returning the registered URI.
async fn welcome_and_register(ws: &mut RouterStream) -> Value {
    let hello = recv(ws).await;
    assert_eq!(hello[0], json!(1));
    assert_eq!(hello[1], json!("realm1"));
    send(ws, json!([2, 4242, {"roles": {"dealer": {}}}])).await;

    let register = recv(ws).await;
    assert_eq!(register[0], json!(64));
    send(ws, json!([65, register[1], REGISTRATION])).await;
    register[3].clone()
}

fn config_for(url: &str) -> AppConfig {
    AppConfig::default().with_overrides(Some(url.to_string()), None, None)
}

fn endpoint() -> (Arc<RegisterProfileEndpoint>, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let endpoint =
        RegisterProfileEndpoint::new("io.crossbar.register", Arc::clone(&store)).unwrap();
    (Arc::new(endpoint), store)
}

#[tokio::test]
async fn test_component_serves_register_calls() {
    let (listener, url) = bind().await;

    let router = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let procedure = welcome_and_register(&mut ws).await;

        send(&mut ws, json!([68, 1, REGISTRATION, {}, ["A", "30", "180"]])).await;
        let first = recv(&mut ws).await;

        send(
            &mut ws,
            json!([68, 2, REGISTRATION, {}, [], {"name": "A", "age": "31", "height": "181"}]),
        )
        .await;
        let second = recv(&mut ws).await;

        send(&mut ws, json!([6, {}, "wamp.close.system_shutdown"])).await;
        let goodbye = recv(&mut ws).await;

        (procedure, first, second, goodbye)
    });

    let (endpoint, store) = endpoint();
    Component::new(&config_for(&url))
        .on_join(endpoint.clone())
        .register(endpoint)
        .run(std::future::pending::<()>())
        .await
        .unwrap();

    let (procedure, first, second, goodbye) = router.await.unwrap();
    assert_eq!(procedure, json!("io.crossbar.register"));

    assert_eq!(first[0], json!(70));
    assert_eq!(first[1], json!(1));
    let profile = &first[3][0];
    assert!(profile["id"].is_i64());
    assert_eq!(profile["name"], json!("A"));
    assert_eq!(profile["height"], json!("180"));

    assert_eq!(
        second,
        json!([8, 68, 2, {}, "wamp.error.invalid_argument", ["'name' must be unique"]])
    );
    assert_eq!(goodbye, json!([6, {}, "wamp.close.goodbye_and_out"]));
    assert_eq!(
        store.count(&profile_rpc::domain::model::PROFILE_SCHEMA).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_unknown_registration_gets_an_error() {
    let (listener, url) = bind().await;

    let router = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        welcome_and_register(&mut ws).await;

        send(&mut ws, json!([68, 9, 999, {}, ["A", "30", "180"]])).await;
        let reply = recv(&mut ws).await;

        send(&mut ws, json!([6, {}, "wamp.close.system_shutdown"])).await;
        recv(&mut ws).await;
        reply
    });

    let (endpoint, _) = endpoint();
    Component::new(&config_for(&url))
        .on_join(endpoint.clone())
        .register(endpoint)
        .run(std::future::pending::<()>())
        .await
        .unwrap();

    let reply = router.await.unwrap();
    assert_eq!(reply, json!([8, 68, 9, {}, "wamp.error.no_such_registration"]));
}

#[tokio::test]
async fn test_shutdown_says_goodbye() {
    let (listener, url) = bind().await;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let router = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        welcome_and_register(&mut ws).await;
        stop_tx.send(()).unwrap();
        let goodbye = recv(&mut ws).await;
        // Drain until the client's close frame ends the stream.
        while let Some(Ok(_)) = ws.next().await {}
        goodbye
    });

    let (endpoint, _) = endpoint();
    Component::new(&config_for(&url))
        .on_join(endpoint.clone())
        .register(endpoint)
        .run(async {
            let _ = stop_rx.await;
        })
        .await
        .unwrap();

    let goodbye = router.await.unwrap();
    assert_eq!(goodbye, json!([6, {}, "wamp.close.normal"]));
}

#[tokio::test]
async fn test_join_reports_abort() {
    let (listener, url) = bind().await;

    let router = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        recv(&mut ws).await;
        send(&mut ws, json!([3, {}, "wamp.error.no_such_realm"])).await;
    });

    let err = match WampSession::join(&url, "realm1").await {
        Ok(_) => panic!("join should have been aborted"),
        Err(e) => e,
    };
    assert!(matches!(
        err,
        ServiceError::Aborted { ref reason } if reason == "wamp.error.no_such_realm"
    ));
    router.await.unwrap();
}

#[tokio::test]
async fn test_unreadable_messages_do_not_end_the_session() {
    let (listener, url) = bind().await;

    let router = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        welcome_and_register(&mut ws).await;

        // UNREGISTERED is not handled by the callee, the second frame is not WAMP at all.
        send(&mut ws, json!([67, 5])).await;
        ws.send(Message::Text("not json".into())).await.unwrap();

        send(&mut ws, json!([68, 3, REGISTRATION, {}, ["A", "30", "180"]])).await;
        let reply = recv(&mut ws).await;

        send(&mut ws, json!([6, {}, "wamp.close.system_shutdown"])).await;
        let goodbye = recv(&mut ws).await;
        (reply, goodbye)
    });

    let (endpoint, _) = endpoint();
    Component::new(&config_for(&url))
        .on_join(endpoint.clone())
        .register(endpoint)
        .run(std::future::pending::<()>())
        .await
        .unwrap();

    let (reply, goodbye) = router.await.unwrap();
    assert_eq!(reply[0], json!(70));
    assert_eq!(reply[1], json!(3));
    assert_eq!(goodbye, json!([6, {}, "wamp.close.goodbye_and_out"]));
}
