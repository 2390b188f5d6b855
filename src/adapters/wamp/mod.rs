//! Callee side of a WAMP v2 session over WebSocket (JSON serialization).

pub mod message;

pub use message::WampMessage;

use crate::domain::ports::{Invocation, Procedure, SessionDetails};
use crate::utils::error::{Result, ServiceError};
use futures::{SinkExt, StreamExt};
use message::{CLOSE_NORMAL, GOODBYE_AND_OUT, INVOCATION, NO_SUCH_REGISTRATION, SUBPROTOCOL};
use serde_json::Map;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WampSession {
    stream: WsStream,
    details: SessionDetails,
    next_request: u64,
    registrations: HashMap<u64, Arc<dyn Procedure>>,
}

impl WampSession {
    /// Connects to the router and joins `realm`.
    pub async fn join(url: &str, realm: &str) -> Result<Self> {
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
        let (mut stream, _) = tokio_tungstenite::connect_async(request).await?;

        send(&mut stream, &WampMessage::hello(realm)).await?;
        match receive(&mut stream).await? {
            WampMessage::Welcome { session, .. } => {
                tracing::debug!("Joined realm '{}' as session {}", realm, session);
                Ok(Self {
                    stream,
                    details: SessionDetails {
                        session_id: session,
                        realm: realm.to_string(),
                    },
                    next_request: 0,
                    registrations: HashMap::new(),
                })
            }
            WampMessage::Abort { reason, .. } => Err(ServiceError::Aborted { reason }),
            other => Err(ServiceError::protocol(format!(
                "expected WELCOME, got {:?}",
                other
            ))),
        }
    }

    pub fn details(&self) -> &SessionDetails {
        &self.details
    }

    fn next_request_id(&mut self) -> u64 {
        self.next_request += 1;
        self.next_request
    }

    /// Registers `procedure` under its URI and returns the registration id.
    pub async fn register(&mut self, procedure: Arc<dyn Procedure>) -> Result<u64> {
        let request = self.next_request_id();
        let uri = procedure.uri().to_string();
        send(
            &mut self.stream,
            &WampMessage::Register {
                request,
                options: Map::new(),
                procedure: uri.clone(),
            },
        )
        .await?;

        loop {
            match receive(&mut self.stream).await? {
                WampMessage::Registered {
                    request: answered,
                    registration,
                } if answered == request => {
                    tracing::info!("Registered procedure {} ({})", uri, registration);
                    self.registrations.insert(registration, procedure);
                    return Ok(registration);
                }
                WampMessage::Error {
                    request: answered,
                    error,
                    ..
                } if answered == request => {
                    return Err(ServiceError::protocol(format!(
                        "registering {} failed: {}",
                        uri, error
                    )));
                }
                WampMessage::Abort { reason, .. } => return Err(ServiceError::Aborted { reason }),
                other => tracing::debug!("Ignoring {:?} while registering {}", other, uri),
            }
        }
    }

    /// Serves invocations until the router says goodbye, the connection
    /// closes, or `shutdown` completes. Each invocation runs as its own task.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let WampSession {
            stream,
            registrations,
            details,
            ..
        } = self;
        let (mut sink, mut source) = stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<WampMessage>();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Leaving session {}", details.session_id);
                    let goodbye = WampMessage::Goodbye {
                        details: Map::new(),
                        reason: CLOSE_NORMAL.to_string(),
                    };
                    sink.send(Message::Text(goodbye.to_text()?.into())).await?;
                    sink.close().await?;
                    return Ok(());
                }
                incoming = source.next() => {
                    let text = match incoming {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Router closed session {}", details.session_id);
                            return Ok(());
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                    };

                    let message = match WampMessage::from_text(text.as_str()) {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::warn!("Ignoring unreadable message {}: {}", text.as_str(), e);
                            continue;
                        }
                    };

                    match message {
                        WampMessage::Invocation { request, registration, args, kwargs, .. } => {
                            match registrations.get(&registration) {
                                Some(procedure) => {
                                    let procedure = Arc::clone(procedure);
                                    let outgoing_tx = outgoing_tx.clone();
                                    tokio::spawn(async move {
                                        let answer = dispatch(procedure, request, Invocation { args, kwargs }).await;
                                        // The receiver only goes away once the session has ended.
                                        let _ = outgoing_tx.send(answer);
                                    });
                                }
                                None => {
                                    tracing::warn!("Invocation for unknown registration {}", registration);
                                    let error = WampMessage::Error {
                                        request_type: INVOCATION,
                                        request,
                                        details: Map::new(),
                                        error: NO_SUCH_REGISTRATION.to_string(),
                                        args: Vec::new(),
                                        kwargs: Map::new(),
                                    };
                                    sink.send(Message::Text(error.to_text()?.into())).await?;
                                }
                            }
                        }
                        WampMessage::Goodbye { reason, .. } => {
                            tracing::info!("Router ended session {}: {}", details.session_id, reason);
                            let goodbye = WampMessage::Goodbye {
                                details: Map::new(),
                                reason: GOODBYE_AND_OUT.to_string(),
                            };
                            sink.send(Message::Text(goodbye.to_text()?.into())).await?;
                            return Ok(());
                        }
                        WampMessage::Abort { reason, .. } => {
                            return Err(ServiceError::Aborted { reason });
                        }
                        other => tracing::debug!("Ignoring {:?}", other),
                    }
                }
                Some(answer) = outgoing_rx.recv() => {
                    sink.send(Message::Text(answer.to_text()?.into())).await?;
                }
            }
        }
    }
}

async fn dispatch(procedure: Arc<dyn Procedure>, request: u64, invocation: Invocation) -> WampMessage {
    match procedure.invoke(invocation).await {
        Ok(reply) => WampMessage::Yield {
            request,
            options: Map::new(),
            args: reply.args,
            kwargs: reply.kwargs,
        },
        Err(e) => WampMessage::Error {
            request_type: INVOCATION,
            request,
            details: Map::new(),
            error: e.error,
            args: e.args,
            kwargs: Map::new(),
        },
    }
}

async fn send(stream: &mut WsStream, message: &WampMessage) -> Result<()> {
    stream.send(Message::Text(message.to_text()?.into())).await?;
    Ok(())
}

/// Next WAMP message, skipping control frames.
async fn receive(stream: &mut WsStream) -> Result<WampMessage> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return WampMessage::from_text(text.as_str()),
            Some(Ok(Message::Close(_))) | None => {
                return Err(ServiceError::protocol("router closed the connection"))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}
