//! Message server
//!
//! One warp server per process carries both the socket endpoint and the
//! small HTTP surface peers and tools rely on:
//!
//! - `GET  /api/v1/services/runtime/getId` identity handshake
//! - `GET  /api/v1/services` registry
//! - `POST /api/v1/services/runtime/register` remote self-announcement
//! - `GET|POST /api/v1/services/{name}/{method}/{params...}` invoke
//! - `WS   /api/messages?id=<gatewayId>` duplex message socket

use crate::error::{NetworkError, Result};
use crate::event::{ApiRequest, ApiSender, LinkEvent, LinkSender};
use crate::handle::ConnectionHandle;
use futures_util::{SinkExt, StreamExt};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use types::{Direction, Message};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::Filter;

/// Path of the duplex message socket
pub const MESSAGES_PATH: &str = "/api/messages";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Local process id, answered by the handshake endpoint
    pub local_id: String,
    /// Full identity of the runtime service; HTTP invocations are sent as it
    pub runtime: String,
}

pub struct MessageServer {
    config: ServerConfig,
    links: LinkSender,
    api: ApiSender,
}

impl MessageServer {
    pub fn new(config: ServerConfig, links: LinkSender, api: ApiSender) -> Self {
        Self { config, links, api }
    }

    pub fn routes(&self) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let local_id = self.config.local_id.clone();
        let runtime = self.config.runtime.clone();
        let links = self.links.clone();
        let api = self.api.clone();

        let with_api = warp::any().map(move || api.clone());
        let with_links = warp::any().map(move || links.clone());
        let runtime_filter = {
            let runtime = runtime.clone();
            warp::any().map(move || runtime.clone())
        };

        let get_id = warp::path!("api" / "v1" / "services" / "runtime" / "getId")
            .and(warp::get())
            .map(move || warp::reply::json(&local_id));

        let registry = warp::path!("api" / "v1" / "services")
            .and(warp::get())
            .and(with_api.clone())
            .and(runtime_filter.clone())
            .and_then(|api: ApiSender, runtime: String| async move {
                let message = Message::new(runtime.clone(), "getRegistry", vec![]).with_sender(runtime);
                Ok::<_, warp::Rejection>(submit(&api, message).await)
            });

        let register = warp::path!("api" / "v1" / "services" / "runtime" / "register")
            .and(warp::post())
            .and(warp::body::json::<Value>())
            .and(with_api.clone())
            .and(runtime_filter.clone())
            .and_then(|record: Value, api: ApiSender, runtime: String| async move {
                let message = Message::new(runtime.clone(), "register", vec![record]).with_sender(runtime);
                Ok::<_, warp::Rejection>(submit(&api, message).await)
            });

        let invoke_get = warp::path!("api" / "v1" / "services" / String / String / ..)
            .and(warp::path::tail())
            .and(warp::get())
            .and(with_api.clone())
            .and(runtime_filter.clone())
            .and_then(
                |name: String, method: String, tail: warp::path::Tail, api: ApiSender, runtime: String| async move {
                    let message = Message::new(name, method, decode_params(tail.as_str()))
                        .with_sender(runtime);
                    Ok::<_, warp::Rejection>(submit(&api, message).await)
                },
            );

        let invoke_post = warp::path!("api" / "v1" / "services" / String / String)
            .and(warp::post())
            .and(warp::body::json::<Vec<Value>>())
            .and(with_api)
            .and(runtime_filter)
            .and_then(
                |name: String, method: String, data: Vec<Value>, api: ApiSender, runtime: String| async move {
                    let message = Message::new(name, method, data).with_sender(runtime);
                    Ok::<_, warp::Rejection>(submit(&api, message).await)
                },
            );

        let socket = warp::path!("api" / "messages")
            .and(warp::ws())
            .and(warp::query::<HashMap<String, String>>())
            .and(warp::addr::remote())
            .and(with_links)
            .map(
                |ws: warp::ws::Ws,
                 query: HashMap<String, String>,
                 remote: Option<SocketAddr>,
                 links: LinkSender| {
                    let gateway_id = query
                        .get("id")
                        .filter(|id| !id.is_empty())
                        .cloned()
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                    let url = remote
                        .map(|addr| format!("ws://{}{}", addr, MESSAGES_PATH))
                        .unwrap_or_else(|| MESSAGES_PATH.to_string());
                    ws.on_upgrade(move |socket| handle_socket(socket, gateway_id, url, links))
                },
            );

        get_id
            .or(registry)
            .or(register)
            .or(invoke_get)
            .or(invoke_post)
            .or(socket)
    }

    /// Serve until the task is dropped
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| NetworkError::configuration(format!("Invalid bind address: {}", e)))?;

        info!("Message server listening on {}", addr);
        warp::serve(self.routes()).run(addr).await;
        Ok(())
    }
}

/// Path segments are percent-encoded JSON; anything unparsable is a plain string
fn decode_params(tail: &str) -> Vec<Value> {
    tail.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy().to_string();
            serde_json::from_str(&decoded).unwrap_or(Value::String(decoded))
        })
        .collect()
}

async fn submit(api: &ApiSender, message: Message) -> warp::reply::WithStatus<warp::reply::Json> {
    let (reply, answer) = oneshot::channel();
    let method = message.method.clone();

    if api.send(ApiRequest { message, reply }).is_err() {
        warn!("Runtime unavailable for HTTP invoke of {}", method);
        return warp::reply::with_status(warp::reply::json(&Value::Null), StatusCode::SERVICE_UNAVAILABLE);
    }

    match answer.await {
        Ok(value) => warp::reply::with_status(warp::reply::json(&value), StatusCode::OK),
        Err(_) => warp::reply::with_status(
            warp::reply::json(&Value::Null),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    }
}

async fn handle_socket(ws: warp::ws::WebSocket, gateway_id: String, url: String, links: LinkSender) {
    use warp::ws::Message as WsMessage;

    info!("Inbound connection {} from {}", gateway_id, url);

    let (mut ws_sender, mut ws_receiver) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = ConnectionHandle::new(gateway_id.clone(), tx);
    let uuid = handle.uuid().to_string();

    if links
        .send(LinkEvent::Opened {
            gateway_id: gateway_id.clone(),
            url,
            direction: Direction::Inbound,
            handle,
        })
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(text) => {
                        if let Err(e) = ws_sender.send(WsMessage::text(text)).await {
                            warn!("Failed to send to {}: {}", gateway_id, e);
                            break;
                        }
                    }
                    None => {
                        debug!("Connection {} released locally", gateway_id);
                        let _ = ws_sender.close().await;
                        break;
                    }
                }
            }

            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(msg)) if msg.is_text() => {
                        let text = msg.to_str().unwrap_or_default().to_string();
                        if links
                            .send(LinkEvent::Message { gateway_id: gateway_id.clone(), text })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(msg)) if msg.is_close() => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Connection {} error: {}", gateway_id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!("Connection {} closed", gateway_id);
    let _ = links.send(LinkEvent::Closed { gateway_id, uuid });
}
