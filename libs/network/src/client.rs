//! Outbound connections
//!
//! The remote process id is fetched over HTTP *before* the WebSocket is
//! opened, so every link is addressed from its first frame. There is no
//! timeout and no reconnect: a failed attempt is reported once as
//! [`LinkEvent::ConnectFailed`].

use crate::error::{NetworkError, Result};
use crate::event::{LinkEvent, LinkSender};
use crate::handle::ConnectionHandle;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};
use types::Direction;
use url::Url;

/// Identity handshake endpoint served by every runtime
pub const GET_ID_PATH: &str = "/api/v1/services/runtime/getId";

/// `ws(s)://host:port/...` to `http(s)://host:port/api/v1/services/runtime/getId`
pub fn handshake_url(ws_url: &str) -> Result<Url> {
    let mut url = Url::parse(ws_url)?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(NetworkError::configuration(format!(
                "Unsupported scheme '{}' in {}",
                other, ws_url
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| NetworkError::configuration(format!("Cannot rewrite scheme of {}", ws_url)))?;
    url.set_path(GET_ID_PATH);
    url.set_query(None);
    Ok(url)
}

/// Add `?id=<local_id>` so the peer can name this link after us
pub fn socket_url(ws_url: &str, local_id: &str) -> Result<Url> {
    let mut url = Url::parse(ws_url)?;
    if !url.query_pairs().any(|(k, _)| k == "id") {
        url.query_pairs_mut().append_pair("id", local_id);
    }
    Ok(url)
}

pub async fn fetch_remote_id(http: &reqwest::Client, ws_url: &str) -> Result<String> {
    let url = handshake_url(ws_url)?;
    debug!("Fetching remote id from {}", url);

    let id: String = http
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    if id.is_empty() || id.contains('@') {
        return Err(NetworkError::handshake(format!(
            "{} answered an invalid process id '{}'",
            url, id
        )));
    }
    Ok(id)
}

/// Connect in the background, reporting the outcome on `links`
pub fn spawn_connect(url: String, local_id: String, links: LinkSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(error) = run_link(&url, &local_id, &links).await {
            warn!("Connection to {} failed: {}", url, error);
            let _ = links.send(LinkEvent::ConnectFailed { url, error });
        }
    })
}

async fn run_link(url: &str, local_id: &str, links: &LinkSender) -> Result<()> {
    let http = reqwest::Client::new();
    let remote_id = fetch_remote_id(&http, url).await?;
    info!("Remote process at {} is {}", url, remote_id);

    let target = socket_url(url, local_id)?;
    let (ws_stream, _) = connect_async(target.as_str()).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = ConnectionHandle::new(remote_id.clone(), tx);
    let uuid = handle.uuid().to_string();

    links
        .send(LinkEvent::Opened {
            gateway_id: remote_id.clone(),
            url: url.to_string(),
            direction: Direction::Outbound,
            handle,
        })
        .map_err(|_| NetworkError::connection("runtime stopped listening", Some(url)))?;

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(text) => {
                        if let Err(e) = ws_sender.send(WsMessage::Text(text)).await {
                            warn!("Failed to send to {}: {}", remote_id, e);
                            break;
                        }
                    }
                    None => {
                        debug!("Link {} released locally", remote_id);
                        let _ = ws_sender.close().await;
                        break;
                    }
                }
            }

            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        if links
                            .send(LinkEvent::Message { gateway_id: remote_id.clone(), text })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("Link {} closed by peer", remote_id);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Link {} error: {}", remote_id, e);
                        break;
                    }
                }
            }
        }
    }

    let _ = links.send(LinkEvent::Closed {
        gateway_id: remote_id,
        uuid,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_url() {
        let url = handshake_url("ws://localhost:3001/api/messages?id=P1").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3001/api/v1/services/runtime/getId");

        let url = handshake_url("wss://robot.local/api/messages").unwrap();
        assert_eq!(url.as_str(), "https://robot.local/api/v1/services/runtime/getId");

        assert!(handshake_url("ftp://robot.local/").is_err());
        assert!(handshake_url("not a url").is_err());
    }

    #[test]
    fn test_socket_url_adds_id_once() {
        let url = socket_url("ws://localhost:3001/api/messages", "P1").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:3001/api/messages?id=P1");

        let url = socket_url("ws://localhost:3001/api/messages?id=custom", "P1").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:3001/api/messages?id=custom");
    }

    #[tokio::test]
    async fn test_unreachable_peer_reports_failure() {
        let (links, mut events) = mpsc::unbounded_channel();
        spawn_connect(
            "ws://127.0.0.1:1/api/messages".to_string(),
            "P1".to_string(),
            links,
        )
        .await
        .unwrap();

        match events.recv().await {
            Some(LinkEvent::ConnectFailed { url, .. }) => {
                assert_eq!(url, "ws://127.0.0.1:1/api/messages")
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
