//! WebSocket gateway for realtime dispatch events
//!
//! Provides `/api/dispatch/ws`. Three subscriber classes exist: companies
//! subscribe by geography key, riders by their own identity, admins to a
//! single global channel. Publishing is fire-and-forget over a tokio
//! broadcast channel and happens only after a transition has committed.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::models::dispatch_event::{Audience, DispatchEvent};

/// Fan-out handle injected into the state machine via `AppState`
#[derive(Clone)]
pub struct DispatchBroadcaster {
    tx: broadcast::Sender<DispatchEvent>,
}

impl DispatchBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self { tx }
    }

    /// Publish an event to all subscribers; no subscribers is not an error
    pub fn publish(&self, event: DispatchEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.tx.subscribe()
    }
}

impl Default for DispatchBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription request sent by the client as its first message
#[derive(Debug, Clone, Deserialize)]
pub struct WsSubscribeRequest {
    /// "subscribe" or "ping"
    pub action: String,
    /// "company", "rider" or "admin"
    pub role: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub rider_id: Option<String>,
}

/// What a connection is listening for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    Region { country: String, state: String },
    Rider { rider_id: String },
    Admin,
}

impl Subscription {
    /// Whether an event addressed to `audience` should reach this subscriber
    pub fn wants(&self, audience: &Audience) -> bool {
        match (self, audience) {
            (Subscription::Admin, Audience::Admin) => true,
            (
                Subscription::Region { country, state },
                Audience::Region {
                    country: ec,
                    state: es,
                },
            ) => country == ec && state == es,
            (Subscription::Rider { rider_id }, Audience::Rider { rider_id: er }) => rider_id == er,
            _ => false,
        }
    }
}

/// WebSocket message to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "subscribed")]
    Subscribed { role: String },
    #[serde(rename = "event")]
    Event(DispatchEvent),
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "pong")]
    Pong,
}

/// GET /api/dispatch/ws - realtime lifecycle event stream
pub async fn dispatch_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    info!("New dispatch WebSocket connection");

    let subscription = match wait_for_subscription(&mut receiver).await {
        Ok(sub) => sub,
        Err(e) => {
            let _ = sender
                .send(Message::Text(
                    serde_json::to_string(&WsMessage::Error { message: e })
                        .unwrap()
                        .into(),
                ))
                .await;
            return;
        }
    };

    let role = match &subscription {
        Subscription::Region { .. } => "company",
        Subscription::Rider { .. } => "rider",
        Subscription::Admin => "admin",
    };
    info!(role, "Dispatch subscription established");

    let _ = sender
        .send(Message::Text(
            serde_json::to_string(&WsMessage::Subscribed {
                role: role.to_string(),
            })
            .unwrap()
            .into(),
        ))
        .await;

    let mut broadcast_rx = state.events.subscribe();
    let mut heartbeat = tokio::time::interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => {
                match result {
                    Ok(event) => {
                        if subscription.wants(&event.audience) {
                            let msg = WsMessage::Event(event);
                            if let Err(e) = sender.send(Message::Text(
                                serde_json::to_string(&msg).unwrap().into()
                            )).await {
                                debug!("WebSocket send error: {}", e);
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Missed {} dispatch events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Dispatch broadcast channel closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if let Err(e) = sender.send(Message::Ping(axum::body::Bytes::new())).await {
                    debug!("Heartbeat failed: {}", e);
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(req) = serde_json::from_str::<WsSubscribeRequest>(&text) {
                            if req.action == "ping" {
                                let _ = sender.send(Message::Text(
                                    serde_json::to_string(&WsMessage::Pong).unwrap().into()
                                )).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Dispatch WebSocket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket receive error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn wait_for_subscription(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Result<Subscription, String> {
    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                return Err("Subscription timeout".to_string());
            }
            msg = receiver.next() => {
                let Some(Ok(Message::Text(text))) = msg else {
                    return Err("Connection closed before subscribing".to_string());
                };
                let req: WsSubscribeRequest = serde_json::from_str(&text)
                    .map_err(|e| format!("Invalid subscription request: {}", e))?;
                if req.action != "subscribe" {
                    continue;
                }
                return parse_subscription(req);
            }
        }
    }
}

fn parse_subscription(req: WsSubscribeRequest) -> Result<Subscription, String> {
    match req.role.as_deref() {
        Some("company") => {
            let country = req.country.ok_or("company subscription requires country")?;
            let state = req.state.ok_or("company subscription requires state")?;
            Ok(Subscription::Region { country, state })
        }
        Some("rider") => {
            let rider_id = req.rider_id.ok_or("rider subscription requires rider_id")?;
            Ok(Subscription::Rider { rider_id })
        }
        Some("admin") => Ok(Subscription::Admin),
        other => Err(format!("Unknown role: {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_subscription_filters_by_geography() {
        let sub = Subscription::Region {
            country: "NG".to_string(),
            state: "Lagos".to_string(),
        };
        assert!(sub.wants(&Audience::Region {
            country: "NG".to_string(),
            state: "Lagos".to_string()
        }));
        assert!(!sub.wants(&Audience::Region {
            country: "NG".to_string(),
            state: "Abuja".to_string()
        }));
        assert!(!sub.wants(&Audience::Admin));
    }

    #[test]
    fn test_rider_subscription_sees_only_own_offers() {
        let sub = Subscription::Rider {
            rider_id: "r1".to_string(),
        };
        assert!(sub.wants(&Audience::Rider {
            rider_id: "r1".to_string()
        }));
        assert!(!sub.wants(&Audience::Rider {
            rider_id: "r2".to_string()
        }));
    }

    #[test]
    fn test_admin_sees_only_admin_channel() {
        let sub = Subscription::Admin;
        assert!(sub.wants(&Audience::Admin));
        assert!(!sub.wants(&Audience::Rider {
            rider_id: "r1".to_string()
        }));
    }
}
