use flowboard_types::{Value, create_id, sync::DashMap};
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Root layer marker used in `layer_path` when a peer looks at the board
/// itself rather than a collapsed layer.
pub const ROOT_LAYER: &str = "root";

pub fn room_id(app_id: &str, board_id: &str) -> String {
    format!("{}:{}", app_id, board_id)
}

/// Short-lived, board-scoped credentials for joining a realtime room.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct RealtimeAccess {
    pub url: String,
    pub token: String,
    pub room: String,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default)]
pub struct AwarenessUser {
    pub id: Option<String>,
    pub name: String,
    pub color: String,
    pub avatar: Option<String>,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq)]
pub struct CursorPosition {
    pub x: f32,
    pub y: f32,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default)]
pub struct Selection {
    pub nodes: Vec<String>,
}

/// What each peer publishes into the room. The substrate never carries the
/// board document itself; `board_update` is an opaque marker a peer bumps
/// to tell others to refetch.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct AwarenessState {
    pub user: AwarenessUser,
    pub cursor: Option<CursorPosition>,
    pub layer_path: String,
    pub selection: Selection,
    pub board_update: Option<Value>,
}

impl Default for AwarenessState {
    fn default() -> Self {
        AwarenessState {
            user: AwarenessUser::default(),
            cursor: None,
            layer_path: ROOT_LAYER.to_string(),
            selection: Selection::default(),
            board_update: None,
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct PeerState {
    pub client_id: String,
    /// Client-local clock; updates with a stale clock are dropped.
    pub clock: u64,
    pub state: AwarenessState,
    /// Peers whose token failed verification stay on the channel but are
    /// excluded from aggregates.
    pub valid: bool,
}

#[derive(Debug, Clone)]
pub struct AwarenessUpdate {
    pub room: String,
    pub peer: PeerState,
}

/// Server-side awareness state of one room. Fan-out is at-least-once via a
/// broadcast channel; consumers that lag simply miss intermediate updates
/// and converge on the next one.
pub struct RoomAwareness {
    pub room: String,
    peers: DashMap<String, PeerState>,
    tx: broadcast::Sender<AwarenessUpdate>,
}

impl RoomAwareness {
    const CHANNEL_CAPACITY: usize = 256;

    pub fn new(room: &str) -> Self {
        let (tx, _rx) = broadcast::channel(Self::CHANNEL_CAPACITY);
        RoomAwareness {
            room: room.to_string(),
            peers: DashMap::new(),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AwarenessUpdate> {
        self.tx.subscribe()
    }

    /// Apply and fan out a peer update. Returns false when the update was
    /// stale (clock not beyond what the room already holds).
    pub fn publish(&self, client_id: &str, clock: u64, state: AwarenessState) -> bool {
        let mut accepted = true;
        let peer = {
            let mut entry = self
                .peers
                .entry(client_id.to_string())
                .or_insert_with(|| PeerState {
                    client_id: client_id.to_string(),
                    clock: 0,
                    state: AwarenessState::default(),
                    valid: true,
                });

            if entry.clock >= clock && entry.clock != 0 {
                accepted = false;
            } else {
                entry.clock = clock;
                entry.state = state;
            }
            entry.value().clone()
        };

        if accepted {
            let _ = self.tx.send(AwarenessUpdate {
                room: self.room.clone(),
                peer,
            });
        }
        accepted
    }

    /// Keep the peer on the channel, but flag it so aggregates skip it.
    pub fn mark_invalid(&self, client_id: &str) {
        if let Some(mut entry) = self.peers.get_mut(client_id) {
            entry.valid = false;
        }
    }

    pub fn remove_peer(&self, client_id: &str) {
        self.peers.remove(client_id);
    }

    /// All valid peers' current state.
    pub fn aggregate(&self) -> Vec<PeerState> {
        let mut peers: Vec<PeerState> = self
            .peers
            .iter()
            .filter(|entry| entry.valid)
            .map(|entry| entry.value().clone())
            .collect();
        peers.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        peers
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

/// Registry of rooms keyed by `"{app_id}:{board_id}"`.
#[derive(Default)]
pub struct AwarenessHub {
    rooms: DashMap<String, Arc<RoomAwareness>>,
}

impl AwarenessHub {
    pub fn new() -> Self {
        AwarenessHub {
            rooms: DashMap::new(),
        }
    }

    pub fn get_or_create(&self, room: &str) -> Arc<RoomAwareness> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| Arc::new(RoomAwareness::new(room)))
            .value()
            .clone()
    }

    pub fn get(&self, room: &str) -> Option<Arc<RoomAwareness>> {
        self.rooms.get(room).map(|entry| entry.value().clone())
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting,
}

/// Exponential backoff with jitter for the reconnect loop.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        let capped = exp.min(self.max_delay);
        // Up to 25% jitter so reconnect storms spread out.
        let jitter_ms = {
            use flowboard_types::rand::Rng;
            let quarter = (capped.as_millis() as u64 / 4).max(1);
            flowboard_types::rand::rng().random_range(0..quarter)
        };
        capped + Duration::from_millis(jitter_ms)
    }
}

pub type Connector =
    Arc<dyn Fn() -> BoxFuture<'static, flowboard_types::Result<()>> + Send + Sync>;

/// Client-side connection handle. The transport itself is external; this
/// tracks status, keeps the client id stable across reconnects and drives
/// the backoff loop.
pub struct RealtimeClient {
    pub client_id: String,
    policy: ReconnectPolicy,
    status_tx: watch::Sender<ConnectionStatus>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl RealtimeClient {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        RealtimeClient {
            client_id: create_id(),
            policy,
            status_tx,
            status_rx,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    pub fn status_stream(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    pub fn mark_disconnected(&self) {
        let _ = self.status_tx.send(ConnectionStatus::Disconnected);
    }

    /// Establish (or re-establish) the connection with exponential backoff.
    /// The client id survives every retry.
    pub async fn connect(&self, connector: Connector) -> flowboard_types::Result<()> {
        let mut attempt: u32 = 0;

        loop {
            let _ = self.status_tx.send(ConnectionStatus::Reconnecting);

            match (connector)().await {
                Ok(()) => {
                    let _ = self.status_tx.send(ConnectionStatus::Connected);
                    return Ok(());
                }
                Err(err) => {
                    if let Some(max) = self.policy.max_attempts {
                        if attempt + 1 >= max {
                            let _ = self.status_tx.send(ConnectionStatus::Disconnected);
                            return Err(err);
                        }
                    }
                    let delay = self.policy.delay_for(attempt);
                    tracing::debug!(
                        "Realtime connect attempt {} failed, retrying in {:?}: {}",
                        attempt,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn stale_clocks_are_dropped() {
        let room = RoomAwareness::new("app:board");

        assert!(room.publish("peer-a", 1, AwarenessState::default()));
        assert!(room.publish("peer-a", 2, AwarenessState::default()));
        assert!(!room.publish("peer-a", 2, AwarenessState::default()));
        assert!(!room.publish("peer-a", 1, AwarenessState::default()));

        assert_eq!(room.aggregate().len(), 1);
        assert_eq!(room.aggregate()[0].clock, 2);
    }

    #[test]
    fn invalid_peers_are_excluded_from_aggregates() {
        let room = RoomAwareness::new("app:board");
        room.publish("peer-a", 1, AwarenessState::default());
        room.publish("peer-b", 1, AwarenessState::default());

        room.mark_invalid("peer-b");

        let aggregate = room.aggregate();
        assert_eq!(aggregate.len(), 1);
        assert_eq!(aggregate[0].client_id, "peer-a");
        // The channel itself is not dropped.
        assert_eq!(room.peer_count(), 2);
    }

    #[tokio::test]
    async fn updates_fan_out_to_subscribers() {
        let room = RoomAwareness::new("app:board");
        let mut rx = room.subscribe();

        let mut state = AwarenessState::default();
        state.user.name = "ada".to_string();
        room.publish("peer-a", 1, state);

        let update = rx.recv().await.unwrap();
        assert_eq!(update.peer.client_id, "peer-a");
        assert_eq!(update.peer.state.user.name, "ada");
    }

    #[tokio::test]
    async fn reconnect_preserves_client_id_and_backs_off() {
        let client = RealtimeClient::new(ReconnectPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            max_attempts: Some(10),
        });
        let original_id = client.client_id.clone();

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let connector: Connector = Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(flowboard_types::anyhow!("connection refused"))
                } else {
                    Ok(())
                }
            })
        });

        client.connect(connector).await.unwrap();
        assert_eq!(client.status(), ConnectionStatus::Connected);
        assert_eq!(client.client_id, original_id);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn room_ids_are_scoped_per_board() {
        assert_eq!(room_id("app-1", "board-9"), "app-1:board-9");
    }
}
