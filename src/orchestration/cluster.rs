/// Cluster broadcast channel between main instances
///
/// Every main publishes commands on a shared bus and every main (itself included)
/// receives them. `LocalClusterChannel` implements the bus with an in-process
/// broadcast channel and forwards published commands to configured peers over HTTP.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Header carrying the shared cluster token between peers
pub const CLUSTER_TOKEN_HEADER: &str = "x-mechaway-cluster-token";

/// Leadership view plus outbound publishing
#[async_trait]
pub trait ClusterChannel: Send + Sync {
    /// Whether this instance currently owns live triggers
    fn is_leader(&self) -> bool;

    /// Publish a command to every main instance
    async fn publish(&self, command: &str, payload: Value) -> Result<()>;
}

/// Envelope carried on the bus and between peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMessage {
    /// Instance that published the command
    pub sender_id: String,
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}

/// In-process cluster bus with HTTP fan-out to peers
#[derive(Debug)]
pub struct LocalClusterChannel {
    instance_id: String,
    /// Fixed at start-up from configuration
    leader: bool,
    tx: broadcast::Sender<ClusterMessage>,
    peers: Vec<String>,
    /// Shared secret required on inbound peer deliveries and sent on outbound ones
    token: Option<String>,
    http: reqwest::Client,
}

impl LocalClusterChannel {
    pub fn new(instance_id: impl Into<String>, leader: bool, peers: Vec<String>) -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            instance_id: instance_id.into(),
            leader,
            tx,
            peers,
            token: None,
            http: reqwest::Client::new(),
        }
    }

    /// Require `token` from peers and present it when forwarding
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Whether an inbound delivery presenting `token` may enter the bus.
    /// Without a configured token every delivery is accepted.
    pub fn accepts(&self, token: Option<&str>) -> bool {
        match &self.token {
            Some(expected) => token == Some(expected.as_str()),
            None => true,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Subscribe to every command delivered to this instance
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterMessage> {
        self.tx.subscribe()
    }

    /// Deliver a command received from a peer to local subscribers only
    pub fn deliver(&self, message: ClusterMessage) {
        tracing::debug!("📨 Received {} from {}", message.command, message.sender_id);
        if self.tx.send(message).is_err() {
            tracing::warn!("⚠️ No cluster listener running, dropping inbound command");
        }
    }

    async fn forward(&self, peer: &str, message: &ClusterMessage) -> Result<()> {
        let url = format!("{}/api/orchestration/messages", peer);
        let mut request = self.http.post(&url).json(message);
        if let Some(token) = &self.token {
            request = request.header(CLUSTER_TOKEN_HEADER, token);
        }
        request
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl ClusterChannel for LocalClusterChannel {
    fn is_leader(&self) -> bool {
        self.leader
    }

    async fn publish(&self, command: &str, payload: Value) -> Result<()> {
        let message = ClusterMessage {
            sender_id: self.instance_id.clone(),
            command: command.to_string(),
            payload,
        };

        if self.tx.send(message.clone()).is_err() {
            tracing::debug!("No local cluster listener for {}", command);
        }

        // Peer delivery is best effort; transport guarantees belong to the bus
        for peer in &self.peers {
            if let Err(e) = self.forward(peer, &message).await {
                tracing::warn!("⚠️ Failed to forward {} to peer {}: {}", command, peer, e);
            }
        }

        tracing::debug!("📤 Published {} to {} peers", command, self.peers.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_local_subscribers() {
        let channel = LocalClusterChannel::new("main-1", true, vec![]);
        let mut rx = channel.subscribe();

        channel.publish("workflow-updated", json!({ "workflowId": "w1" })).await.unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.sender_id, "main-1");
        assert_eq!(message.command, "workflow-updated");
        assert_eq!(message.payload, json!({ "workflowId": "w1" }));
    }

    #[tokio::test]
    async fn test_publish_without_listeners_succeeds() {
        let channel = LocalClusterChannel::new("main-1", true, vec![]);
        assert!(channel.publish("workflow-updated", json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_deliver_keeps_original_sender() {
        let channel = LocalClusterChannel::new("main-1", false, vec![]);
        let mut rx = channel.subscribe();

        channel.deliver(ClusterMessage {
            sender_id: "main-2".to_string(),
            command: "workflow-updated".to_string(),
            payload: json!({}),
        });

        assert_eq!(rx.recv().await.unwrap().sender_id, "main-2");
    }

    #[test]
    fn test_leadership_flag() {
        let follower = LocalClusterChannel::new("main-1", false, vec![]);
        let leader = LocalClusterChannel::new("main-2", true, vec![]);
        assert!(!follower.is_leader());
        assert!(leader.is_leader());
        assert_eq!(follower.instance_id(), "main-1");
    }

    #[test]
    fn test_token_gates_inbound_deliveries() {
        let open = LocalClusterChannel::new("main-1", true, vec![]);
        assert!(open.accepts(None));
        assert!(open.accepts(Some("anything")));

        let guarded = LocalClusterChannel::new("main-1", true, vec![]).with_token(Some("s3cret".to_string()));
        assert!(guarded.accepts(Some("s3cret")));
        assert!(!guarded.accepts(Some("guess")));
        assert!(!guarded.accepts(None));
    }

    #[test]
    fn test_message_defaults_missing_payload_to_null() {
        let message: ClusterMessage =
            serde_json::from_value(json!({ "senderId": "main-2", "command": "x" })).unwrap();
        assert_eq!(message.payload, Value::Null);
    }
}
