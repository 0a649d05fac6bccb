use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChatMessage;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated and ready.
    Ready { phone: String },

    /// Full ordered message list for a request. Sent once on subscribe and
    /// again after every append, so the client never has to merge deltas.
    MessageList {
        request_id: Uuid,
        messages: Vec<ChatMessage>,
    },
}

impl GatewayEvent {
    /// Returns the request_id if this event is scoped to a single request.
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageList { request_id, .. } => Some(*request_id),
            Self::Ready { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start receiving message-list updates for a request.
    Subscribe { request_id: Uuid },

    /// Stop receiving updates for a request.
    Unsubscribe { request_id: Uuid },
}
