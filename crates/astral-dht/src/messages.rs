//! Typed DHT message envelopes.
//!
//! Three request kinds (ping, find-node, announce), each with a paired
//! response. The envelope schema is explicit: unknown fields are rejected,
//! optional fields (`target_id`, `closest_nodes`) are present only where the
//! kind requires them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use astral_crypto::ed25519::IdentityKey;
use astral_types::{attestation, unix_now, Attestation, System, SystemId, PROTOCOL_VERSION};

use crate::DhtError;

/// The three DHT operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Ping,
    FindNode,
    Announce,
}

impl MessageKind {
    /// Attestation message-type string for a request of this kind.
    pub fn request_attestation_type(&self) -> &'static str {
        match self {
            MessageKind::Ping => attestation::MSG_DHT_PING,
            MessageKind::FindNode => attestation::MSG_DHT_FIND_NODE,
            MessageKind::Announce => attestation::MSG_DHT_ANNOUNCE,
        }
    }

    /// Attestation message-type string for a response of this kind.
    pub fn response_attestation_type(&self) -> &'static str {
        match self {
            MessageKind::Ping => attestation::MSG_DHT_PING_RESPONSE,
            MessageKind::FindNode => attestation::MSG_DHT_FIND_NODE_RESPONSE,
            MessageKind::Announce => attestation::MSG_DHT_ANNOUNCE_RESPONSE,
        }
    }

    /// The expected attestation string for a message of this kind.
    pub fn attestation_type(&self, is_response: bool) -> &'static str {
        if is_response {
            self.response_attestation_type()
        } else {
            self.request_attestation_type()
        }
    }
}

/// The wire envelope for every DHT exchange.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DhtMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Protocol version string.
    pub version: String,
    /// Full record of the sender. Required; optional in the schema so its
    /// absence maps to a 400 instead of a parse failure.
    #[serde(default)]
    pub from_system: Option<System>,
    /// Signed sender proof. Required; optional in the schema so its absence
    /// maps to a 401.
    #[serde(default)]
    pub attestation: Option<Attestation>,
    pub is_response: bool,
    /// Correlates a response with its request.
    pub request_id: String,
    /// Find-node requests: the system being searched for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<SystemId>,
    /// Find-node responses: the shareable systems closest to the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closest_nodes: Option<Vec<System>>,
}

impl DhtMessage {
    /// Build and sign a request from the local system to `to`.
    ///
    /// `to` may be the nil UUID when the recipient's id is not yet known.
    pub fn request(kind: MessageKind, from: &System, key: &IdentityKey, to: SystemId) -> Self {
        let attestation = Attestation::sign(
            key,
            from.id,
            to,
            kind.request_attestation_type(),
            unix_now(),
        );
        Self {
            kind,
            version: PROTOCOL_VERSION.to_string(),
            from_system: Some(from.clone()),
            attestation: Some(attestation),
            is_response: false,
            request_id: Uuid::new_v4().to_string(),
            target_id: None,
            closest_nodes: None,
        }
    }

    /// Build and sign the response to a validated request.
    pub fn response(
        kind: MessageKind,
        from: &System,
        key: &IdentityKey,
        to: SystemId,
        request_id: String,
    ) -> Self {
        let attestation = Attestation::sign(
            key,
            from.id,
            to,
            kind.response_attestation_type(),
            unix_now(),
        );
        Self {
            kind,
            version: PROTOCOL_VERSION.to_string(),
            from_system: Some(from.clone()),
            attestation: Some(attestation),
            is_response: true,
            request_id,
            target_id: None,
            closest_nodes: None,
        }
    }
}

/// Wire shape of an error reply: `{ "error": { "code": .., "message": .. } }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
}

impl ErrorBody {
    pub fn from_error(err: &DhtError) -> Self {
        Self {
            error: ErrorDetail {
                code: err.code(),
                message: err.to_string(),
            },
        }
    }

    pub fn into_error(self) -> DhtError {
        DhtError::from_wire(self.error.code, self.error.message)
    }
}
