//! The handshake state machine (spec §4.3):
//!
//! ```text
//! waiting --receive request_connection--> waiting
//!       --same connection_key && allowed_type--> confirmed
//!       --mismatch--> expired
//! confirmed --peer close or read error--> disconnected
//! expired  --swept by server periodic task--> removed
//! ```

use crate::container::ValueContainer;
use crate::error::{Error, Result};
use crate::value::Value;

/// `session_type` requested by a client (spec §4.3's `request_connection`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    MessageLine,
    FileLine,
    BinaryLine,
}

impl SessionType {
    fn as_str(self) -> &'static str {
        match self {
            SessionType::MessageLine => "message_line",
            SessionType::FileLine => "file_line",
            SessionType::BinaryLine => "binary_line",
        }
    }

    fn from_str(s: &str) -> Option<SessionType> {
        match s {
            "message_line" => Some(SessionType::MessageLine),
            "file_line" => Some(SessionType::FileLine),
            "binary_line" => Some(SessionType::BinaryLine),
            _ => None,
        }
    }
}

/// The handshake's current phase for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Waiting,
    Confirmed,
    Expired,
    Disconnected,
}

/// Parsed `request_connection` payload.
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    pub source_id: String,
    pub source_sub_id: String,
    pub session_type: SessionType,
    pub compression_requested: bool,
    pub encryption_requested: bool,
    pub connection_key: String,
    pub snipping_targets: Vec<String>,
}

impl ConnectionRequest {
    pub fn to_container(&self) -> ValueContainer {
        let mut c = ValueContainer::addressed(
            "request_connection",
            self.source_id.clone(),
            self.source_sub_id.clone(),
            String::new(),
            String::new(),
        );
        c.add_root(Value::string("session_type", self.session_type.as_str()));
        c.add_root(Value::boolean("compression", self.compression_requested));
        c.add_root(Value::boolean("encryption", self.encryption_requested));
        c.add_root(Value::string("connection_key", &self.connection_key));
        let targets = Value::container("snipping_targets");
        for (i, t) in self.snipping_targets.iter().enumerate() {
            Value::add(&targets, Value::string(i.to_string(), t)).unwrap();
        }
        c.add_root(targets);
        c
    }

    pub fn from_container(c: &ValueContainer) -> Result<ConnectionRequest> {
        let session_type = c
            .find("session_type")
            .map(|v| v.lock().to_string(true))
            .and_then(|s| SessionType::from_str(&s))
            .ok_or_else(|| Error::ParseError("missing/invalid session_type".into()))?;
        let connection_key = c
            .find("connection_key")
            .map(|v| v.lock().to_string(true))
            .unwrap_or_default();
        let compression_requested = c.find("compression").map(|v| v.lock().to_bool()).unwrap_or(false);
        let encryption_requested = c.find("encryption").map(|v| v.lock().to_bool()).unwrap_or(false);
        let snipping_targets = c
            .find("snipping_targets")
            .map(|v| {
                v.lock()
                    .children()
                    .iter()
                    .map(|c| c.lock().to_string(true))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ConnectionRequest {
            source_id: c.source_id.clone(),
            source_sub_id: c.source_sub_id.clone(),
            session_type,
            compression_requested,
            encryption_requested,
            connection_key,
            snipping_targets,
        })
    }
}

/// `confirm_connection` payload sent back by the server.
#[derive(Debug, Clone)]
pub struct ConnectionConfirm {
    pub accepted: bool,
    pub assigned_id: String,
    pub assigned_sub_id: String,
    pub connection_key: String,
    pub encryption_key_iv_base64: Option<(String, String)>,
    pub kill_code: bool,
}

impl ConnectionConfirm {
    pub fn to_container(&self) -> ValueContainer {
        let mut c = ValueContainer::addressed(
            "confirm_connection",
            self.assigned_id.clone(),
            self.assigned_sub_id.clone(),
            String::new(),
            String::new(),
        );
        c.add_root(Value::boolean("accepted", self.accepted));
        c.add_root(Value::string("connection_key", &self.connection_key));
        c.add_root(Value::boolean("kill_code", self.kill_code));
        if let Some((key, iv)) = &self.encryption_key_iv_base64 {
            c.add_root(Value::string("key", key));
            c.add_root(Value::string("iv", iv));
        }
        c
    }

    pub fn from_container(c: &ValueContainer) -> ConnectionConfirm {
        ConnectionConfirm {
            accepted: c.find("accepted").map(|v| v.lock().to_bool()).unwrap_or(false),
            assigned_id: c.source_id.clone(),
            assigned_sub_id: c.source_sub_id.clone(),
            connection_key: c
                .find("connection_key")
                .map(|v| v.lock().to_string(true))
                .unwrap_or_default(),
            encryption_key_iv_base64: match (c.find("key"), c.find("iv")) {
                (Some(k), Some(iv)) => {
                    Some((k.lock().to_string(true), iv.lock().to_string(true)))
                }
                _ => None,
            },
            kill_code: c.find("kill_code").map(|v| v.lock().to_bool()).unwrap_or(false),
        }
    }
}

/// Evaluates a `request_connection` against the server's expected key
/// and allowed session types, per spec §4.3's transition rules.
pub fn evaluate_request(
    request: &ConnectionRequest,
    expected_key: &str,
    allowed_types: &[SessionType],
) -> HandshakeState {
    if request.connection_key == expected_key && allowed_types.contains(&request.session_type) {
        HandshakeState::Confirmed
    } else {
        HandshakeState::Expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(key: &str) -> ConnectionRequest {
        ConnectionRequest {
            source_id: "client-1".into(),
            source_sub_id: "0".into(),
            session_type: SessionType::MessageLine,
            compression_requested: true,
            encryption_requested: true,
            connection_key: key.into(),
            snipping_targets: vec!["peer-a".into(), "peer-b".into()],
        }
    }

    #[test]
    fn matching_key_and_allowed_type_confirms() {
        let req = sample_request("secret");
        let state = evaluate_request(&req, "secret", &[SessionType::MessageLine]);
        assert_eq!(state, HandshakeState::Confirmed);
    }

    #[test]
    fn mismatched_key_expires() {
        let req = sample_request("wrong");
        let state = evaluate_request(&req, "secret", &[SessionType::MessageLine]);
        assert_eq!(state, HandshakeState::Expired);
    }

    #[test]
    fn disallowed_session_type_expires() {
        let req = sample_request("secret");
        let state = evaluate_request(&req, "secret", &[SessionType::BinaryLine]);
        assert_eq!(state, HandshakeState::Expired);
    }

    #[test]
    fn request_round_trips_through_container() {
        let req = sample_request("secret");
        let container = req.to_container();
        let parsed = ConnectionRequest::from_container(&container).unwrap();
        assert_eq!(parsed.connection_key, "secret");
        assert_eq!(parsed.session_type, SessionType::MessageLine);
        assert_eq!(parsed.snipping_targets, vec!["peer-a", "peer-b"]);
    }

    #[test]
    fn confirm_round_trips_with_key_material() {
        let confirm = ConnectionConfirm {
            accepted: true,
            assigned_id: "srv".into(),
            assigned_sub_id: "1".into(),
            connection_key: "secret".into(),
            encryption_key_iv_base64: Some(("a2V5".into(), "aXY=".into())),
            kill_code: false,
        };
        let container = confirm.to_container();
        let parsed = ConnectionConfirm::from_container(&container);
        assert!(parsed.accepted);
        assert!(!parsed.kill_code);
        assert_eq!(
            parsed.encryption_key_iv_base64,
            Some(("a2V5".to_string(), "aXY=".to_string()))
        );
    }
}
