//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::audio::AudioDevice;
use crate::devices::TargetDeviceBinding;
use crate::events::ChangeEvent;
use crate::service::ServiceStatus;

/// Requests from the menu bar app to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Read the current mute state
    Query,

    /// Flip the mute state
    Toggle,

    /// Set an explicit mute state
    SetMuted { muted: bool },

    /// Current device list and headset binding
    ListDevices,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to mute change notifications
    Subscribe,
}

/// Responses from daemon to the menu bar app
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Mute state after a query, toggle or set
    MuteState { muted: bool },

    /// Device snapshot
    Devices {
        devices: Vec<AudioDevice>,
        binding: TargetDeviceBinding,
    },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Mute state flipped; re-query if the latest value matters
    MuteChanged { previous: bool, current: bool },
}

impl From<ChangeEvent> for Notification {
    fn from(event: ChangeEvent) -> Self {
        Notification::MuteChanged {
            previous: event.previous,
            current: event.current,
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Authoritative mute state
    pub muted: bool,

    /// Whether the hardware gesture callback is registered
    pub gesture_active: bool,

    /// Whether the fallback poller is running
    pub polling: bool,

    /// Name of the bound target headset, if attached
    pub target_device: Option<String>,

    /// Whether the target headset is the default input
    pub target_is_input: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            muted: false,
            gesture_active: false,
            polling: false,
            target_device: None,
            target_is_input: false,
            uptime_secs: 0,
        }
    }
}

/// Convert the service's status into the wire form
impl From<ServiceStatus> for DaemonStatus {
    fn from(status: ServiceStatus) -> Self {
        Self {
            muted: status.muted,
            gesture_active: status.gesture_active,
            polling: status.polling,
            target_device: status.target_device,
            target_is_input: status.target_is_input,
            uptime_secs: status.uptime_secs,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::SetMuted { muted: true };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("set_muted"));
        assert!(json.contains("true"));
    }

    #[test]
    fn test_request_deserialization() {
        let req: Request = serde_json::from_str(r#"{"type":"toggle"}"#).unwrap();
        assert!(matches!(req, Request::Toggle));
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_notification_from_event() {
        let note = Notification::from(ChangeEvent {
            previous: false,
            current: true,
        });
        let json = serde_json::to_string(&note).unwrap();
        assert_eq!(json, r#"{"type":"mute_changed","previous":false,"current":true}"#);
    }
}
