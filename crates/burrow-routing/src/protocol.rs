//! Wire messages exchanged with the privileged routing service.
//!
//! Each transport write carries exactly one JSON object with no delimiter.
//! Requests name an `action` and a flat `parameters` map; responses and
//! events echo the action and add a numeric `statusCode`:
//!
//! ```text
//! -> {"action":"configureRouting","parameters":{"isAutoConnect":false,"proxyIp":"203.0.113.5","routerIp":"10.0.85.1"}}
//! <- {"action":"configureRouting","statusCode":0}
//! -> {"action":"resetRouting","parameters":{}}
//! <- {"action":"resetRouting","statusCode":0}
//! ```

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

/// Actions understood by the routing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum RoutingAction {
    /// Install routes sending system traffic through the virtual interface.
    ConfigureRouting,
    /// Remove the installed routes.
    ResetRouting,
    /// Unsolicited notification from the service.
    StatusChanged,
}

/// Value stored in a request's `parameters` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// String parameter.
    Text(String),
    /// Boolean parameter.
    Flag(bool),
}

/// Request written to the routing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingRequest {
    action: RoutingAction,
    parameters: BTreeMap<&'static str, ParameterValue>,
}

impl RoutingRequest {
    /// Builds a `configureRouting` request towards `proxy_ip`.
    #[must_use]
    pub fn configure(proxy_ip: &str, router_ip: Ipv4Addr) -> Self {
        let parameters = BTreeMap::from([
            ("proxyIp", ParameterValue::Text(proxy_ip.to_owned())),
            ("routerIp", ParameterValue::Text(router_ip.to_string())),
            ("isAutoConnect", ParameterValue::Flag(false)),
        ]);
        Self {
            action: RoutingAction::ConfigureRouting,
            parameters,
        }
    }

    /// Builds a `resetRouting` request.
    #[must_use]
    pub fn reset() -> Self {
        Self {
            action: RoutingAction::ResetRouting,
            parameters: BTreeMap::new(),
        }
    }

    /// Action carried by the request.
    #[must_use]
    pub const fn action(&self) -> RoutingAction {
        self.action
    }
}

/// Outcome reported by the service for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum StatusCode {
    /// `0`: the request succeeded.
    Success,
    /// `1`: the request failed.
    GenericFailure,
    /// `2`: the host routing table layout cannot be configured.
    UnsupportedRoutingTable,
    /// Any code this client does not know.
    Unrecognised(i64),
}

impl From<i64> for StatusCode {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::GenericFailure,
            2 => Self::UnsupportedRoutingTable,
            other => Self::Unrecognised(other),
        }
    }
}

/// Connectivity reported in `statusChanged` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// The tunnel is up.
    Connected,
    /// The tunnel is down.
    Disconnected,
    /// The service is re-establishing the tunnel.
    Reconnecting,
    /// The event carried no status or one this client does not know.
    Unknown(Option<Value>),
}

impl ServiceStatus {
    fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_i64) {
            Some(0) => Self::Connected,
            Some(1) => Self::Disconnected,
            Some(2) => Self::Reconnecting,
            _ => Self::Unknown(value.cloned()),
        }
    }
}

/// Response or event read from the routing service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMessage {
    /// Action the message answers or announces.
    pub action: RoutingAction,
    /// Status of the answered request.
    #[serde(default)]
    pub status_code: Option<StatusCode>,
    /// Human-readable failure description.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Implementation-defined connectivity value.
    #[serde(default)]
    pub connection_status: Option<Value>,
}

impl ServiceMessage {
    /// Decodes the `connectionStatus` field.
    #[must_use]
    pub fn service_status(&self) -> ServiceStatus {
        ServiceStatus::from_value(self.connection_status.as_ref())
    }
}
