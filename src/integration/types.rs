//! Integration types

use crate::error::Error;
use crate::nexx_client::JwtCredentials;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default router size when an integration leaves it unset
pub const DEFAULT_ROUTER_SIZE: u32 = crate::nexx_client::varid::MAX_SDI_INPUTS;

/// Device protocol of an integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Nexx,
    Quartz,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Nexx => "nexx",
            Protocol::Quartz => "quartz",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nexx" => Ok(Protocol::Nexx),
            "quartz" => Ok(Protocol::Quartz),
            other => Err(Error::Validation(format!("Unknown protocol: {}", other))),
        }
    }
}

/// Configured device connection (one per protocol)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    pub id: i64,
    pub protocol: Protocol,
    pub host: String,
    pub port: Option<u16>,
    pub api_key: Option<String>,
    #[serde(skip_serializing)]
    pub jwt_credentials: Option<JwtCredentials>,
    pub max_inputs: Option<u32>,
    pub max_outputs: Option<u32>,
}

impl Integration {
    /// `host` or `host:port` for HTTP devices
    pub fn http_authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    pub fn router_inputs(&self) -> u32 {
        self.max_inputs.filter(|n| *n > 0).unwrap_or(DEFAULT_ROUTER_SIZE)
    }

    pub fn router_outputs(&self) -> u32 {
        self.max_outputs.filter(|n| *n > 0).unwrap_or(DEFAULT_ROUTER_SIZE)
    }
}

/// Create/replace request for an integration
#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationUpsert {
    pub protocol: Protocol,
    pub host: String,
    pub port: Option<u16>,
    pub api_key: Option<String>,
    pub jwt_username: Option<String>,
    pub jwt_password: Option<String>,
    pub max_inputs: Option<u32>,
    pub max_outputs: Option<u32>,
}

impl IntegrationUpsert {
    /// Credentials are only replaced when both halves are given
    pub fn jwt_credentials(&self) -> Option<JwtCredentials> {
        match (&self.jwt_username, &self.jwt_password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(JwtCredentials {
                    username: username.clone(),
                    password: password.clone(),
                })
            }
            _ => None,
        }
    }
}

/// Connection test outcome (never an error)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub ok: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integration() -> Integration {
        Integration {
            id: 1,
            protocol: Protocol::Quartz,
            host: "10.0.0.5".into(),
            port: None,
            api_key: None,
            jwt_credentials: None,
            max_inputs: Some(0),
            max_outputs: Some(64),
        }
    }

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("NEXX".parse::<Protocol>().unwrap(), Protocol::Nexx);
        assert_eq!(Protocol::Quartz.to_string(), "quartz");
        assert!("kumo".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_router_size_defaults() {
        let i = integration();
        assert_eq!(i.router_inputs(), 960);
        assert_eq!(i.router_outputs(), 64);
        assert_eq!(i.http_authority(), "10.0.0.5");
    }

    #[test]
    fn test_credentials_are_not_serialized() {
        let mut i = integration();
        i.jwt_credentials = Some(JwtCredentials {
            username: "admin".into(),
            password: "pw".into(),
        });
        let json = serde_json::to_value(&i).unwrap();
        assert!(json.get("jwt_credentials").is_none());
    }
}
