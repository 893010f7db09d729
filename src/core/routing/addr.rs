// src/core/routing/addr.rs

//! Defines `UpstreamAddr`, the parsed form of a `redis://` upstream URL.

use crate::core::ProxyError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use url::Url;

const DEFAULT_PORT: u16 = 6379;

/// One upstream node: where to connect and how to authenticate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UpstreamAddr {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: u32,
}

impl UpstreamAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            db: 0,
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn socket_target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The URL with the password replaced by `***`.
    pub fn masked(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(_)) => format!("{user}:***@"),
            (None, Some(_)) => ":***@".to_string(),
            (Some(user), None) => format!("{user}@"),
            (None, None) => String::new(),
        };
        let db = if self.db != 0 {
            format!("/{}", self.db)
        } else {
            String::new()
        };
        format!("redis://{auth}{}:{}{db}", self.host, self.port)
    }
}

impl FromStr for UpstreamAddr {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s)
            .map_err(|e| ProxyError::InvalidRoute(format!("bad upstream url '{s}': {e}")))?;
        if url.scheme() != "redis" {
            return Err(ProxyError::InvalidRoute(format!(
                "unsupported upstream scheme '{}'",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProxyError::InvalidRoute(format!("missing host in '{s}'")))?
            .to_string();
        let decode = |raw: &str| -> Result<String, ProxyError> {
            urlencoding::decode(raw)
                .map(|c| c.into_owned())
                .map_err(|_| ProxyError::InvalidRoute("credentials are not valid utf-8".into()))
        };
        let username = match url.username() {
            "" => None,
            user => Some(decode(user)?),
        };
        let password = url.password().map(decode).transpose()?;
        let db = match url.path().trim_start_matches('/') {
            "" => 0,
            path => path
                .parse::<u32>()
                .map_err(|_| ProxyError::InvalidRoute(format!("bad db index in '{s}'")))?,
        };
        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            username,
            password,
            db,
        })
    }
}

// Credentials never reach logs or diagnostics.
impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl fmt::Debug for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UpstreamAddr({})", self.masked())
    }
}

impl<'de> Deserialize<'de> for UpstreamAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for UpstreamAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.masked())
    }
}
