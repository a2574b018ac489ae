//! Route strings: `serverType.service.method`

use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decoded addressing tuple for a remote call or message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Target server type, empty when the route omits it
    pub server_type: String,
    pub service: String,
    pub method: String,
}

impl Route {
    pub fn new(
        server_type: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            server_type: server_type.into(),
            service: service.into(),
            method: method.into(),
        }
    }

    /// Decode a route string
    ///
    /// Accepts `serverType.service.method` and the short form
    /// `service.method`, which leaves the server type empty.
    pub fn decode(route: &str) -> Result<Self> {
        let parts: Vec<&str> = route.split('.').collect();
        for (pos, part) in parts.iter().enumerate() {
            if part.trim().is_empty() {
                return Err(LinkError::RouteDecode {
                    route: route.to_string(),
                    reason: format!("segment {} is empty", pos),
                });
            }
            if part.trim() != *part {
                return Err(LinkError::RouteDecode {
                    route: route.to_string(),
                    reason: format!("segment {} has surrounding whitespace", pos),
                });
            }
        }

        match parts.as_slice() {
            [server_type, service, method] => Ok(Self::new(*server_type, *service, *method)),
            [service, method] => Ok(Self::new("", *service, *method)),
            _ => Err(LinkError::RouteDecode {
                route: route.to_string(),
                reason: format!("expected 2 or 3 segments, found {}", parts.len()),
            }),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server_type.is_empty() {
            write!(f, "{}.{}", self.service, self.method)
        } else {
            write!(f, "{}.{}.{}", self.server_type, self.service, self.method)
        }
    }
}
