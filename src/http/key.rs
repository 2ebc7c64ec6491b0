//! Client key extraction.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};
use tracing::debug;

use crate::config::{KeyStrategy, RateLimitingConfig};
use crate::error::{Result, TurnstileError};

/// Derives the client key for a request using one fixed strategy.
#[derive(Debug, Clone)]
pub enum KeyExtractor {
    /// Use the IP address of the TCP peer.
    Peer,
    /// Use the first address in `header`, falling back to the peer IP when
    /// the header is absent. Only sound behind a proxy that overwrites it.
    ///
    /// Requests reaching the service without the header all share the
    /// proxy's bucket.
    Forwarded { header: HeaderName },
}

impl KeyExtractor {
    /// Build the extractor described by the rate limiting configuration.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        match config.key_strategy {
            KeyStrategy::Peer => Ok(KeyExtractor::Peer),
            KeyStrategy::Forwarded => {
                let header = HeaderName::from_bytes(config.forwarded_header.as_bytes())
                    .map_err(|e| TurnstileError::Config(format!("invalid forwarded_header: {}", e)))?;
                Ok(KeyExtractor::Forwarded { header })
            }
        }
    }

    /// Extractor reading the standard `X-Forwarded-For` header.
    pub fn forwarded_for() -> Self {
        KeyExtractor::Forwarded {
            header: HeaderName::from_static("x-forwarded-for"),
        }
    }

    /// Derive the key. Never fails: with no usable source the empty key is
    /// returned, which is a bucket like any other.
    pub fn extract<B>(&self, request: &Request<B>) -> String {
        if let KeyExtractor::Forwarded { header } = self {
            let forwarded = request
                .headers()
                .get(header)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());

            if let Some(client) = forwarded {
                return client.to_string();
            }

            debug!(header = %header, "Forwarded header missing, keying on peer address");
        }

        peer_ip(request).unwrap_or_default()
    }
}

fn peer_ip<B>(request: &Request<B>) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}
