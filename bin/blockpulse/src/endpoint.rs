//! Endpoint identity and chain-family classification.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use url::Url;

/// The protocol family an endpoint speaks. Selects the probe adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiClass {
    Ethereum,
    Substrate,
    Aptos,
}

impl ApiClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Substrate => "substrate",
            Self::Aptos => "aptos",
        }
    }
}

impl fmt::Display for ApiClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry entries can carry api classes this poller has no adapter for.
#[derive(Debug, Error)]
#[error("unknown api class: {0}")]
pub struct UnknownApiClass(pub String);

impl FromStr for ApiClass {
    type Err = UnknownApiClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ethereum" => Ok(Self::Ethereum),
            "substrate" => Ok(Self::Substrate),
            "aptos" => Ok(Self::Aptos),
            other => Err(UnknownApiClass(other.to_owned())),
        }
    }
}

/// A single network-addressable RPC server for one blockchain.
///
/// Identity is the URL; `chain` groups endpoints serving the same logical
/// chain for divergence calculation. Immutable once fetched for a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub chain: String,
    pub url: Url,
    pub api_class: ApiClass,
}

/// Schemes the probe adapters can speak.
pub fn has_supported_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https" | "ws" | "wss")
}
