//! Carrier vocabulary for shipping allocation.

use serde::{Deserialize, Serialize};

/// Supported shipping carriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Carrier {
    #[serde(rename = "USPS")]
    Usps,
    #[serde(rename = "FedEx")]
    FedEx,
    #[serde(rename = "UPS")]
    Ups,
}

impl Carrier {
    /// All carriers eligible for allocation.
    pub const ALL: [Carrier; 3] = [Carrier::Usps, Carrier::FedEx, Carrier::Ups];

    /// Two-letter prefix used in tracking numbers.
    pub fn tracking_prefix(&self) -> &'static str {
        match self {
            Carrier::Usps => "US",
            Carrier::FedEx => "FE",
            Carrier::Ups => "UP",
        }
    }

    /// Display name, also the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Carrier::Usps => "USPS",
            Carrier::FedEx => "FedEx",
            Carrier::Ups => "UPS",
        }
    }

    /// Parses a persisted carrier name.
    pub fn from_name(name: &str) -> Option<Carrier> {
        match name {
            "USPS" => Some(Carrier::Usps),
            "FedEx" => Some(Carrier::FedEx),
            "UPS" => Some(Carrier::Ups),
            _ => None,
        }
    }
}

impl std::fmt::Display for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
