//! Expected content-negotiation policy
//!
//! The harness does not negotiate anything itself. It computes what the
//! server *should* choose for a given `Accept` header so the validator can
//! assert the server honours it:
//!
//! - absent or empty `Accept` selects the structured-object format (JSON)
//! - listed media types are tried in the order given; the first supported
//!   one wins (quality parameters are ignored)
//! - `*/*` and `application/*` accept anything and select JSON
//! - a list with no supported entry is "not acceptable" (406)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status the server is expected to return when nothing in `Accept` is supported
pub const NOT_ACCEPTABLE: u16 = 406;

/// Representation formats the remote system can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    /// Structured-object format, the default
    Json,
    /// Alternate markup format
    Xml,
}

impl Representation {
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        }
    }

    /// Map a media type essence to a representation
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type.trim().to_ascii_lowercase().as_str() {
            "application/json" | "text/json" => Some(Self::Json),
            "application/xml" | "text/xml" => Some(Self::Xml),
            other if other.ends_with("+json") => Some(Self::Json),
            other if other.ends_with("+xml") => Some(Self::Xml),
            _ => None,
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Xml => write!(f, "xml"),
        }
    }
}

/// What the server should do for a given `Accept` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiated {
    Format(Representation),
    NotAcceptable,
}

/// The set of formats the server supports, plus the default choice
#[derive(Debug, Clone)]
pub struct AcceptPolicy {
    supported: Vec<Representation>,
    default: Representation,
}

impl Default for AcceptPolicy {
    fn default() -> Self {
        Self {
            supported: vec![Representation::Json, Representation::Xml],
            default: Representation::Json,
        }
    }
}

impl AcceptPolicy {
    pub fn new(supported: Vec<Representation>, default: Representation) -> Self {
        Self { supported, default }
    }

    /// Expected outcome for a request's `Accept` header value
    pub fn expected(&self, accept: Option<&str>) -> Negotiated {
        let accept = match accept.map(str::trim) {
            None | Some("") => return Negotiated::Format(self.default),
            Some(a) => a,
        };

        for entry in accept.split(',') {
            let media = entry.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            if media.is_empty() {
                continue;
            }
            if media == "*/*" || media == "application/*" {
                return Negotiated::Format(self.default);
            }
            if let Some(rep) = Representation::from_media_type(&media) {
                if self.supported.contains(&rep) {
                    return Negotiated::Format(rep);
                }
            }
        }

        Negotiated::NotAcceptable
    }
}
