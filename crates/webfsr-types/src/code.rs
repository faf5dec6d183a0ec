//! Pairing codes.
//!
//! A pairing code names a rendezvous room. It is always stored in its full
//! form, `webfsr-<token>`, where the token is a lowercase UUID v4 when the
//! code was minted by a host. Users see and type the bare token.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Namespace prefix shared by every room this application joins.
pub const CODE_PREFIX: &str = "webfsr-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("pairing code is empty")]
    Empty,

    #[error("pairing code contains whitespace: {0:?}")]
    Whitespace(String),
}

/// A normalized pairing code (always carries [`CODE_PREFIX`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PairingCode(String);

impl PairingCode {
    /// Mint a fresh code with a random UUID v4 token.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{CODE_PREFIX}{}", Uuid::new_v4()))
    }

    /// Normalize user input into a code.
    ///
    /// Input is trimmed and lowercased; an existing prefix is stripped and
    /// re-added, so `"<uuid>"` and `"webfsr-<uuid>"` yield the same code.
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let lowered = input.trim().to_lowercase();
        let token = lowered.strip_prefix(CODE_PREFIX).unwrap_or(&lowered);
        if token.is_empty() {
            return Err(CodeError::Empty);
        }
        if token.chars().any(char::is_whitespace) {
            return Err(CodeError::Whitespace(token.to_string()));
        }
        Ok(Self(format!("{CODE_PREFIX}{token}")))
    }

    /// Pull a code out of a scanned QR payload.
    ///
    /// Accepts a share link carrying a prefixed `code` query parameter, a
    /// prefixed code, or a bare UUID (or its first 8-hex group). Anything
    /// else yields `None`.
    pub fn extract(scanned: &str) -> Option<Self> {
        let scanned = scanned.trim();

        if let Some(param) = query_param(scanned, "code") {
            if param.starts_with(CODE_PREFIX) {
                return Self::parse(&param).ok();
            }
        }

        if scanned.starts_with(CODE_PREFIX) {
            return Self::parse(scanned).ok();
        }

        if Uuid::try_parse(scanned).is_ok() || is_short_token(scanned) {
            return Self::parse(scanned).ok();
        }

        None
    }

    /// The full room name, prefix included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The code without its prefix, as shown to users.
    pub fn display_token(&self) -> &str {
        self.0.strip_prefix(CODE_PREFIX).unwrap_or(&self.0)
    }

    /// Link that opens the mobile controller already pointed at this code.
    pub fn share_link(&self, origin: &str) -> String {
        format!("{}?code={}", origin.trim_end_matches('/'), self.0)
    }
}

impl std::fmt::Display for PairingCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PairingCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PairingCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PairingCode> for String {
    fn from(code: PairingCode) -> Self {
        code.0
    }
}

fn is_short_token(s: &str) -> bool {
    s.len() == 8 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Value of `name` in the query string of `link`, if `link` has one.
///
/// Share links only ever carry prefixed codes, which are URL-safe, so no
/// percent-decoding is attempted beyond `%2D` for `-`.
fn query_param(link: &str, name: &str) -> Option<String> {
    let (_, query) = link.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.replace("%2D", "-").replace("%2d", "-"))
    })
}
