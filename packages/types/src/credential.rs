use std::{ops::Deref, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret material such as a mnemonic, a private key, an explorer api key or a bearer token.
/// The inner string is wiped on drop and never printed by `Debug`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, ToSchema)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(credential: impl Into<String>) -> Self {
        Self(credential.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whitespace-only credentials count as unset
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl Deref for Credential {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl FromStr for Credential {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
