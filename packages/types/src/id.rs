use serde::{Deserialize, Deserializer, Serialize};
use std::{borrow::Borrow, ops::Deref, str::FromStr};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum IDError {
    #[error("ID must be between 2 and 64 characters")]
    LengthError,
    #[error("ID must be lowercase alphanumeric")]
    CharError,
}

/// Generates a numeric id newtype handed out by a monotonic counter
macro_rules! new_counter_id {
    ($type_name:ident, $prefix:literal) => {
        #[derive(
            Serialize,
            Deserialize,
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ToSchema,
        )]
        #[serde(transparent)]
        pub struct $type_name(u64);

        impl $type_name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn get(&self) -> u64 {
                self.0
            }

            /// Returns the current id and advances the counter
            pub fn take_next(counter: &mut u64) -> Self {
                let id = Self(*counter);
                *counter += 1;
                id
            }
        }

        impl std::fmt::Display for $type_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl FromStr for $type_name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim_start_matches($prefix).parse().map(Self)
            }
        }
    };
}

new_counter_id!(JobId, "");
new_counter_id!(WorkerId, "worker-");

/// The name a chain is configured under, e.g. `bsc-testnet`.
/// It must be lowercase alphanumeric: `[a-z0-9-_]{2,64}`
#[derive(Serialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[serde(transparent)]
pub struct ChainName(String);

impl ChainName {
    pub fn new(id: impl Into<String>) -> Result<Self, IDError> {
        let id = id.into();

        if id.len() < 2 || id.len() > 64 {
            return Err(IDError::LengthError);
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(IDError::CharError);
        }
        Ok(Self(id))
    }
}

impl<'de> Deserialize<'de> for ChainName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChainName::new(s).map_err(serde::de::Error::custom)
    }
}

impl Deref for ChainName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// lookups in maps keyed by ChainName can use a plain &str
impl Borrow<str> for ChainName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainName {
    type Err = IDError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChainName::new(s)
    }
}
