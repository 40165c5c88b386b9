use alloy_primitives::{Address, TxHash};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use utoipa::ToSchema;

use crate::JobError;

/// Everything a caller submits for one deployment/verification job
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    /// Address of an already deployed contract. Required unless `artifact` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_address: Option<String>,
    /// Positional constructor arguments, as JSON primitives
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub constructor_arguments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_contract_path: Option<String>,
    #[serde(default)]
    pub token_name: String,
    /// Kept as a raw string so unknown chains surface as `UnsupportedNetwork`
    pub chain_name: String,
    /// When present the worker deploys this artifact before verifying it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ContractArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ContractArtifact {
    #[schema(value_type = Object)]
    pub abi: Value,
    /// Hex encoded creation bytecode, with or without `0x`
    pub bytecode: String,
}

impl JobPayload {
    /// Checks the payload shape. Network lookup happens separately.
    pub fn validate(&self) -> Result<(), JobError> {
        for (index, arg) in self.constructor_arguments.iter().enumerate() {
            if !is_primitive_arg(arg) {
                return Err(JobError::invalid_payload(format!(
                    "constructor argument {index} must be a string, number, bool or list of those"
                )));
            }
        }

        match &self.artifact {
            Some(artifact) => {
                if !artifact.abi.is_array() {
                    return Err(JobError::invalid_payload("artifact abi must be a JSON array"));
                }
                let bytecode = artifact.bytecode.trim_start_matches("0x");
                if bytecode.is_empty() || !bytecode.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(JobError::invalid_payload("artifact bytecode must be hex"));
                }
            }
            None => {
                self.parsed_address()?;
            }
        }

        Ok(())
    }

    pub fn parsed_address(&self) -> Result<Address, JobError> {
        let raw = self
            .deployed_address
            .as_deref()
            .ok_or_else(|| JobError::invalid_payload("deployedAddress is required"))?;

        raw.trim()
            .parse()
            .map_err(|e| JobError::invalid_payload(format!("deployedAddress {raw}: {e}")))
    }

    /// Constructor arguments in the textual form verification tools and abi coercion expect
    pub fn argument_strings(&self) -> Vec<String> {
        self.constructor_arguments.iter().map(arg_to_string).collect()
    }
}

fn is_primitive_arg(value: &Value) -> bool {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => true,
        Value::Array(items) => items.iter().all(is_primitive_arg),
        Value::Null | Value::Object(_) => false,
    }
}

fn arg_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(arg_to_string).collect::<Vec<_>>().join(",")
        ),
        other => other.to_string(),
    }
}

/// What a successfully completed job reports back
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Always true for a completed job, verification failures included
    pub success: bool,
    #[schema(value_type = String)]
    pub deployed_address: Address,
    /// Only set when the worker deployed the contract itself
    #[schema(value_type = Option<String>)]
    pub deployment_tx: Option<TxHash>,
    pub network: String,
    /// `"success"`, `"failed: <reason>"`, or null when verification was skipped
    #[schema(value_type = Option<String>)]
    pub verification_result: Option<VerificationOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    Failed(String),
}

impl VerificationOutcome {
    const SUCCESS: &'static str = "success";
    const FAILED_PREFIX: &'static str = "failed: ";
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationOutcome::Verified => f.write_str(Self::SUCCESS),
            VerificationOutcome::Failed(reason) => write!(f, "{}{reason}", Self::FAILED_PREFIX),
        }
    }
}

impl Serialize for VerificationOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VerificationOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == Self::SUCCESS {
            return Ok(Self::Verified);
        }
        match s.strip_prefix(Self::FAILED_PREFIX) {
            Some(reason) => Ok(Self::Failed(reason.to_string())),
            None => Err(serde::de::Error::custom(format!(
                "unknown verification result: {s}"
            ))),
        }
    }
}
