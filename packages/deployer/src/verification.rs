//! Source verification against a block explorer.
//!
//! Explorers index fresh deployments with some lag, so the task waits before the first
//! attempt and then retries on a fixed schedule. Running out of attempts is reported
//! as a `failed: ...` outcome, never as a job error.

mod command;
mod output;

pub use command::{contract_hint, CommandVerifier};
pub use output::classify_output;

use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use deployer_types::{Credential, NetworkConfig, VerificationOutcome, VerificationSettings};
use thiserror::Error;
use tracing::instrument;

/// One verification request, in the terms the external tool understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    /// The tool's own network name, e.g. `bscTestnet`
    pub network: String,
    pub address: Address,
    pub constructor_args: Vec<String>,
    /// `path/to/Source.sol:ContractName`
    pub contract: Option<String>,
}

/// What a single tool invocation reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyAttempt {
    Verified,
    AlreadyVerified,
    Failed(String),
}

#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

#[async_trait]
pub trait SourceVerifier: Send + Sync {
    async fn verify(
        &self,
        request: &VerificationRequest,
        api_key: &Credential,
    ) -> Result<VerifyAttempt, VerifierError>;
}

pub struct VerificationTask<V> {
    verifier: V,
    settings: VerificationSettings,
}

impl<V: SourceVerifier> VerificationTask<V> {
    pub fn new(verifier: V, settings: VerificationSettings) -> Self {
        Self { verifier, settings }
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// `None` when the network has no explorer api key and verification is skipped
    #[instrument(level = "info", skip(self, network), fields(address = %request.address, network = %request.network))]
    pub async fn run(
        &self,
        network: &NetworkConfig,
        request: &VerificationRequest,
    ) -> Option<VerificationOutcome> {
        let Some(api_key) = network.verification_key() else {
            tracing::info!("No verification api key configured, skipping verification");
            return None;
        };

        tokio::time::sleep(self.settings.initial_delay()).await;

        let max_attempts = self.settings.max_attempts();
        let delays = std::iter::once(Duration::ZERO).chain(self.settings.retry_delays());
        let mut last_failure = String::from("no verification attempt was made");

        for (index, delay) in delays.enumerate() {
            let attempt = index + 1;
            if !delay.is_zero() {
                tracing::info!("Retrying verification in {}s", delay.as_secs());
                tokio::time::sleep(delay).await;
            }

            let outcome = tokio::time::timeout(
                self.settings.attempt_timeout(),
                self.verifier.verify(request, api_key),
            )
            .await;

            match outcome {
                Ok(Ok(VerifyAttempt::Verified)) => {
                    tracing::info!("Verified on attempt {attempt}/{max_attempts}");
                    return Some(VerificationOutcome::Verified);
                }
                Ok(Ok(VerifyAttempt::AlreadyVerified)) => {
                    tracing::info!("Contract was already verified");
                    return Some(VerificationOutcome::Verified);
                }
                Ok(Ok(VerifyAttempt::Failed(reason))) => {
                    tracing::warn!("Verification attempt {attempt}/{max_attempts} failed: {reason}");
                    last_failure = reason;
                }
                Ok(Err(err)) => {
                    tracing::error!("Verification tool unusable: {err}");
                    return Some(VerificationOutcome::Failed(err.to_string()));
                }
                Err(_) => {
                    last_failure = format!(
                        "verification attempt timed out after {}s",
                        self.settings.attempt_timeout_secs
                    );
                    tracing::warn!("Verification attempt {attempt}/{max_attempts}: {last_failure}");
                }
            }
        }

        Some(VerificationOutcome::Failed(last_failure))
    }
}
