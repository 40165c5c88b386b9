use std::collections::BTreeMap;

use async_trait::async_trait;
use deployer_types::{JobError, JobId, JobPayload, JobResult, JobResultExt, NetworkTable, WorkerSettings};
use tracing::instrument;

use crate::{
    deployment::{ContractDeployer, EvmDeployer},
    verification::{contract_hint, CommandVerifier, SourceVerifier, VerificationRequest, VerificationTask},
};

/// Executes one job to completion inside a worker
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job_id: JobId, payload: JobPayload) -> Result<JobResult, JobError>;
}

/// Deploys the artifact when one is given, then verifies the contract's source
pub struct DeploymentRunner<D, V> {
    networks: NetworkTable,
    templates: BTreeMap<u32, String>,
    deployer: D,
    verification: VerificationTask<V>,
}

impl DeploymentRunner<EvmDeployer, CommandVerifier> {
    pub fn from_settings(settings: WorkerSettings) -> Self {
        let verifier = CommandVerifier::from_settings(&settings.verification);
        Self::new(
            settings.networks,
            settings.templates,
            EvmDeployer::new(settings.credential, settings.hd_index),
            VerificationTask::new(verifier, settings.verification),
        )
    }
}

impl<D, V> DeploymentRunner<D, V> {
    pub fn new(
        networks: NetworkTable,
        templates: BTreeMap<u32, String>,
        deployer: D,
        verification: VerificationTask<V>,
    ) -> Self {
        Self {
            networks,
            templates,
            deployer,
            verification,
        }
    }
}

#[async_trait]
impl<D: ContractDeployer, V: SourceVerifier> JobRunner for DeploymentRunner<D, V> {
    #[instrument(
        level = "info",
        skip(self, job_id, payload),
        fields(subsys = "Worker", job = %job_id, chain = %payload.chain_name, user = payload.user_id.as_deref())
    )]
    async fn run(&self, job_id: JobId, payload: JobPayload) -> Result<JobResult, JobError> {
        tracing::info!(
            "Running job {job_id} for {}",
            payload.user_id.as_deref().unwrap_or("an anonymous caller")
        );
        let network = self
            .networks
            .get(&payload.chain_name)
            .ok_or_else(|| JobError::unsupported_network(&payload.chain_name))?;
        payload.validate()?;

        let constructor_args = payload.argument_strings();

        let (address, deployment_tx) = match &payload.artifact {
            Some(artifact) => {
                let signer = self.deployer.signer().or_deployment_error()?;
                match self.deployer.balance(network, signer).await {
                    Ok(balance) => tracing::debug!("Deployer {signer} balance: {balance}"),
                    Err(err) => tracing::warn!("Could not read deployer balance: {err}"),
                }

                let deployed = self
                    .deployer
                    .deploy(network, artifact, &constructor_args)
                    .await
                    .or_deployment_error()?;
                tracing::info!(
                    "Deployed contract at {} in tx {}",
                    deployed.address,
                    deployed.tx_hash
                );
                (deployed.address, Some(deployed.tx_hash))
            }
            None => (payload.parsed_address()?, None),
        };

        let request = VerificationRequest {
            network: network.tool_network.clone(),
            address,
            constructor_args,
            contract: contract_hint(&payload, &self.templates),
        };
        let verification_result = self.verification.run(network, &request).await;

        Ok(JobResult {
            success: true,
            deployed_address: address,
            deployment_tx,
            network: payload.chain_name,
            verification_result,
        })
    }
}
