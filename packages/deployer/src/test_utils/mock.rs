use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use alloy_primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use deployer_types::{
    ContractArtifact, Credential, JobError, JobId, JobPayload, JobResult, NetworkConfig,
    VerificationOutcome,
};
use tokio::{sync::Semaphore, time::Instant};
use utils::{error::EvmClientError, evm_client::DeployedContract};

use crate::{
    deployment::{ContractDeployer, DeployError},
    verification::{SourceVerifier, VerificationRequest, VerifierError, VerifyAttempt},
    worker::runner::JobRunner,
};

/// Token names that make a [`MockRunner`] misbehave
pub const HANG_TOKEN: &str = "hang";
pub const PANIC_TOKEN: &str = "panic";
pub const FAIL_DEPLOY_TOKEN: &str = "fail-deploy";

/// A job runner that never touches a chain.
/// Clones share their counters, so one instance can back every worker in a pool.
#[derive(Clone, Default)]
pub struct MockRunner {
    state: Arc<MockRunnerState>,
}

#[derive(Default)]
struct MockRunnerState {
    active: AtomicUsize,
    max_active: AtomicUsize,
    started: Mutex<Vec<JobId>>,
    finished: Mutex<Vec<JobId>>,
    users: Mutex<Vec<Option<String>>>,
    delay: Option<Duration>,
    gate: Option<Semaphore>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job takes this long
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            state: Arc::new(MockRunnerState {
                delay: Some(delay),
                ..Default::default()
            }),
        }
    }

    /// Jobs block until [`MockRunner::release`] lets them through
    pub fn gated() -> Self {
        Self {
            state: Arc::new(MockRunnerState {
                gate: Some(Semaphore::new(0)),
                ..Default::default()
            }),
        }
    }

    pub fn release(&self, jobs: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(jobs);
        }
    }

    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<JobId> {
        self.state.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<JobId> {
        self.state.finished.lock().unwrap().clone()
    }

    /// The user each started job was attributed to, in start order
    pub fn users(&self) -> Vec<Option<String>> {
        self.state.users.lock().unwrap().clone()
    }

    /// Resolves once `count` jobs have started
    pub async fn wait_started(&self, count: usize) {
        while self.started().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

struct ActiveGuard<'a>(&'a MockRunnerState);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobRunner for MockRunner {
    async fn run(&self, job_id: JobId, payload: JobPayload) -> Result<JobResult, JobError> {
        let state = &self.state;
        state.started.lock().unwrap().push(job_id);
        state.users.lock().unwrap().push(payload.user_id.clone());
        let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_active.fetch_max(active, Ordering::SeqCst);
        let _guard = ActiveGuard(state);

        match payload.token_name.as_str() {
            HANG_TOKEN => std::future::pending::<()>().await,
            PANIC_TOKEN => panic!("mock runner told to panic"),
            _ => {}
        }

        if let Some(gate) = &state.gate {
            gate.acquire()
                .await
                .map_err(JobError::internal)?
                .forget();
        }
        if let Some(delay) = state.delay {
            tokio::time::sleep(delay).await;
        }

        state.finished.lock().unwrap().push(job_id);

        if payload.token_name == FAIL_DEPLOY_TOKEN {
            return Err(JobError::deployment("mock deployment failed"));
        }

        Ok(JobResult {
            success: true,
            deployed_address: payload.parsed_address().unwrap_or(Address::ZERO),
            deployment_tx: None,
            network: payload.chain_name,
            verification_result: Some(VerificationOutcome::Verified),
        })
    }
}

/// Replays scripted attempt outcomes and records when each call happened
pub struct MockVerifier {
    script: Mutex<VecDeque<Result<VerifyAttempt, VerifierError>>>,
    hang: bool,
    calls: Mutex<Vec<(Instant, VerificationRequest)>>,
}

impl MockVerifier {
    pub fn new(script: Vec<Result<VerifyAttempt, VerifierError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            hang: false,
            calls: Mutex::default(),
        }
    }

    /// Every attempt runs forever
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<VerificationRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    /// Whole seconds between `start` and each call
    pub fn call_offsets(&self, start: Instant) -> Vec<u64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(at, _)| at.duration_since(start).as_secs())
            .collect()
    }
}

#[async_trait]
impl SourceVerifier for MockVerifier {
    async fn verify(
        &self,
        request: &VerificationRequest,
        _api_key: &Credential,
    ) -> Result<VerifyAttempt, VerifierError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));

        if self.hang {
            std::future::pending::<()>().await;
        }

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(VerifyAttempt::Failed("no scripted attempt left".to_string())))
    }
}

/// Pretends every deployment lands at [`MockDeployer::ADDRESS`]
#[derive(Default)]
pub struct MockDeployer {
    failure: Option<String>,
    deployments: AtomicUsize,
    balance_checks: AtomicUsize,
}

impl MockDeployer {
    pub const ADDRESS: Address = Address::new([0xde; 20]);

    pub fn failing(reason: impl ToString) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub const SIGNER: Address = Address::new([0x5e; 20]);

    pub fn deployments(&self) -> usize {
        self.deployments.load(Ordering::SeqCst)
    }

    pub fn balance_checks(&self) -> usize {
        self.balance_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContractDeployer for MockDeployer {
    async fn deploy(
        &self,
        _network: &NetworkConfig,
        _artifact: &ContractArtifact,
        _constructor_args: &[String],
    ) -> Result<DeployedContract, DeployError> {
        if let Some(reason) = &self.failure {
            return Err(EvmClientError::SendTransaction(anyhow::anyhow!(reason.clone())).into());
        }

        self.deployments.fetch_add(1, Ordering::SeqCst);
        Ok(DeployedContract {
            address: Self::ADDRESS,
            tx_hash: TxHash::repeat_byte(0xaa),
        })
    }

    fn signer(&self) -> Result<Address, DeployError> {
        Ok(Self::SIGNER)
    }

    async fn balance(&self, _network: &NetworkConfig, _address: Address) -> Result<U256, DeployError> {
        self.balance_checks.fetch_add(1, Ordering::SeqCst);
        Ok(U256::from(10).pow(U256::from(18)))
    }
}
