#![cfg(unix)]

use std::{future::IntoFuture, sync::Arc, time::Duration};

use alloy_primitives::Address;

use contract_deployer::dispatcher::{
    Dispatcher, DispatcherConfig, DispatcherHandle, JobUpdate, ProcessLauncher,
};
use deployer_types::{
    ChainName, JobError, JobPayload, NetworkConfig, VerificationOutcome, VerificationSettings,
    WorkerId, WorkerSettings, WorkerState,
};
use tokio::task::JoinHandle;

const ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
const KEYED_CHAIN: &str = "local-chain";
const KEYLESS_CHAIN: &str = "private-chain";
const TEST_DEADLINE: Duration = Duration::from_secs(30);

/// Fails the test instead of hanging when a job never settles
async fn within<T>(fut: impl IntoFuture<Output = T>) -> T {
    tokio::time::timeout(TEST_DEADLINE, fut.into_future())
        .await
        .expect("timed out waiting on the dispatcher")
}

fn payload(chain_name: &str) -> JobPayload {
    JobPayload {
        deployed_address: Some(ADDRESS.to_string()),
        constructor_arguments: vec!["My Token".into(), "MTK".into()],
        template_number: Some(0),
        custom_contract_path: None,
        token_name: "My Token".to_string(),
        chain_name: chain_name.to_string(),
        artifact: None,
        user_id: None,
    }
}

/// Every verification attempt runs `script` through `sh -c`
fn config(pool_size: usize, script: &str) -> DispatcherConfig {
    let mut settings = WorkerSettings {
        verification: VerificationSettings {
            initial_delay_secs: 0,
            retry_delays_secs: vec![],
            attempt_timeout_secs: 60,
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            project_dir: None,
        },
        templates: [(0, "MemeToken".to_string())].into_iter().collect(),
        ..Default::default()
    };
    settings.networks.insert(
        ChainName::new(KEYED_CHAIN).unwrap(),
        NetworkConfig::new("http://127.0.0.1:8545", "localhost").with_api_key("scan-key"),
    );
    settings.networks.insert(
        ChainName::new(KEYLESS_CHAIN).unwrap(),
        NetworkConfig::new("http://127.0.0.1:8545", "private"),
    );

    DispatcherConfig {
        pool_size,
        shutdown_grace: Duration::from_secs(5),
        respawn_delay: Duration::from_millis(100),
        settings,
        ..Default::default()
    }
}

fn start(config: DispatcherConfig) -> (DispatcherHandle, JoinHandle<()>) {
    contract_deployer::init_tracing_tests();
    let launcher = ProcessLauncher::new(env!("CARGO_BIN_EXE_contract-deployer-worker"), "warn");
    Dispatcher::start(config, Arc::new(launcher))
}

async fn live_workers(dispatcher: &DispatcherHandle, size: usize) -> Vec<WorkerId> {
    tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            let status = dispatcher.pool_status().await.unwrap();
            let live: Vec<_> = status
                .workers
                .iter()
                .filter(|w| matches!(w.state, WorkerState::Idle | WorkerState::Busy))
                .map(|w| w.id)
                .collect();
            if live.len() == size && status.workers.len() == size {
                return live;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn worker_process_verifies_existing_contract() {
    let (dispatcher, task) = start(config(
        2,
        "echo \"Successfully verified $3 with key ${VERIFICATION_API_KEY}\"",
    ));

    let keyed = dispatcher.submit_job(payload(KEYED_CHAIN));
    let keyless = dispatcher.submit_job(payload(KEYLESS_CHAIN));

    let result = within(keyed).await.unwrap();
    assert!(result.success);
    assert_eq!(result.deployed_address, ADDRESS.parse::<Address>().unwrap());
    assert_eq!(result.network, KEYED_CHAIN);
    assert_eq!(result.verification_result, Some(VerificationOutcome::Verified));

    // no api key, verification is skipped
    let result = within(keyless).await.unwrap();
    assert!(result.success);
    assert_eq!(result.verification_result, None);

    within(dispatcher.shutdown()).await;
    within(task).await.unwrap();
}

#[tokio::test]
async fn worker_process_reports_failed_verification() {
    let (dispatcher, task) = start(config(
        1,
        "echo 'Does not have bytecode at address' >&2; exit 1",
    ));

    let result = within(dispatcher.submit_job(payload(KEYED_CHAIN))).await.unwrap();
    assert!(result.success);
    assert_eq!(
        result.verification_result,
        Some(VerificationOutcome::Failed(
            "Does not have bytecode at address".to_string()
        ))
    );

    within(dispatcher.shutdown()).await;
    within(task).await.unwrap();
}

#[tokio::test]
async fn worker_process_crash_is_replaced() {
    let (dispatcher, task) = start(config(2, "sleep 30"));

    let before = live_workers(&dispatcher, 2).await;

    let mut ticket = dispatcher.submit_job(payload(KEYED_CHAIN));
    let worker_id = loop {
        match within(ticket.next_update()).await {
            Some(JobUpdate::Assigned { worker_id, .. }) => break worker_id,
            Some(_) => continue,
            None => panic!("job finished before it was assigned"),
        }
    };

    dispatcher.kill_worker(worker_id).await.unwrap();
    assert!(matches!(
        within(ticket).await,
        Err(JobError::WorkerCrash { .. })
    ));

    let after = live_workers(&dispatcher, 2).await;
    assert!(!after.contains(&worker_id));
    assert!(after.iter().all(|id| before.contains(id) || id.get() >= 2));

    tokio::time::timeout(Duration::from_secs(10), dispatcher.shutdown())
        .await
        .unwrap();
    within(task).await.unwrap();
}

#[tokio::test]
async fn worker_process_job_timeout() {
    let config = DispatcherConfig {
        job_timeout: Some(Duration::from_secs(1)),
        ..config(1, "sleep 30")
    };
    let (dispatcher, task) = start(config);

    let err = within(dispatcher.submit_job(payload(KEYED_CHAIN))).await.unwrap_err();
    assert_eq!(err, JobError::Timeout { seconds: 1 });

    live_workers(&dispatcher, 1).await;

    tokio::time::timeout(Duration::from_secs(10), dispatcher.shutdown())
        .await
        .unwrap();
    within(task).await.unwrap();
}

#[tokio::test]
async fn worker_process_shutdown_rejects_in_flight_job() {
    let (dispatcher, task) = start(config(1, "sleep 30"));

    let mut running = dispatcher.submit_job(payload(KEYED_CHAIN));
    within(running.accepted()).await.unwrap();
    let queued = dispatcher.submit_job(payload(KEYED_CHAIN));

    tokio::time::timeout(Duration::from_secs(10), dispatcher.shutdown())
        .await
        .unwrap();

    assert_eq!(within(running).await.unwrap_err(), JobError::ShuttingDown);
    assert_eq!(within(queued).await.unwrap_err(), JobError::ShuttingDown);

    within(task).await.unwrap();
}
