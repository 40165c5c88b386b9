use super::*;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        verify::handle_verify_contract,
        verify::handle_submit_job,
        jobs::handle_job_status,
        info::handle_info,
        networks::handle_networks
    ),
    components(schemas(
        deployer_types::JobPayload,
        deployer_types::ContractArtifact,
        deployer_types::JobError,
        deployer_types::JobStatus,
        deployer_types::JobState,
        deployer_types::PoolStatus,
        deployer_types::WorkerStatus,
        deployer_types::WorkerState,
        crate::http::error::ErrorResponse,
        VerifyContractResponse,
        SubmitJobResponse,
        NetworksResponse,
        NetworkInfo
    )),
    info(
        title = "Contract Deployer API",
        description = "Deploys contracts and verifies their source on block explorers"
    )
)]
pub struct ApiDoc;
