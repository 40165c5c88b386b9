mod info;
mod jobs;
mod networks;
mod not_found;
pub(crate) mod openapi;
mod verify;

pub use info::handle_info;
pub use jobs::handle_job_status;
pub use networks::{handle_networks, NetworkInfo, NetworksResponse};
pub use not_found::handle_not_found;
pub use verify::{
    handle_submit_job, handle_verify_contract, SubmitJobResponse, VerifyContractResponse,
};
