use std::collections::BTreeMap;

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::http::state::HttpState;

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworksResponse {
    pub networks: Vec<NetworkInfo>,
}

/// A configured network, minus its secrets
#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub chain_name: String,
    pub tool_network: String,
    pub rpc_endpoint: String,
    /// False when no explorer api key is configured
    pub verification_enabled: bool,
    pub contracts: BTreeMap<String, String>,
}

#[utoipa::path(
    get,
    path = "/networks",
    responses(
        (status = 200, description = "Supported networks", body = NetworksResponse)
    ),
    description = "Lists the chains jobs can be submitted for"
)]
#[axum::debug_handler]
pub async fn handle_networks(State(state): State<HttpState>) -> impl IntoResponse {
    let networks = state
        .config
        .networks
        .iter()
        .map(|(chain, network)| NetworkInfo {
            chain_name: chain.to_string(),
            tool_network: network.tool_network.clone(),
            rpc_endpoint: network.rpc_endpoint.clone(),
            verification_enabled: network.verification_key().is_some(),
            contracts: network.contracts.clone(),
        })
        .collect();

    Json(NetworksResponse { networks })
}
