use alloy_dyn_abi::{DynSolValue, JsonAbiExt, Specifier};
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use deployer_types::{ContractArtifact, Credential, NetworkConfig};
use thiserror::Error;
use utils::{
    error::EvmClientError,
    evm_client::{make_signer, DeployedContract, EvmEndpoint, EvmSigningClient},
};

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("no deployer credential configured")]
    MissingCredential,

    #[error("invalid abi: {0}")]
    Abi(String),

    #[error("invalid bytecode: {0}")]
    Bytecode(String),

    #[error("constructor takes {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    #[error("constructor argument {index} ({ty}): {reason}")]
    Argument {
        index: usize,
        ty: String,
        reason: String,
    },

    #[error(transparent)]
    Client(#[from] EvmClientError),
}

/// The chain side of a job: putting an artifact on chain
#[async_trait]
pub trait ContractDeployer: Send + Sync {
    async fn deploy(
        &self,
        network: &NetworkConfig,
        artifact: &ContractArtifact,
        constructor_args: &[String],
    ) -> Result<DeployedContract, DeployError>;

    /// Account the deployments are sent from
    fn signer(&self) -> Result<Address, DeployError>;

    async fn balance(&self, network: &NetworkConfig, address: Address) -> Result<U256, DeployError>;
}

/// Deploys over JSON-RPC with the configured key
pub struct EvmDeployer {
    credential: Option<Credential>,
    hd_index: Option<u32>,
}

impl EvmDeployer {
    pub fn new(credential: Option<Credential>, hd_index: Option<u32>) -> Self {
        Self {
            credential,
            hd_index,
        }
    }

    fn credential(&self) -> Result<&Credential, DeployError> {
        self.credential
            .as_ref()
            .filter(|credential| !credential.is_blank())
            .ok_or(DeployError::MissingCredential)
    }

    async fn client(&self, network: &NetworkConfig) -> Result<EvmSigningClient, DeployError> {
        let credential = self.credential()?;
        let endpoint: EvmEndpoint = network.rpc_endpoint.parse()?;

        Ok(EvmSigningClient::new(endpoint, credential, self.hd_index).await?)
    }
}

#[async_trait]
impl ContractDeployer for EvmDeployer {
    async fn deploy(
        &self,
        network: &NetworkConfig,
        artifact: &ContractArtifact,
        constructor_args: &[String],
    ) -> Result<DeployedContract, DeployError> {
        // encode first, so bad input never costs a connection
        let code = encode_deploy_code(artifact, constructor_args)?;
        let client = self.client(network).await?;

        Ok(client.deploy_contract(code).await?)
    }

    fn signer(&self) -> Result<Address, DeployError> {
        let signer = make_signer(self.credential()?, self.hd_index)?;
        Ok(signer.address())
    }

    async fn balance(&self, network: &NetworkConfig, address: Address) -> Result<U256, DeployError> {
        let client = self.client(network).await?;
        Ok(client.balance(address).await?)
    }
}

/// Creation bytecode followed by the abi encoded constructor arguments.
/// Arguments are coerced from their textual form against the constructor's parameter types.
pub fn encode_deploy_code(
    artifact: &ContractArtifact,
    constructor_args: &[String],
) -> Result<Bytes, DeployError> {
    let abi: JsonAbi =
        serde_json::from_value(artifact.abi.clone()).map_err(|e| DeployError::Abi(e.to_string()))?;
    let mut code = const_hex::decode(artifact.bytecode.trim())
        .map_err(|e| DeployError::Bytecode(e.to_string()))?;

    let inputs = abi
        .constructor
        .as_ref()
        .map(|constructor| constructor.inputs.as_slice())
        .unwrap_or_default();

    if inputs.len() != constructor_args.len() {
        return Err(DeployError::ArgumentCount {
            expected: inputs.len(),
            got: constructor_args.len(),
        });
    }

    if let Some(constructor) = &abi.constructor {
        let values = inputs
            .iter()
            .zip(constructor_args)
            .enumerate()
            .map(|(index, (param, arg))| {
                let argument_error = |reason: String| DeployError::Argument {
                    index,
                    ty: param.ty.clone(),
                    reason,
                };
                let ty = param.resolve().map_err(|e| argument_error(e.to_string()))?;
                ty.coerce_str(arg).map_err(|e| argument_error(e.to_string()))
            })
            .collect::<Result<Vec<DynSolValue>, _>>()?;

        let encoded = constructor
            .abi_encode_input(&values)
            .map_err(|e| DeployError::Abi(e.to_string()))?;
        code.extend_from_slice(&encoded);
    }

    Ok(code.into())
}
