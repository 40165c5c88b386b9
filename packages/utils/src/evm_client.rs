use std::str::FromStr;

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer::k256::SecretKey;
use alloy_signer_local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use deployer_types::Credential;

use crate::error::EvmClientError;

pub type Result<T> = std::result::Result<T, EvmClientError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvmEndpoint {
    WebSocket(reqwest::Url),
    Http(reqwest::Url),
}

impl FromStr for EvmEndpoint {
    type Err = EvmClientError;

    fn from_str(s: &str) -> Result<Self> {
        let url =
            reqwest::Url::parse(s).map_err(|e| EvmClientError::ParseEndpoint(format!("{s}: {e}")))?;
        match url.scheme() {
            "ws" | "wss" => Ok(EvmEndpoint::WebSocket(url)),
            "http" | "https" => Ok(EvmEndpoint::Http(url)),
            scheme => Err(EvmClientError::ParseEndpoint(format!(
                "unsupported scheme {scheme} in {s}"
            ))),
        }
    }
}

impl std::fmt::Display for EvmEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvmEndpoint::WebSocket(url) | EvmEndpoint::Http(url) => write!(f, "{url}"),
        }
    }
}

/// A `0x` prefixed credential is a raw private key, anything else is a mnemonic
pub fn make_signer(credential: &str, hd_index: Option<u32>) -> Result<PrivateKeySigner> {
    let hd_index = hd_index.unwrap_or_default();

    match credential.trim().strip_prefix("0x") {
        Some(hex_key) => {
            if hd_index > 0 {
                return Err(EvmClientError::DerivationWithPrivateKey);
            }
            let bytes = const_hex::decode(hex_key)
                .map_err(|e| EvmClientError::InvalidPrivateKey(e.to_string()))?;
            let secret_key = SecretKey::from_slice(&bytes)
                .map_err(|e| EvmClientError::InvalidPrivateKey(e.to_string()))?;
            Ok(PrivateKeySigner::from_signing_key(secret_key.into()))
        }
        None => MnemonicBuilder::<English>::default()
            .phrase(credential.trim())
            .index(hd_index)
            .and_then(|builder| builder.build())
            .map_err(|e| EvmClientError::Mnemonic(e.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: Address,
    pub tx_hash: TxHash,
}

/// A provider bound to one endpoint that signs with one key
#[derive(Clone)]
pub struct EvmSigningClient {
    pub endpoint: EvmEndpoint,
    pub provider: DynProvider,
    signer: PrivateKeySigner,
}

impl EvmSigningClient {
    pub async fn new(
        endpoint: EvmEndpoint,
        credential: &Credential,
        hd_index: Option<u32>,
    ) -> Result<Self> {
        let signer = make_signer(credential, hd_index)?;
        let builder = ProviderBuilder::new().wallet(EthereumWallet::from(signer.clone()));

        let provider = match &endpoint {
            EvmEndpoint::WebSocket(url) => DynProvider::new(
                builder
                    .connect_ws(WsConnect::new(url.as_str()))
                    .await
                    .map_err(|e| EvmClientError::WebSocketProvider(e.into()))?,
            ),
            EvmEndpoint::Http(url) => DynProvider::new(builder.connect_http(url.clone())),
        };

        Ok(Self {
            endpoint,
            provider,
            signer,
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| EvmClientError::Balance(e.into()))
    }

    /// Sends a contract creation transaction and waits for its receipt.
    /// `code` is the creation bytecode with abi encoded constructor arguments appended.
    pub async fn deploy_contract(&self, code: Bytes) -> Result<DeployedContract> {
        let tx = TransactionRequest::default()
            .with_from(self.address())
            .with_deploy_code(code);

        let receipt = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| EvmClientError::SendTransaction(e.into()))?
            .get_receipt()
            .await
            .map_err(|e| EvmClientError::TransactionWithoutReceipt(e.into()))?;

        let tx_hash = receipt.transaction_hash;
        if !receipt.status() {
            return Err(EvmClientError::TransactionReverted(tx_hash));
        }

        let address = receipt
            .contract_address
            .ok_or(EvmClientError::NoContractAddress(tx_hash))?;

        tracing::info!("Deployed contract {} in transaction {}", address, tx_hash);

        Ok(DeployedContract { address, tx_hash })
    }
}

impl std::fmt::Debug for EvmSigningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmSigningClient")
            .field("endpoint", &self.endpoint)
            .field("address", &self.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANVIL_MNEMONIC: &str = "test test test test test test test test test test test junk";

    #[test]
    fn endpoint_schemes() {
        assert!(matches!(
            "https://bsc-dataseed.binance.org/".parse::<EvmEndpoint>(),
            Ok(EvmEndpoint::Http(_))
        ));
        assert!(matches!(
            "wss://example.org/ws".parse::<EvmEndpoint>(),
            Ok(EvmEndpoint::WebSocket(_))
        ));
        assert!("ftp://example.org".parse::<EvmEndpoint>().is_err());
        assert!("not a url".parse::<EvmEndpoint>().is_err());
    }

    #[test]
    fn signer_from_mnemonic() {
        let signer = make_signer(ANVIL_MNEMONIC, None).unwrap();
        assert_eq!(
            signer.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );

        let second = make_signer(ANVIL_MNEMONIC, Some(1)).unwrap();
        assert_eq!(
            second.address(),
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[test]
    fn signer_from_private_key() {
        let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let signer = make_signer(key, None).unwrap();
        assert_eq!(
            signer.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );

        assert!(matches!(
            make_signer(key, Some(2)),
            Err(EvmClientError::DerivationWithPrivateKey)
        ));
        assert!(matches!(
            make_signer("0x1234", None),
            Err(EvmClientError::InvalidPrivateKey(_))
        ));
    }
}
