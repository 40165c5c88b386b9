use alloy_primitives::TxHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvmClientError {
    #[error("HD index must be zero when using a private key (use mnemonic instead)")]
    DerivationWithPrivateKey,

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid mnemonic: {0}")]
    Mnemonic(String),

    #[error("Unable to parse endpoint: {0}")]
    ParseEndpoint(String),

    #[error("Unable to create web socket provider: {0:#}")]
    WebSocketProvider(anyhow::Error),

    #[error("Unable to query balance: {0:#}")]
    Balance(anyhow::Error),

    #[error("Send Transaction Error: {0:#}")]
    SendTransaction(anyhow::Error),

    #[error("No Transaction Receipt: {0:#}")]
    TransactionWithoutReceipt(anyhow::Error),

    #[error("Transaction {0} reverted")]
    TransactionReverted(TxHash),

    #[error("Transaction {0} did not create a contract")]
    NoContractAddress(TxHash),
}
