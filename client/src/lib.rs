//! A typed Ethereum JSON-RPC client facade.
//!
//! [`Client`] wraps any [`Connection`] (HTTP, WebSocket, IPC, [`Combined`], or
//! a [`RetryConnection`](eth_rpc_retry::RetryConnection) layered on any of
//! those) and exposes the `eth_*`/`net_*`/`web3_*` method surface, a
//! transaction-preprocessing pipeline (default-filling, pluggable
//! [`modifiers`], local key-based signing), and a URL-scheme constructor that
//! picks the right transport from a connection string.
//!
//! ABI encode/decode, RLP, and key management are explicitly out of scope —
//! they are consumed from `ethers-core` and `ethers-signers` as-is.

pub mod combined;
pub mod error;
pub mod modifiers;
pub mod pending;
pub mod types;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use ethers_core::types::{Address, Block, Bytes, Log, Signature, Transaction, H256, U256, U64};
use ethers_signers::{LocalWallet, Signer};

use eth_rpc_core::{BatchCall, BatchError, CallParams, Connection, DuplexConnection, RpcCall, SubscriptionStream};

pub use combined::Combined;
pub use error::ClientError;
use modifiers::TxModifier;
use pending::PendingTransaction;
use types::{BlockNumber, FeeHistory, Filter, SyncStatus, TransactionCall, TransactionReceipt, TransactionRequest};

/// A typed Ethereum JSON-RPC client.
///
/// Cheaply cloneable as long as its [`Connection`] is (typically an `Arc<_>`
/// or a reference); the signing-key table and modifier pipeline are plain
/// owned data, so cloning duplicates them.
pub struct Client<C> {
    connection: C,
    keys: HashMap<Address, LocalWallet>,
    default_chain_id: Option<u64>,
    default_from: Option<Address>,
    modifiers: Vec<Box<dyn TxModifier<C>>>,
}

impl<C: Clone> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            keys: self.keys.clone(),
            default_chain_id: self.default_chain_id,
            default_from: self.default_from,
            modifiers: Vec::new(),
        }
    }
}

impl<C> Client<C> {
    /// Wraps `connection` with no signing keys, no defaults, and no
    /// transaction modifiers.
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            keys: HashMap::new(),
            default_chain_id: None,
            default_from: None,
            modifiers: Vec::new(),
        }
    }

    /// Returns a reference to the wrapped connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Adds a locally-held signing key. `eth_accounts`, `sign`,
    /// `sign_transaction`, and `send_transaction` will route requests whose
    /// `from` matches `wallet.address()` through it instead of the node.
    pub fn with_signer(mut self, wallet: LocalWallet) -> Self {
        self.keys.insert(wallet.address(), wallet);
        self
    }

    /// Sets the chain id assumed for transactions that don't specify one, and
    /// that every preprocessed transaction's `chain_id` is verified against.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.default_chain_id = Some(chain_id);
        self
    }

    /// Sets the `from` address assumed for transactions that don't specify one.
    pub fn with_default_from(mut self, from: Address) -> Self {
        self.default_from = Some(from);
        self
    }

    /// Appends a step to the transaction-preprocessing pipeline, run in
    /// registration order after default-filling and before chain-id
    /// verification.
    pub fn with_modifier(mut self, modifier: impl TxModifier<C> + 'static) -> Self {
        self.modifiers.push(Box::new(modifier));
        self
    }

    /// Appends the built-in nonce-filling and legacy gas-price modifiers.
    pub fn with_default_modifiers(self) -> Self
    where
        C: Connection + 'static,
    {
        self.with_modifier(modifiers::FillNonce).with_modifier(modifiers::FillLegacyGasPrice)
    }
}

impl<C: Connection + 'static> Client<C> {
    fn prepare_rpc_call<T, R>(&self, method: &'static str, params: T) -> RpcCall<&C, R>
    where
        T: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let id = self.connection.request_id();
        RpcCall::new(&self.connection, CallParams::new(id, method, params))
    }

    /// Sends a batch of heterogeneous RPC calls and awaits their combined
    /// response, demultiplexed by id regardless of wire order.
    pub async fn send_batch<B: BatchCall>(&self, batch: B) -> Result<B::Output, BatchError> {
        batch.send_batch(&self.connection).await
    }

    pub fn get_syncing(&self) -> RpcCall<&C, SyncStatus> {
        self.prepare_rpc_call("eth_syncing", ())
    }

    pub fn get_coinbase(&self) -> RpcCall<&C, Address> {
        self.prepare_rpc_call("eth_coinbase", ())
    }

    pub fn get_gas_price(&self) -> RpcCall<&C, U256> {
        self.prepare_rpc_call("eth_gasPrice", ())
    }

    /// Returns the addresses of configured signing keys if any are set,
    /// otherwise asks the node via `eth_accounts`.
    pub async fn get_accounts(&self) -> Result<Box<[Address]>, ClientError> {
        if !self.keys.is_empty() {
            return Ok(self.keys.keys().copied().collect());
        }

        Ok(self.prepare_rpc_call("eth_accounts", ()).await?)
    }

    pub fn get_mining(&self) -> RpcCall<&C, bool> {
        self.prepare_rpc_call("eth_mining", ())
    }

    pub fn get_block_number(&self) -> RpcCall<&C, u64> {
        self.prepare_rpc_call("eth_blockNumber", ())
    }

    pub fn get_balance(&self, address: &Address, block: Option<BlockNumber>) -> RpcCall<&C, U256> {
        match block {
            Some(block) => self.prepare_rpc_call("eth_getBalance", (address, block)),
            None => self.prepare_rpc_call("eth_getBalance", [address]),
        }
    }

    pub fn get_storage_at(&self, address: &Address, pos: &U256, block: BlockNumber) -> RpcCall<&C, U256> {
        self.prepare_rpc_call("eth_getStorageAt", (address, pos, block))
    }

    pub fn get_transaction_count(&self, address: &Address, block: BlockNumber) -> RpcCall<&C, U256> {
        self.prepare_rpc_call("eth_getTransactionCount", (address, block))
    }

    pub fn get_code(&self, address: &Address) -> RpcCall<&C, Bytes> {
        self.prepare_rpc_call("eth_getCode", [address])
    }

    pub fn call(&self, txn: &TransactionCall) -> RpcCall<&C, Bytes> {
        self.prepare_rpc_call("eth_call", [txn])
    }

    pub fn estimate_gas(&self, txn: &TransactionCall) -> RpcCall<&C, U256> {
        self.prepare_rpc_call("eth_estimateGas", [txn])
    }

    pub fn fee_history(
        &self,
        block_count: u64,
        newest_block: BlockNumber,
        reward_percentiles: Option<&[u8]>,
    ) -> RpcCall<&C, FeeHistory> {
        match reward_percentiles {
            Some(reward_percentiles) => {
                self.prepare_rpc_call("eth_feeHistory", (block_count, newest_block, reward_percentiles))
            }
            None => self.prepare_rpc_call("eth_feeHistory", (block_count, newest_block)),
        }
    }

    pub fn get_block_by_hash(&self, hash: &H256) -> RpcCall<&C, Option<Block<H256>>> {
        self.prepare_rpc_call("eth_getBlockByHash", (hash, false))
    }

    pub fn get_block_by_hash_with_txns(&self, hash: &H256) -> RpcCall<&C, Option<Block<Transaction>>> {
        self.prepare_rpc_call("eth_getBlockByHash", (hash, true))
    }

    pub fn get_block_by_number(&self, block: BlockNumber) -> RpcCall<&C, Option<Block<H256>>> {
        self.prepare_rpc_call("eth_getBlockByNumber", (block, false))
    }

    pub fn get_block_by_number_with_txns(&self, block: BlockNumber) -> RpcCall<&C, Option<Block<Transaction>>> {
        self.prepare_rpc_call("eth_getBlockByNumber", (block, true))
    }

    pub fn get_transaction_by_hash(&self, hash: &H256) -> RpcCall<&C, Option<Transaction>> {
        self.prepare_rpc_call("eth_getTransactionByHash", [hash])
    }

    pub fn get_transaction_by_block_hash_and_index(
        &self,
        hash: &H256,
        index: u64,
    ) -> RpcCall<&C, Option<Transaction>> {
        self.prepare_rpc_call("eth_getTransactionByBlockHashAndIndex", (hash, U64::from(index)))
    }

    pub fn get_transaction_by_block_number_and_index(
        &self,
        block: BlockNumber,
        index: u64,
    ) -> RpcCall<&C, Option<Transaction>> {
        self.prepare_rpc_call("eth_getTransactionByBlockNumberAndIndex", (block, U64::from(index)))
    }

    pub fn get_transaction_receipt(&self, hash: &H256) -> RpcCall<&C, Option<TransactionReceipt>> {
        self.prepare_rpc_call("eth_getTransactionReceipt", [hash])
    }

    pub fn get_uncle_count_by_block_hash(&self, hash: &H256) -> RpcCall<&C, U256> {
        self.prepare_rpc_call("eth_getUncleCountByBlockHash", [hash])
    }

    pub fn get_uncle_count_by_block_number(&self, block: BlockNumber) -> RpcCall<&C, U256> {
        self.prepare_rpc_call("eth_getUncleCountByBlockNumber", [block])
    }

    pub fn install_log_filter(&self, filter: &Filter) -> RpcCall<&C, U256> {
        self.prepare_rpc_call("eth_newFilter", [filter])
    }

    pub fn get_log_filter_changes(&self, id: &U256) -> RpcCall<&C, Vec<Log>> {
        self.prepare_rpc_call("eth_getFilterChanges", [id])
    }

    pub fn install_block_filter(&self) -> RpcCall<&C, U256> {
        self.prepare_rpc_call("eth_newBlockFilter", ())
    }

    pub fn get_block_filter_changes(&self, id: &U256) -> RpcCall<&C, Vec<H256>> {
        self.prepare_rpc_call("eth_getFilterChanges", [id])
    }

    pub fn install_pending_transactions_filter(&self) -> RpcCall<&C, U256> {
        self.prepare_rpc_call("eth_newPendingTransactionsFilter", ())
    }

    pub fn get_pending_transactions_filter_changes(&self, id: &U256) -> RpcCall<&C, Vec<H256>> {
        self.prepare_rpc_call("eth_getFilterChanges", [id])
    }

    pub fn uninstall_filter(&self, id: &U256) -> RpcCall<&C, bool> {
        self.prepare_rpc_call("eth_uninstallFilter", [id])
    }

    pub fn net_version(&self) -> RpcCall<&C, String> {
        self.prepare_rpc_call("net_version", ())
    }

    pub fn net_peer_count(&self) -> RpcCall<&C, U256> {
        self.prepare_rpc_call("net_peerCount", ())
    }

    pub fn net_listening(&self) -> RpcCall<&C, bool> {
        self.prepare_rpc_call("net_listening", ())
    }

    pub fn web3_client_version(&self) -> RpcCall<&C, String> {
        self.prepare_rpc_call("web3_clientVersion", ())
    }

    pub fn web3_sha3(&self, data: Bytes) -> RpcCall<&C, H256> {
        self.prepare_rpc_call("web3_sha3", [data])
    }

    /// Signs `message` with the local key for `address` if one is
    /// configured; otherwise forwards to the node's `eth_sign`.
    ///
    /// **Note** if the node is asked to sign, the address must be unlocked.
    ///
    /// Errors if signing keys are configured but none of them match `address`
    /// — there is no silent fallback to the node once key-based routing is
    /// in play.
    pub async fn sign(&self, address: &Address, message: &Bytes) -> Result<Bytes, ClientError> {
        match self.keys.get(address) {
            Some(wallet) => {
                let signature = wallet.sign_message(message.as_ref()).await?;
                Ok(signature.to_vec().into())
            }
            None if self.keys.is_empty() => {
                Ok(self.prepare_rpc_call::<_, Bytes>("eth_sign", (address, message)).await?)
            }
            None => Err(ClientError::NoMatchingKey(*address)),
        }
    }

    /// Signs `txn` with the local key for its (already-defaulted) `from`
    /// address if one is configured; otherwise forwards to the node's
    /// `eth_signTransaction`.
    ///
    /// Errors if signing keys are configured but none of them match `from`.
    pub async fn sign_transaction(&self, txn: &TransactionRequest) -> Result<Bytes, ClientError> {
        let from = txn.from.ok_or_else(|| {
            ClientError::Modifier("sign_transaction requires a `from` address".into())
        })?;

        match self.keys.get(&from) {
            Some(wallet) => Ok(self.sign_transaction_locally(wallet, txn).await?),
            None if self.keys.is_empty() => Ok(self.prepare_rpc_call("eth_signTransaction", [txn]).await?),
            None => Err(ClientError::NoMatchingKey(from)),
        }
    }

    async fn sign_transaction_locally(
        &self,
        wallet: &LocalWallet,
        txn: &TransactionRequest,
    ) -> Result<Bytes, ClientError> {
        let typed = txn.to_typed_transaction();
        let signature: Signature = wallet.sign_transaction(&typed).await?;
        Ok(typed.rlp_signed(&signature))
    }

    pub fn send_raw_transaction(&self, data: Bytes) -> RpcCall<&C, H256> {
        self.prepare_rpc_call("eth_sendRawTransaction", [data])
    }

    /// Runs the transaction-preprocessing pipeline — default-filling,
    /// registered [`modifiers`], and chain-id verification — then either
    /// signs locally and broadcasts the raw bytes, or forwards the unsigned
    /// request to the node, depending on whether a local key matches `from`.
    pub async fn send_transaction(&self, mut txn: TransactionRequest) -> Result<H256, ClientError> {
        if txn.chain_id.is_none() {
            txn.chain_id = self.default_chain_id.map(U64::from);
        }
        if txn.from.is_none() {
            txn.from = self.default_from;
        }

        for modifier in &self.modifiers {
            modifier.modify(self, &mut txn).await?;
        }

        self.verify_chain_id(&txn)?;

        let from = txn.from.ok_or_else(|| {
            ClientError::Modifier("send_transaction requires a `from` address".into())
        })?;

        match self.keys.get(&from) {
            Some(wallet) => {
                let raw = self.sign_transaction_locally(wallet, &txn).await?;
                Ok(self.send_raw_transaction(raw).await?)
            }
            None if self.keys.is_empty() => Ok(self.prepare_rpc_call("eth_sendTransaction", [&txn]).await?),
            None => Err(ClientError::NoMatchingKey(from)),
        }
    }

    fn verify_chain_id(&self, txn: &TransactionRequest) -> Result<(), ClientError> {
        let found = txn.chain_id.map(|id| id.low_u64());
        match (self.default_chain_id, found) {
            (_, None) => Err(ClientError::ChainIdMismatch { expected: self.default_chain_id, found }),
            (Some(expected), Some(found)) if expected != found => {
                Err(ClientError::ChainIdMismatch { expected: Some(expected), found: Some(found) })
            }
            _ => Ok(()),
        }
    }

    /// Returns a [`PendingTransaction`] that polls for `hash`'s receipt.
    pub fn pending_transaction(&self, hash: H256) -> PendingTransaction<'_, C> {
        PendingTransaction::new(hash, self)
    }
}

impl<C: DuplexConnection + Clone + 'static> Client<C> {
    /// Installs a subscription for new blocks.
    pub async fn subscribe_blocks(&self) -> Result<SubscriptionStream<Block<H256>, C>, ClientError> {
        self.subscribe(["newHeads"]).await
    }

    /// Installs a subscription for new pending transaction hashes.
    pub async fn subscribe_pending_transactions(&self) -> Result<SubscriptionStream<H256, C>, ClientError> {
        self.subscribe(["pendingTransactions"]).await
    }

    /// Installs a subscription with the given `params`.
    pub async fn subscribe<T, R>(&self, params: T) -> Result<SubscriptionStream<R, C>, ClientError>
    where
        T: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let id: U256 = self.prepare_rpc_call("eth_subscribe", params).await?;
        let rx = self
            .connection
            .subscribe(id)
            .await?
            .expect("node replied with a subscription id already in local use");

        Ok(SubscriptionStream::new(id, self.connection.clone(), rx))
    }
}

fn url_scheme(url: &str) -> &str {
    match url.split_once("://") {
        Some((scheme, _)) => scheme,
        None => "",
    }
}

/// Connects a [`Client`] for `Call`-only use, selecting a transport by URL
/// scheme: `http`/`https` → HTTP, `ws`/`wss` → WebSocket, an empty scheme →
/// a local IPC socket path. Any other scheme is an error.
pub async fn connect(url: &str) -> Result<Client<std::sync::Arc<dyn Connection>>, ConnectError> {
    use std::sync::Arc;

    let connection: Arc<dyn Connection> = match url_scheme(url) {
        "http" | "https" => Arc::new(eth_rpc_transport_http::Http::new(url)?),
        "ws" | "wss" => Arc::new(eth_rpc_transport_ws::WebSocket::connect(url).await?),
        "" => Arc::new(eth_rpc_transport_ipc::Ipc::connect(url).await?),
        other => return Err(ConnectError::UnknownScheme(other.into())),
    };

    Ok(Client::new(connection))
}

/// Connects a [`Client`] usable for subscriptions as well as calls.
/// HTTP does not support duplex communication, so `http`/`https` URLs are
/// rejected here (use [`connect`] instead).
pub async fn connect_duplex(url: &str) -> Result<Client<std::sync::Arc<dyn DuplexConnection>>, ConnectError> {
    use std::sync::Arc;

    let connection: Arc<dyn DuplexConnection> = match url_scheme(url) {
        "http" | "https" => return Err(ConnectError::DuplexUnsupported),
        "ws" | "wss" => Arc::new(eth_rpc_transport_ws::WebSocket::connect(url).await?),
        "" => Arc::new(eth_rpc_transport_ipc::Ipc::connect(url).await?),
        other => return Err(ConnectError::UnknownScheme(other.into())),
    };

    Ok(Client::new(connection))
}

/// The error returned by the URL-scheme factory.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] eth_rpc_transport_http::InvalidUrl),
    #[error("websocket connection failed: {0}")]
    Ws(#[from] eth_rpc_transport_ws::WsError),
    #[error("ipc connection failed: {0}")]
    Ipc(#[from] eth_rpc_transport_ipc::IpcError),
    #[error("scheme {0:?} is not http(s), ws(s), or a local IPC path")]
    UnknownScheme(String),
    #[error("HTTP does not support subscriptions")]
    DuplexUnsupported,
}

#[cfg(test)]
mod tests {
    use ethers_core::types::Address;

    use eth_rpc_core::noop::Noop;

    use super::*;

    #[tokio::test]
    async fn object_safety_and_defaults() {
        let client = Client::new(Noop);
        assert!(client.get_block_number().await.is_err());
        assert!(client.get_accounts().await.is_err());
    }

    #[tokio::test]
    async fn configured_keys_are_returned_without_a_node_round_trip() {
        let wallet = test_wallet();
        let address = wallet.address();
        let client = Client::new(Noop).with_signer(wallet);

        let accounts = client.get_accounts().await.unwrap();
        assert_eq!(&*accounts, &[address]);
    }

    #[tokio::test]
    async fn send_transaction_without_chain_id_is_rejected() {
        let client = Client::new(Noop);
        let txn = TransactionRequest::legacy().from(Address::zero()).to(Address::zero());
        let err = client.send_transaction(txn).await.unwrap_err();
        assert!(matches!(err, ClientError::ChainIdMismatch { .. }));
    }

    fn test_wallet() -> LocalWallet {
        "380eb0f3d505f087e438eca80bc4df9a7faa24f868e69fc0440261a0fc0567dc"
            .parse()
            .unwrap()
    }
}
