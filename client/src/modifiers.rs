//! Transaction modifiers: an ordered, caller-extensible pipeline step that
//! runs between default-filling and final chain-id verification in
//! [`Client::send_transaction`](crate::Client::send_transaction).
//!
//! Grounded in `ethers-middleware`'s [`NonceManagerMiddleware`] and gas-oracle
//! middlewares, but re-expressed as plain ordered trait objects rather than a
//! middleware stack: each modifier is a self-contained step with access to
//! the facade's `Call` surface, not a wrapper around the whole client.
//!
//! [`NonceManagerMiddleware`]: https://docs.rs/ethers-middleware

use async_trait::async_trait;

use eth_rpc_core::Connection;

use crate::{error::ClientError, types::TransactionRequest, Client};

/// A single step in the transaction-preprocessing pipeline.
///
/// Implementors may issue their own RPC calls through `client` (e.g. a nonce
/// lookup or a gas-price estimate) before mutating `tx`.
#[async_trait]
pub trait TxModifier<C>: Send + Sync {
    async fn modify(&self, client: &Client<C>, tx: &mut TransactionRequest) -> Result<(), ClientError>;
}

/// Fills `nonce` from `eth_getTransactionCount` against the pending block,
/// unless the caller already set one.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillNonce;

#[async_trait]
impl<C: Connection + 'static> TxModifier<C> for FillNonce {
    async fn modify(&self, client: &Client<C>, tx: &mut TransactionRequest) -> Result<(), ClientError> {
        if tx.nonce.is_some() {
            return Ok(());
        }

        let from = tx.from.ok_or_else(|| {
            ClientError::Modifier("cannot fill nonce before `from` is known".into())
        })?;

        tx.nonce = Some(client.get_transaction_count(&from, "pending".into()).await?);
        Ok(())
    }
}

/// Fills a legacy (pre-EIP-1559) `gas_price` from `eth_gasPrice`, unless the
/// caller already set one. A no-op for [`Eip1559`](crate::types::TransactionType::Eip1559)
/// transactions, which price gas via `max_fee_per_gas` instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillLegacyGasPrice;

#[async_trait]
impl<C: Connection + 'static> TxModifier<C> for FillLegacyGasPrice {
    async fn modify(&self, client: &Client<C>, tx: &mut TransactionRequest) -> Result<(), ClientError> {
        use crate::types::TransactionType;

        if tx.legacy_gas_price().is_some() {
            return Ok(());
        }

        let gas_price = client.get_gas_price().await?;
        match &mut tx.transaction_type {
            TransactionType::Legacy { gas_price: gp } => *gp = Some(gas_price),
            TransactionType::Eip2930 { gas_price: gp, .. } => *gp = Some(gas_price),
            TransactionType::Eip1559 { .. } => {}
        }
        Ok(())
    }
}
