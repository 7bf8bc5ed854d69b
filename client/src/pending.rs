//! Polling for transaction confirmation after [`Client::send_transaction`]
//! returns a hash.
//!
//! Grounded in `ethers-connections::pending::PendingTransaction` and
//! `ethers-providers::PendingTransaction`'s confirmation-polling loop, built
//! purely out of the client facade's existing `Call` surface.

use std::time::Duration;

use ethers_core::types::H256;
use tokio::time::Interval;

use eth_rpc_core::Connection;

use crate::{error::ClientError, types::TransactionReceipt, Client};

/// The default interval at which a pending transaction is re-polled.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(7);

/// A transaction hash being watched for confirmation.
pub struct PendingTransaction<'a, C> {
    pub hash: H256,
    client: &'a Client<C>,
}

impl<'a, C: Connection + 'static> PendingTransaction<'a, C> {
    pub fn new(hash: H256, client: &'a Client<C>) -> Self {
        Self { hash, client }
    }

    /// Polls until the transaction's receipt is at least `confirmations`
    /// blocks deep, or resolves to `None` if the transaction disappears from
    /// the mempool/chain (dropped, or re-orged away) before that happens.
    pub async fn confirmations(
        self,
        confirmations: u64,
        interval: Option<Duration>,
    ) -> Result<Option<TransactionReceipt>, ClientError> {
        let mut interval = tokio::time::interval(interval.unwrap_or(DEFAULT_POLL_INTERVAL));

        loop {
            interval.tick().await;

            let txn = match self.client.get_transaction_by_hash(&self.hash).await? {
                Some(txn) => txn,
                None => return Ok(None),
            };

            let block_number = match txn.block_number {
                Some(number) => number.low_u64(),
                None => continue,
            };

            let receipt = self.client.get_transaction_receipt(&self.hash).await?;
            if confirmations == 0 {
                return Ok(receipt);
            }

            let wanted = block_number + confirmations;
            return self.poll_confirmations(interval, wanted).await;
        }
    }

    async fn poll_confirmations(
        &self,
        mut interval: Interval,
        wanted_block_number: u64,
    ) -> Result<Option<TransactionReceipt>, ClientError> {
        loop {
            interval.tick().await;

            let receipt = match self.client.get_transaction_receipt(&self.hash).await? {
                Some(receipt) => receipt,
                None => return Ok(None),
            };

            if receipt.block_number.low_u64() >= wanted_block_number {
                return Ok(Some(receipt));
            }
        }
    }
}
