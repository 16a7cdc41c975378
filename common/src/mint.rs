//! Mint instruction payload and the two-message transaction that carries it.
//!
//! Wire shape of the payload:
//!
//! ```text
//! root     [uint32 opcode][uint64 query_id][coins forward_amount]  ref -> item
//! item     [address owner][address owner]                          ref -> content
//! content  [string tail: content url, chained when longer than one cell]
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::address::{Address, AddressError};
use crate::cell::{Cell, CellBuilder, CellError, CellResult};
use crate::metadata::ValidationError;

/// Opcode of the mint method on the collection contract.
pub const MINT_OPCODE: u32 = 1;

/// Query id sent with every mint.
pub const MINT_QUERY_ID: u64 = 123;

/// Value forwarded by the collection to the new item, in nanounits.
pub const FORWARD_AMOUNT: u128 = 50_000_000;

/// Value attached to the mint message, in nanounits.
pub const MINT_MESSAGE_AMOUNT: u128 = 55_000_000;

/// Flat fee transferred with every mint, in nanounits.
pub const FEE_AMOUNT: u128 = 100_000_000;

/// Collection contract receiving the mint message.
pub const MINT_CONTRACT: &str = "EQBsrBcQEljeB4clOLGBHEM5UvzZZy6_Rv65obhkJV89NdA9";

/// Recipient of the flat fee.
pub const FEE_RECIPIENT: &str = "UQAI6XfeQmLtZ8qzeoNWJRYG8wfuWQZBZHZF5-eUH7kDiZVN";

/// Longest accepted content url. Longer urls would chain the payload
/// deeper than the chain accepts.
pub const MAX_CONTENT_URL_BYTES: usize = 4096;

/// Seconds a transaction request stays valid.
pub const VALIDITY_WINDOW_SECS: u64 = 300;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction rejected by wallet: {0}")]
    Rejected(String),

    #[error("transaction cancelled by user")]
    Cancelled,

    #[error("broadcast failed: {0}")]
    Broadcast(String),

    #[error("wallet returned an unreadable message: {0}")]
    MalformedReceipt(CellError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MintError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to build mint payload: {0}")]
    Cell(#[from] CellError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// One message of a transaction request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMessage {
    pub address: String,
    /// Nanounits as decimal text.
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// The request handed to a wallet for signing and broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub valid_until: u64,
    pub messages: Vec<TransactionMessage>,
}

/// What a wallet returns after broadcasting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Base64 bag of cells of the external message.
    pub boc: String,
}

/// The wallet's transaction-signing and broadcast capability.
pub trait WalletSender {
    fn send_transaction(
        &self,
        request: &TransactionRequest,
    ) -> impl Future<Output = Result<SendReceipt, TransactionError>> + Send;
}

/// A decoded mint payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintPayload {
    pub opcode: u32,
    pub query_id: u64,
    pub forward_amount: u128,
    pub owner: Address,
    pub content_url: String,
}

impl MintPayload {
    pub fn new(owner: Address, content_url: impl Into<String>) -> Self {
        Self {
            opcode: MINT_OPCODE,
            query_id: MINT_QUERY_ID,
            forward_amount: FORWARD_AMOUNT,
            owner,
            content_url: content_url.into(),
        }
    }

    /// Build the payload cell tree.
    pub fn to_cell(&self) -> CellResult<Cell> {
        let mut content = CellBuilder::new();
        content.store_string_tail(&self.content_url)?;

        let mut item = CellBuilder::new();
        item.store_address(&self.owner)?
            .store_ref(content.end_cell())?
            .store_address(&self.owner)?;

        let mut root = CellBuilder::new();
        root.store_uint(self.opcode as u64, 32)?
            .store_uint(self.query_id, 64)?
            .store_coins(self.forward_amount)?
            .store_ref(item.end_cell())?;
        Ok(root.end_cell())
    }

    /// Read a payload cell tree back.
    pub fn from_cell(cell: &Cell) -> CellResult<Self> {
        let mut root = cell.parse();
        let opcode = root.load_uint(32)? as u32;
        let query_id = root.load_uint(64)?;
        let forward_amount = root.load_coins()?;

        let mut item = root.load_ref()?.parse();
        let owner = item.load_address()?.ok_or(CellError::UnsupportedAddress(0))?;
        let content_url = item.load_ref()?.parse().load_string_tail()?;

        Ok(Self {
            opcode,
            query_id,
            forward_amount,
            owner,
            content_url,
        })
    }
}

/// Addresses and amounts used to compose mint transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintParams {
    pub contract: String,
    pub fee_recipient: String,
    pub mint_amount: u128,
    pub fee_amount: u128,
    pub validity_secs: u64,
}

impl Default for MintParams {
    fn default() -> Self {
        Self {
            contract: MINT_CONTRACT.to_string(),
            fee_recipient: FEE_RECIPIENT.to_string(),
            mint_amount: MINT_MESSAGE_AMOUNT,
            fee_amount: FEE_AMOUNT,
            validity_secs: VALIDITY_WINDOW_SECS,
        }
    }
}

/// Builds mint transaction requests. Performs no I/O of its own.
#[derive(Debug, Clone, Default)]
pub struct MintComposer {
    params: MintParams,
}

/// A broadcast mint: the request that was sent and the wallet's message.
#[derive(Debug, Clone)]
pub struct MintOutcome {
    pub request: TransactionRequest,
    pub message: Cell,
}

impl MintComposer {
    /// Fails if either configured destination is not a valid address.
    pub fn new(params: MintParams) -> Result<Self, AddressError> {
        Address::parse(&params.contract)?;
        Address::parse(&params.fee_recipient)?;
        Ok(Self { params })
    }

    /// Compose a request valid for the configured window from now.
    pub fn compose(&self, recipient: &str, content_url: &str) -> Result<TransactionRequest, MintError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.compose_at(recipient, content_url, now)
    }

    pub fn compose_at(
        &self,
        recipient: &str,
        content_url: &str,
        now_secs: u64,
    ) -> Result<TransactionRequest, MintError> {
        let owner = Address::parse(recipient)?;
        if content_url.trim().is_empty() {
            return Err(ValidationError::Required("content_url").into());
        }
        if content_url.len() > MAX_CONTENT_URL_BYTES {
            return Err(ValidationError::TooLong {
                field: "content_url",
                max: MAX_CONTENT_URL_BYTES,
            }
            .into());
        }

        let payload = MintPayload::new(owner, content_url).to_cell()?;

        Ok(TransactionRequest {
            valid_until: now_secs + self.params.validity_secs,
            messages: vec![
                TransactionMessage {
                    address: self.params.contract.clone(),
                    amount: self.params.mint_amount.to_string(),
                    payload: Some(payload.to_base64()),
                },
                TransactionMessage {
                    address: self.params.fee_recipient.clone(),
                    amount: self.params.fee_amount.to_string(),
                    payload: None,
                },
            ],
        })
    }

    /// Compose a mint and hand it to the wallet. A failed send leaves no
    /// trace beyond the log line.
    pub async fn send<W: WalletSender>(
        &self,
        wallet: &W,
        recipient: &str,
        content_url: &str,
    ) -> Result<MintOutcome, MintError> {
        let request = self.compose(recipient, content_url)?;
        tracing::info!(
            "Sending mint for {} ({} messages, valid until {})",
            recipient,
            request.messages.len(),
            request.valid_until
        );

        let receipt = match wallet.send_transaction(&request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::error!("Error sending transaction: {}", e);
                return Err(e.into());
            }
        };

        let message = Cell::from_base64(&receipt.boc).map_err(|e| {
            tracing::error!("Wallet receipt is not a valid bag of cells: {}", e);
            TransactionError::MalformedReceipt(e)
        })?;

        Ok(MintOutcome { request, message })
    }
}
