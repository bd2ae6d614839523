//! Hardware wallet signing over the Ledger HID transport.
//!
//! The device holds the private key; this module only ships RLP payloads to
//! it and reassembles the `(v, r, s)` triples it answers with. All device
//! traffic goes through the [`DeviceTransport`] trait so the protocol logic
//! stays testable without a physical device on the bench.

use crate::address::Address;
use crate::apdu::{self, ApduCommand, ApduError};
use crate::transactions::{Signature, Transaction};
use async_trait::async_trait;
use coins_ledger::{
    common::{APDUCommand, APDUData},
    transports::{Ledger, LedgerAsync},
};
use futures_executor::block_on;
use std::sync::{Arc, Mutex, PoisonError};

/// How many consecutive account indexes to walk when looking for a known
/// address on the device.
pub const PROBE_ACCOUNTS: u32 = 20;

/// How long to wait for the device (and the user confirming on it) per
/// command.
pub const EXCHANGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Failures talking to the hardware device.
#[derive(Debug)]
#[non_exhaustive]
pub enum LedgerError {
    /// Underlying HID transport failure.
    Transport(coins_ledger::errors::LedgerError),
    /// Response did not match the expected frame layout.
    Apdu(ApduError),
    /// Device returned a frame with no data section.
    EmptyResponse,
    /// Device did not answer within [`EXCHANGE_TIMEOUT`].
    Timeout,
    /// The worker thread driving the device exchange died.
    Worker(tokio::task::JoinError),
    /// No device account carries the requested address.
    AccountNotFound(Address),
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(source) => Some(source),
            Self::Apdu(source) => Some(source),
            Self::Worker(source) => Some(source),
            _ => None,
        }
    }
}
impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(source) => write!(f, "Ledger transport failure: {source}"),
            Self::Apdu(source) => write!(f, "Malformed device response: {source}"),
            Self::EmptyResponse => f.write_str("Device returned an empty response"),
            Self::Timeout => f.write_str("Device did not answer in time"),
            Self::Worker(source) => write!(f, "Device exchange thread failed: {source}"),
            Self::AccountNotFound(address) => write!(
                f,
                "None of the first {PROBE_ACCOUNTS} device accounts holds {address}"
            ),
        }
    }
}
impl From<coins_ledger::errors::LedgerError> for LedgerError {
    fn from(source: coins_ledger::errors::LedgerError) -> Self {
        Self::Transport(source)
    }
}
impl From<ApduError> for LedgerError {
    fn from(source: ApduError) -> Self {
        Self::Apdu(source)
    }
}

/// Byte-level exchange with a Ledger device.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Send one command frame and return the data section of the answer.
    async fn exchange(&self, command: &ApduCommand) -> Result<Vec<u8>, LedgerError>;
}

/// The real HID transport.
///
/// The HID handle is not `Sync`, so it lives behind a mutex and every
/// exchange runs on a blocking worker thread.
pub struct HidTransport {
    inner: Arc<Mutex<Ledger>>,
}

impl HidTransport {
    pub async fn init() -> Result<Self, LedgerError> {
        //! Acquire the first connected Ledger device.
        Ok(Self {
            inner: Arc::new(Mutex::new(Ledger::init().await?)),
        })
    }
}

#[async_trait]
impl DeviceTransport for HidTransport {
    async fn exchange(&self, command: &ApduCommand) -> Result<Vec<u8>, LedgerError> {
        let request = APDUCommand {
            ins: command.ins as u8,
            p1: command.p1,
            p2: command.p2,
            data: APDUData::new(&command.data),
            response_len: None,
        };
        let device = Arc::clone(&self.inner);
        let exchange = tokio::task::spawn_blocking(move || {
            let device = device.lock().unwrap_or_else(PoisonError::into_inner);
            block_on(device.exchange(&request))
        });
        // the worker keeps blocking past the timeout; we just stop waiting
        let joined = tokio::time::timeout(EXCHANGE_TIMEOUT, exchange)
            .await
            .map_err(|_| LedgerError::Timeout)?;
        let answer = joined.map_err(LedgerError::Worker)??;
        answer
            .data()
            .map(<[u8]>::to_vec)
            .ok_or(LedgerError::EmptyResponse)
    }
}

pub async fn fetch_address<T: DeviceTransport>(
    transport: &T,
    account_index: u32,
) -> Result<Address, LedgerError> {
    //! Query the address of one device account.
    let response = transport
        .exchange(&ApduCommand::get_address(account_index))
        .await?;
    Ok(apdu::parse_address_response(&response)?)
}

pub async fn find_account<T: DeviceTransport>(
    transport: &T,
    target: &Address,
) -> Result<u32, LedgerError> {
    //! Walk the first [`PROBE_ACCOUNTS`] device accounts and return the
    //! index holding `target`.
    for account_index in 0..PROBE_ACCOUNTS {
        let address = fetch_address(transport, account_index).await?;
        tracing::debug!(account_index, %address, "probed device account");
        if address == *target {
            return Ok(account_index);
        }
    }
    Err(LedgerError::AccountNotFound(*target))
}

/// A signer backed by one account of a connected device.
pub struct LedgerSigner<T> {
    transport: T,
    account_index: u32,
    address: Address,
}

impl LedgerSigner<HidTransport> {
    pub async fn open(account_index: u32) -> Result<Self, LedgerError> {
        //! Connect to the first Ledger device and bind to one account.
        Self::with_transport(HidTransport::init().await?, account_index).await
    }

    pub async fn open_for_address(address: &Address) -> Result<Self, LedgerError> {
        //! Connect to the first Ledger device and bind to whichever of its
        //! first [`PROBE_ACCOUNTS`] accounts holds `address`.
        let transport = HidTransport::init().await?;
        let account_index = find_account(&transport, address).await?;
        Self::with_transport(transport, account_index).await
    }
}

impl<T: DeviceTransport> LedgerSigner<T> {
    pub async fn with_transport(transport: T, account_index: u32) -> Result<Self, LedgerError> {
        //! Bind to one account over an already-open transport.
        let address = fetch_address(&transport, account_index).await?;
        Ok(Self {
            transport,
            account_index,
            address,
        })
    }

    /// Address of the bound device account.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Derivation index of the bound device account.
    pub fn account_index(&self) -> u32 {
        self.account_index
    }

    pub async fn sign_transaction(&self, tx: &Transaction) -> Result<Transaction, LedgerError> {
        //! Have the device sign `tx` and return a signed copy.
        //!
        //! The unsigned RLP travels to the device verbatim; the user has to
        //! confirm the details on the device screen before it answers.
        let command = ApduCommand::sign_transaction(self.account_index, &tx.unsigned_rlp());
        let response = self.transport.exchange(&command).await?;
        let (v, r, s) = apdu::parse_signature_response(&response)?;
        Ok(tx.with_signature(Signature::from_device(v, r, s, tx.chain_id)))
    }
}
