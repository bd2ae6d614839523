//! Rental contract operations: provisioning, bidding and account queries.
//!
//! Token amounts cross this API in micro-DVZ (millionths of a token), and
//! incremental usefulness in micro-IU. No floating point money.

use crate::address::Address;
use crate::client::{ClientError, DeviseClient, TransactionOutcome, TOKEN_PRECISION};
use crate::contracts::{expect_address, expect_bool, expect_fixed_bytes, expect_u64, Token};
use crate::keystore;
use crate::ledger::DeviceTransport;
use crate::network::AResult;
use ethereum_types::U256;

/// Account summary as the rental contract tracks it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientSummary {
    /// The money account.
    pub client: Address,
    /// Address designated to query the data.
    pub beneficiary: Address,
    /// Tokens provisioned into the rental contract, in micro-DVZ.
    pub escrow_micro_dvz: u64,
    /// Wallet token balance, in micro-DVZ.
    pub token_micro_dvz: u64,
    /// Last paid lease term, as `month/year`.
    pub last_term_paid: Option<String>,
    /// Power user status.
    pub power_user: bool,
    /// Access to the historical data archives.
    pub historical_data_access: bool,
    /// Seats held in the current term.
    pub current_term_seats: u64,
    /// Seats projected for the next term.
    pub indicative_next_term_seats: u64,
}

/// One bid in the seat auction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Bid {
    /// The bidding money account.
    pub client: Address,
    /// Seats requested.
    pub seats: u64,
    /// Limit price per bit of usefulness and per seat, in micro-DVZ.
    pub limit_price_micro_dvz: u64,
}

/// One lepton in the catalog.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lepton {
    /// 40-byte lepton hash.
    pub hash: Vec<u8>,
    /// Hash of the preceding catalog entry; [`None`] for the first one.
    pub previous_hash: Option<Vec<u8>>,
    /// Incremental usefulness this lepton added, in micro-IU.
    pub incremental_usefulness_micro: u64,
}

pub(crate) fn chain_leptons(raw: Vec<(Vec<u8>, Vec<u8>, u64)>) -> Vec<Lepton> {
    //! Assemble catalog entries out of `(suffix, prefix, usefulness)`
    //! triples, linking each one to the hash before it.
    //!
    //! The contract stores the 40-byte hash split over two words, second
    //! half first.
    let mut leptons = Vec::with_capacity(raw.len());
    let mut previous_hash: Option<Vec<u8>> = None;
    for (suffix, prefix, micro_iu) in raw {
        let hash = [prefix, suffix].concat();
        leptons.push(Lepton {
            hash: hash.clone(),
            previous_hash: previous_hash.take(),
            incremental_usefulness_micro: micro_iu,
        });
        previous_hash = Some(hash);
    }
    leptons
}

pub(crate) fn lease_term_to_date(term_index: u64) -> Option<String> {
    //! Convert a contract lease term index to a `month/year` string.
    //! Index 0 means no term was ever paid.
    if term_index == 0 {
        return None;
    }
    let mut index = term_index;
    let mut year = 2018;
    while index > 12 {
        year += 1;
        index -= 12;
    }
    Some(format!("{}/{}", index + 1, year))
}

pub(crate) fn has_sufficient_escrow(
    limit_price_micro_dvz: u64,
    seats: u64,
    total_iu_micro: u64,
    escrow_micro_dvz: u64,
) -> bool {
    //! Can the escrow balance cover `limit price * seats * total usefulness`?
    //!
    //! Both the price and the usefulness carry a factor of 10^6, the balance
    //! only one, hence the 10^12 scale on the right-hand side.
    U256::from(limit_price_micro_dvz) * U256::from(seats) * U256::from(total_iu_micro)
        <= U256::from(escrow_micro_dvz) * U256::from(TOKEN_PRECISION) * U256::from(TOKEN_PRECISION)
}

pub(crate) fn required_escrow(limit_price_micro_dvz: u64, seats: u64, total_iu_micro: u64) -> U256 {
    //! Escrow a bid needs, in micro-DVZ, rounded up.
    let scale = U256::from(TOKEN_PRECISION) * U256::from(TOKEN_PRECISION);
    let exact = U256::from(limit_price_micro_dvz) * U256::from(seats) * U256::from(total_iu_micro);
    (exact + scale - 1) / scale
}

impl<T: DeviceTransport> DeviseClient<T> {
    async fn rental_uint(&self, function: &str, caller: Option<Address>) -> AResult<u64> {
        let tokens = self.contracts.rental.call(function, &[], caller).await?;
        Ok(expect_u64(tokens.first())?)
    }

    pub async fn escrow_balance(&self) -> AResult<u64> {
        //! Tokens provisioned into the rental contract for the current
        //! account, in micro-DVZ.
        self.rental_uint("getAllowance", Some(self.address())).await
    }

    pub async fn token_balance(&self) -> AResult<u64> {
        //! Wallet token balance of the current account, in micro-DVZ.
        self.balance_of(self.address()).await
    }

    pub async fn rent_per_seat_current_term(&self) -> AResult<u64> {
        //! Rent per seat for the current term, in micro-DVZ.
        self.rental_uint("getRentPerSeatCurrentTerm", None).await
    }

    pub async fn indicative_rent_per_seat_next_term(&self) -> AResult<u64> {
        //! Projected rent per seat for the next term, in micro-DVZ.
        self.rental_uint("getIndicativeRentPerSeatNextTerm", None).await
    }

    pub async fn price_per_bit_current_term(&self) -> AResult<u64> {
        //! Price per bit of usefulness for the current term, in micro-DVZ.
        self.rental_uint("getPricePerBitCurrentTerm", None).await
    }

    pub async fn indicative_price_per_bit_next_term(&self) -> AResult<u64> {
        //! Projected price per bit for the next term, in micro-DVZ.
        self.rental_uint("getIndicativePricePerBitNextTerm", None).await
    }

    pub async fn total_incremental_usefulness(&self) -> AResult<u64> {
        //! Total incremental usefulness of the catalog, in micro-IU.
        self.rental_uint("getTotalIncrementalUsefulness", None).await
    }

    pub async fn seats_available(&self) -> AResult<u64> {
        //! Seats still available for the current term.
        self.rental_uint("getSeatsAvailable", None).await
    }

    pub async fn current_lease_term(&self) -> AResult<Option<String>> {
        //! Current lease term as a `month/year` string.
        let index = self.rental_uint("getCurrentLeaseTerm", None).await?;
        Ok(lease_term_to_date(index))
    }

    pub async fn is_power_user(&self) -> AResult<bool> {
        //! Power user status of the current account.
        let tokens = self
            .contracts
            .rental
            .call("isPowerUser", &[], Some(self.address()))
            .await?;
        Ok(expect_bool(tokens.first())?)
    }

    pub async fn beneficiary(&self) -> AResult<Address> {
        //! The address designated to query data for the current account.
        let tokens = self
            .contracts
            .rental
            .call("getBeneficiary", &[], Some(self.address()))
            .await?;
        Ok(expect_address(tokens.first())?)
    }

    pub async fn client_for_beneficiary(&self, beneficiary: Address) -> AResult<Option<Address>> {
        //! The money account a beneficiary address acts for, if any.
        let tokens = self
            .contracts
            .rental
            .call("getClientForBeneficiary", &[], Some(beneficiary))
            .await?;
        let client = expect_address(tokens.first())?;
        Ok((!client.is_zero()).then_some(client))
    }

    pub async fn current_term_seats(&self) -> AResult<u64> {
        //! Seats allocated to the current account this lease term.
        match self.client_for_beneficiary(self.address()).await? {
            Some(client) => self.rental_uint("getCurrentTermSeats", Some(client)).await,
            None => Ok(0),
        }
    }

    pub async fn next_term_seats(&self) -> AResult<u64> {
        //! Seats projected for the current account next lease term.
        match self.client_for_beneficiary(self.address()).await? {
            Some(client) => self.rental_uint("getNextTermSeats", Some(client)).await,
            None => Ok(0),
        }
    }

    pub async fn client_summary(&self) -> AResult<ClientSummary> {
        //! Account summary for the current account.
        self.get_client_summary(self.address()).await
    }

    pub async fn get_client_summary(&self, client: Address) -> AResult<ClientSummary> {
        //! Account summary for any money account.
        let tokens = self
            .contracts
            .rental
            .call("getClientSummary", &[Token::Address(*client)], None)
            .await?;
        Ok(ClientSummary {
            client,
            beneficiary: expect_address(tokens.first())?,
            escrow_micro_dvz: expect_u64(tokens.get(1))?,
            token_micro_dvz: expect_u64(tokens.get(2))?,
            last_term_paid: lease_term_to_date(expect_u64(tokens.get(3))?),
            power_user: expect_bool(tokens.get(4))?,
            historical_data_access: expect_bool(tokens.get(5))?,
            current_term_seats: expect_u64(tokens.get(6))?,
            indicative_next_term_seats: expect_u64(tokens.get(7))?,
        })
    }

    pub async fn get_all_leptons(&self) -> AResult<Vec<Lepton>> {
        //! The lepton catalog in chain order, each entry carrying the hash
        //! of the one before it.
        let count = self.rental_uint("getNumberOfStrategies", None).await?;
        let mut raw = Vec::with_capacity(count as usize);
        for index in 0..count {
            let tokens = self
                .contracts
                .rental
                .call("getStrategy", &[Token::Uint(index.into())], None)
                .await?;
            raw.push((
                expect_fixed_bytes(tokens.first())?,
                expect_fixed_bytes(tokens.get(1))?,
                expect_u64(tokens.get(2))?,
            ));
        }
        Ok(chain_leptons(raw))
    }

    pub async fn get_all_clients(&self) -> AResult<Vec<ClientSummary>> {
        //! Summaries of every renter of the current lease term.
        let count = self.rental_uint("getNumberOfRenters", None).await?;
        let mut clients = Vec::with_capacity(count as usize);
        for index in 0..count {
            let tokens = self
                .contracts
                .rental
                .call("getRenter", &[Token::Uint(index.into())], None)
                .await?;
            let renter = expect_address(tokens.first())?;
            clients.push(self.get_client_summary(renter).await?);
        }
        Ok(clients)
    }

    fn parse_bid(&self, tokens: &[Token]) -> AResult<Option<Bid>> {
        let client = expect_address(tokens.first())?;
        if client.is_zero() {
            return Ok(None);
        }
        Ok(Some(Bid {
            client,
            seats: expect_u64(tokens.get(1))?,
            limit_price_micro_dvz: expect_u64(tokens.get(2))?,
        }))
    }

    pub async fn get_all_bidders(&self, active_only: bool) -> AResult<Vec<Bid>> {
        //! Bids in the seat auction, highest first.
        //!
        //! With `active_only`, bids whose escrow cannot cover them are
        //! filtered out.
        let mut bids = Vec::new();
        let tokens = self.contracts.rental.call("getHighestBidder", &[], None).await;
        let Ok(tokens) = tokens else {
            return Ok(bids);
        };
        let mut current = self.parse_bid(&tokens)?;
        while let Some(bid) = current {
            let keep = !active_only || {
                let escrow = self
                    .rental_uint("getAllowance", Some(bid.client))
                    .await?;
                let total_iu = self.total_incremental_usefulness().await?;
                has_sufficient_escrow(bid.limit_price_micro_dvz, bid.seats, total_iu, escrow)
            };
            let next = self
                .contracts
                .rental
                .call("getNextHighestBidder", &[Token::Address(*bid.client)], None)
                .await;
            if keep {
                bids.push(bid);
            }
            // the contract throws once the chain of bids is exhausted
            current = match next {
                Ok(tokens) => self.parse_bid(&tokens)?,
                Err(_) => None,
            };
        }
        Ok(bids)
    }

    pub async fn provision(&self, micro_dvz: u64) -> AResult<TransactionOutcome> {
        //! Move tokens from the wallet into the rental contract escrow.
        //!
        //! Issues an approval on the token contract first, then the actual
        //! provision.
        tracing::info!("approving token transfer to the rental contract");
        self.approve(self.contracts.rental.address, micro_dvz).await?;

        tracing::info!(micro_dvz, "provisioning the rental contract");
        let call = self
            .contracts
            .rental
            .call_request("provision", &[Token::Uint(micro_dvz.into())])?;
        self.transact(call).await
    }

    pub async fn withdraw(&self, micro_dvz: u64) -> AResult<TransactionOutcome> {
        //! Move tokens from the escrow back into the wallet.
        let call = self
            .contracts
            .rental
            .call_request("withdraw", &[Token::Uint(micro_dvz.into())])?;
        self.transact(call).await
    }

    pub async fn lease_all(
        &self,
        limit_price_micro_dvz: u64,
        seats: u64,
    ) -> AResult<TransactionOutcome> {
        //! Bid for seats at a limit price per bit of usefulness and seat.
        //!
        //! Fails fast when the escrow balance cannot cover the bid.
        let escrow = self.escrow_balance().await?;
        let total_iu = self.total_incremental_usefulness().await?;
        if !has_sufficient_escrow(limit_price_micro_dvz, seats, total_iu, escrow) {
            return Err(ClientError::InsufficientEscrow {
                required: required_escrow(limit_price_micro_dvz, seats, total_iu),
                available: escrow,
            }
            .into());
        }
        tracing::info!(
            limit_price_micro_dvz,
            seats,
            "placing a bid to lease all"
        );
        let call = self.contracts.rental.call_request(
            "leaseAll",
            &[
                Token::Uint(limit_price_micro_dvz.into()),
                Token::Uint(seats.into()),
            ],
        )?;
        self.transact(call).await
    }

    pub async fn cancel_bid(&self) -> AResult<Option<TransactionOutcome>> {
        //! Cancel the bid the current account placed, if any.
        let own = self.address();
        for bid in self.get_all_bidders(false).await? {
            if bid.client == own {
                let call = self.contracts.rental.call_request(
                    "leaseAll",
                    &[
                        Token::Uint(bid.limit_price_micro_dvz.into()),
                        Token::Uint(0u64.into()),
                    ],
                )?;
                return Ok(Some(self.transact(call).await?));
            }
        }
        Ok(None)
    }

    pub async fn designate_beneficiary(&self, beneficiary: Address) -> AResult<TransactionOutcome> {
        //! Authorize an address to query data on behalf of this account.
        let call = self
            .contracts
            .rental
            .call_request("designateBeneficiary", &[Token::Address(*beneficiary)])?;
        self.transact(call).await
    }

    pub async fn apply_for_power_user(&self) -> AResult<bool> {
        //! Request power user status; returns the status after the change.
        let call = self.contracts.rental.call_request("applyForPowerUser", &[])?;
        self.transact(call).await?;
        Ok(self.client_summary().await?.power_user)
    }

    pub async fn request_historical_data_access(&self) -> AResult<bool> {
        //! Request access to the historical archives; returns the access
        //! flag after the change.
        let call = self
            .contracts
            .rental
            .call_request("requestHistoricalData", &[])?;
        self.transact(call).await?;
        Ok(self.client_summary().await?.historical_data_access)
    }

    pub async fn create_beneficiary(
        &self,
        password: &str,
    ) -> AResult<(TransactionOutcome, Address)> {
        //! Generate a fresh account and designate it as this client's
        //! beneficiary. Returns the designation outcome and the new address.
        let (path, address) = keystore::generate_account(password)?;
        tracing::info!(
            path = %path.display(),
            %address,
            "generated a key file for the new beneficiary"
        );
        let outcome = self.designate_beneficiary(address).await?;
        Ok((outcome, address))
    }
}
