//! Token and token sale operations.
//!
//! Amounts cross this API in micro-DVZ; ether values in wei.

use crate::address::Address;
use crate::client::{
    ClientError, DeviseClient, TransactionOutcome, TOKEN_PRECISION, WEI_PER_ETHER,
};
use crate::contracts::{expect_bool, expect_u64, expect_uint, Token};
use crate::ledger::DeviceTransport;
use crate::network::{AResult, CallRequest};
use ethereum_types::U256;

pub(crate) fn token_purchase_cost_wei(micro_dvz: u64, rate: u64) -> U256 {
    //! Wei needed to buy `micro_dvz` tokens at `rate` tokens per ether.
    //!
    //! One extra micro-DVZ is priced in so truncation inside the sale
    //! contract cannot leave the purchase short.
    let wei_per_micro_sale = U256::from(WEI_PER_ETHER / TOKEN_PRECISION);
    wei_per_micro_sale * (U256::from(micro_dvz) + 1) / U256::from(rate)
}

impl<T: DeviceTransport> DeviseClient<T> {
    async fn token_uint(&self, function: &str, args: &[Token]) -> AResult<u64> {
        let tokens = self.contracts.token.call(function, args, None).await?;
        Ok(expect_u64(tokens.first())?)
    }

    async fn sale_uint(&self, function: &str, args: &[Token]) -> AResult<u64> {
        let tokens = self.contracts.token_sale.call(function, args, None).await?;
        Ok(expect_u64(tokens.first())?)
    }

    pub async fn total_supply(&self) -> AResult<u64> {
        //! Total token supply, in micro-DVZ.
        self.token_uint("totalSupply", &[]).await
    }

    pub async fn token_cap(&self) -> AResult<u64> {
        //! Maximal possible token supply, in micro-DVZ.
        self.token_uint("cap", &[]).await
    }

    pub async fn balance_of(&self, owner: Address) -> AResult<u64> {
        //! Token balance of any address, in micro-DVZ.
        self.token_uint("balanceOf", &[Token::Address(*owner)]).await
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> AResult<u64> {
        //! Amount `spender` may transfer out of `owner`, in micro-DVZ.
        self.token_uint(
            "allowance",
            &[Token::Address(*owner), Token::Address(*spender)],
        )
        .await
    }

    pub async fn transfer(&self, to: Address, micro_dvz: u64) -> AResult<TransactionOutcome> {
        //! Transfer tokens from the current account.
        let call = self.contracts.token.call_request(
            "transfer",
            &[Token::Address(*to), Token::Uint(micro_dvz.into())],
        )?;
        self.transact(call).await
    }

    pub async fn transfer_from(
        &self,
        from: Address,
        to: Address,
        micro_dvz: u64,
    ) -> AResult<TransactionOutcome> {
        //! Transfer previously approved tokens between two other accounts.
        let call = self.contracts.token.call_request(
            "transferFrom",
            &[
                Token::Address(*from),
                Token::Address(*to),
                Token::Uint(micro_dvz.into()),
            ],
        )?;
        self.transact(call).await
    }

    pub async fn approve(&self, spender: Address, micro_dvz: u64) -> AResult<TransactionOutcome> {
        //! Authorize `spender` to transfer up to `micro_dvz` tokens.
        let call = self.contracts.token.call_request(
            "approve",
            &[Token::Address(*spender), Token::Uint(micro_dvz.into())],
        )?;
        self.transact(call).await
    }

    pub async fn increase_approval(
        &self,
        spender: Address,
        micro_dvz: u64,
    ) -> AResult<TransactionOutcome> {
        //! Raise the allowance of `spender` by `micro_dvz`.
        let call = self.contracts.token.call_request(
            "increaseApproval",
            &[Token::Address(*spender), Token::Uint(micro_dvz.into())],
        )?;
        self.transact(call).await
    }

    pub async fn decrease_approval(
        &self,
        spender: Address,
        micro_dvz: u64,
    ) -> AResult<TransactionOutcome> {
        //! Lower the allowance of `spender` by `micro_dvz`.
        let call = self.contracts.token.call_request(
            "decreaseApproval",
            &[Token::Address(*spender), Token::Uint(micro_dvz.into())],
        )?;
        self.transact(call).await
    }

    pub async fn sale_opening_time(&self) -> AResult<u64> {
        //! Unix timestamp at which the token sale opens.
        self.sale_uint("openingTime", &[]).await
    }

    pub async fn sale_closing_time(&self) -> AResult<u64> {
        //! Unix timestamp at which the token sale closes.
        self.sale_uint("closingTime", &[]).await
    }

    pub async fn eth_dvz_rate(&self) -> AResult<u64> {
        //! Current sale rate: how many tokens one ether buys.
        self.sale_uint("getCurrentRate", &[]).await
    }

    pub async fn sale_has_closed(&self) -> AResult<bool> {
        //! Has the token sale closed?
        let tokens = self
            .contracts
            .token_sale
            .call("hasClosed", &[], None)
            .await?;
        Ok(expect_bool(tokens.first())?)
    }

    pub async fn remaining_tokens(&self) -> AResult<u64> {
        //! Tokens still up for sale, in micro-DVZ.
        self.sale_uint("remainingTokens", &[]).await
    }

    pub async fn ether_cost(&self, micro_dvz: u64) -> AResult<U256> {
        //! Wei needed to buy `micro_dvz` tokens at the current rate.
        let rate = self.eth_dvz_rate().await?;
        Ok(token_purchase_cost_wei(micro_dvz, rate))
    }

    async fn buy_wei_worth(&self, wei: U256) -> AResult<TransactionOutcome> {
        // the sale refuses dust orders; surface its minimum before signing
        let tokens = self
            .contracts
            .token_sale
            .call("hasMinimumOrderSize", &[Token::Uint(wei)], None)
            .await?;
        if !expect_bool(tokens.first())? {
            return Err(ClientError::BelowMinimumOrder {
                minimum_tokens: expect_u64(tokens.get(1))?,
                minimum_wei: expect_uint(tokens.get(2))?,
            }
            .into());
        }
        tracing::info!(%wei, "purchasing tokens from the sale contract");
        self.transact(CallRequest {
            to: Some(self.contracts.token_sale.address),
            value: Some(wei),
            ..CallRequest::default()
        })
        .await
    }

    pub async fn buy_tokens(&self, micro_dvz: u64) -> AResult<TransactionOutcome> {
        //! Buy a specific amount of tokens with ether.
        let wei = self.ether_cost(micro_dvz).await?;
        self.buy_wei_worth(wei).await
    }

    pub async fn buy_eth_worth_of_tokens(&self, wei: U256) -> AResult<TransactionOutcome> {
        //! Spend a specific amount of ether on tokens.
        self.buy_wei_worth(wei).await
    }
}
