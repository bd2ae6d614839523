//! The rental web API: signed URLs and artifact downloads.
//!
//! The API authenticates requests through a detached signature over the
//! request URI: query parameters are sorted, the whole URI is lowercased,
//! hashed with the personal-message prefix and signed with the account key.
//! The signature travels as one more query parameter.

use crate::client::DeviseClient;
use crate::ledger::DeviceTransport;
use crate::network::AResult;
use crate::wallet::WalletError;
use rustc_hex::ToHex;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::form_urlencoded;

const USER_AGENT: &str = concat!("devise-client/", env!("CARGO_PKG_VERSION"));

fn encode_query(params: &BTreeMap<String, String>) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

impl<T: DeviceTransport> DeviseClient<T> {
    pub fn signed_api_uri<I, K, V>(&self, api_uri: &str, params: I) -> Result<String, WalletError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        //! Build a signed URI (path + query) for the rental API.
        //!
        //! The account address always becomes part of the signed query. The
        //! payload under the signature is sorted and lowercased; the final
        //! URI is re-sorted with the signature parameter but keeps the
        //! original casing.
        let mut params: BTreeMap<String, String> = params
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        params.insert(
            "address".to_string(),
            self.address().to_checksum_address(),
        );

        let payload = format!("{api_uri}?{}", encode_query(&params)).to_lowercase();
        let signature = self.wallet.sign_message(payload.as_bytes())?;
        params.insert(
            "signature".to_string(),
            signature.to_bytes().to_hex::<String>(),
        );

        Ok(format!("{api_uri}?{}", encode_query(&params)))
    }

    async fn fetch_signed(&self, api_uri: &str) -> AResult<bytes::Bytes> {
        let signed = self.signed_api_uri(api_uri, std::iter::empty::<(String, String)>())?;
        let url = format!("{}{signed}", self.api_root);
        tracing::info!(%url, "downloading");
        let response = reqwest::Client::new()
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }

    pub async fn download_latest_weights(&self, directory: &Path) -> AResult<PathBuf> {
        //! Download the archive with the latest weights of every lepton.
        //!
        //! The file name carries the SHA-1 of the content, so re-downloads
        //! of identical data land on the same path.
        let body = self.fetch_signed("/v1/strategy/latest_weights").await?;
        let digest: String = Sha1::digest(&body).as_slice().to_hex();
        let destination = directory.join(format!("devise_latest_weights_{digest}.zip"));
        tokio::fs::write(&destination, &body).await?;
        Ok(destination)
    }

    pub async fn download_historical_weights(&self, directory: &Path) -> AResult<PathBuf> {
        //! Download the historical weights archive (excludes recent terms).
        let body = self.fetch_signed("/v1/strategy/historical_weights").await?;
        let destination = directory.join("devise_historical_weights.tar");
        tokio::fs::write(&destination, &body).await?;
        Ok(destination)
    }

    pub async fn download_historical_returns(&self, directory: &Path) -> AResult<PathBuf> {
        //! Download the historical returns archive (excludes recent terms).
        let body = self.fetch_signed("/v1/strategy/historical_returns").await?;
        let destination = directory.join("devise_historical_returns.tar");
        tokio::fs::write(&destination, &body).await?;
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressConvertible;
    use crate::client::{ContractSet, DeviseClient, DEFAULT_API_ROOT};
    use crate::contracts::DeployedContracts;
    use crate::ledger::HidTransport;
    use crate::network::{EthNode, PollPolicy};
    use crate::utils::hash_message;
    use crate::wallet::{Credentials, Wallet};
    use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
    use secp256k1::{Message, Secp256k1};

    const PK: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn test_client() -> DeviseClient<HidTransport> {
        let node = EthNode::mainnet();
        let deployed = DeployedContracts::for_network_id("4").unwrap();
        DeviseClient {
            wallet: Wallet::resolve_local(Credentials::new().private_key(PK), Vec::new())
                .unwrap(),
            contracts: ContractSet::load(&node, deployed).unwrap(),
            node,
            poll: PollPolicy::default(),
            api_root: DEFAULT_API_ROOT.to_string(),
            chain_id: Some(1),
        }
    }

    #[test]
    fn test_signed_uri_is_deterministic_and_sorted() {
        let client = test_client();
        let uri = client
            .signed_api_uri(
                "/v1/strategy/latest_weights",
                [("start_timestamp", "1515615156".to_string())],
            )
            .unwrap();
        let again = client
            .signed_api_uri(
                "/v1/strategy/latest_weights",
                [("start_timestamp", "1515615156".to_string())],
            )
            .unwrap();
        assert_eq!(uri, again);

        let query = uri.strip_prefix("/v1/strategy/latest_weights?").unwrap();
        let keys: Vec<&str> = query
            .split('&')
            .map(|pair| pair.split('=').next().unwrap())
            .collect();
        assert_eq!(keys, ["address", "signature", "start_timestamp"]);
        // address keeps its checksummed casing in the final URI
        assert!(query.contains(&client.address().to_checksum_address()));
    }

    #[test]
    fn test_signature_parameter_recovers_the_account() {
        let client = test_client();
        let uri = client
            .signed_api_uri(
                "/v1/strategy/latest_weights",
                std::iter::empty::<(String, String)>(),
            )
            .unwrap();

        let query = uri.strip_prefix("/v1/strategy/latest_weights?").unwrap();
        let signature_hex = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("signature="))
            .unwrap();
        assert_eq!(signature_hex.len(), 130);
        let raw: Vec<u8> = rustc_hex::FromHex::from_hex(signature_hex).unwrap();

        // the signed payload is the sorted query without the signature,
        // lowercased
        let payload = format!(
            "/v1/strategy/latest_weights?address={}",
            client.address().to_checksum_address()
        )
        .to_lowercase();
        let digest = hash_message(payload.as_bytes());

        let recovery = RecoveryId::from_i32(i32::from(raw[64]) - 27).unwrap();
        let signature = RecoverableSignature::from_compact(&raw[..64], recovery).unwrap();
        let public_key = Secp256k1::new()
            .recover_ecdsa(&Message::from_slice(&digest).unwrap(), &signature)
            .unwrap();
        assert_eq!(public_key.address(), client.address());
    }

    #[test]
    fn test_watch_only_cannot_sign_uris() {
        let node = EthNode::mainnet();
        let deployed = DeployedContracts::for_network_id("4").unwrap();
        let watcher: DeviseClient<HidTransport> = DeviseClient {
            wallet: Wallet::resolve_local(
                Credentials::new()
                    .account("0x7567d83b7b8d80addcb281a71d54fc7b3364ffed".parse().unwrap()),
                Vec::new(),
            )
            .unwrap(),
            contracts: ContractSet::load(&node, deployed).unwrap(),
            node,
            poll: PollPolicy::default(),
            api_root: DEFAULT_API_ROOT.to_string(),
            chain_id: Some(1),
        };
        let err = watcher
            .signed_api_uri(
                "/v1/strategy/latest_weights",
                std::iter::empty::<(String, String)>(),
            )
            .unwrap_err();
        assert!(matches!(err, WalletError::WatchOnly(_)));
    }
}
