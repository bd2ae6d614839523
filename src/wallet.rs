//! Signing credentials: how a client proves ownership of its address.
//!
//! A [`Wallet`] binds one address to exactly one [`SigningMethod`]. The
//! resolver picks the method from whichever credentials the caller supplied,
//! in a fixed order: an explicitly requested hardware device, then a raw
//! private key, then a key file, then a key file found on disk for a plain
//! address. An address with no usable key resolves to a watch-only wallet
//! that can read state but not transact.

use crate::address::{Address, AddressConvertible, PrivateKey};
use crate::keystore::{self, KeystoreError, PasswordPrompt, TtyPrompt};
use crate::ledger::{DeviceTransport, HidTransport, LedgerError, LedgerSigner};
use crate::transactions::{Signature, Transaction};
use crate::utils::hash_message;
use std::path::PathBuf;

/// Credential failures.
#[derive(Debug)]
#[non_exhaustive]
pub enum WalletError {
    /// Neither an account, a key file nor a private key was supplied.
    NoCredentials,
    /// A key file and a private key were both supplied.
    ConflictingCredentials,
    /// Supplied private key is not a valid hex-encoded secp256k1 scalar.
    InvalidPrivateKey(secp256k1::Error),
    /// Hardware device failure.
    Ledger(LedgerError),
    /// Key file failure.
    Keystore(KeystoreError),
    /// The wallet is watch-only and cannot sign.
    WatchOnly(Address),
    /// Signature construction failed.
    Signing(secp256k1::Error),
}

impl std::error::Error for WalletError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ledger(source) => Some(source),
            Self::Keystore(source) => Some(source),
            Self::InvalidPrivateKey(source) | Self::Signing(source) => Some(source),
            _ => None,
        }
    }
}
impl std::fmt::Display for WalletError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCredentials => {
                f.write_str("Please specify one of: account, key file or private key")
            }
            Self::ConflictingCredentials => {
                f.write_str("Please specify either a key file or a private key, not both")
            }
            Self::InvalidPrivateKey(source) => write!(f, "Invalid private key: {source}"),
            Self::Ledger(source) => write!(f, "Hardware wallet failure: {source}"),
            Self::Keystore(source) => write!(f, "Key file failure: {source}"),
            Self::WatchOnly(address) => write!(
                f,
                "No signing method available for {address}. \
                 Supply a key file, a private key or a hardware wallet to transact."
            ),
            Self::Signing(source) => write!(f, "Could not sign: {source}"),
        }
    }
}
impl From<LedgerError> for WalletError {
    fn from(source: LedgerError) -> Self {
        Self::Ledger(source)
    }
}
impl From<KeystoreError> for WalletError {
    fn from(source: KeystoreError) -> Self {
        Self::Keystore(source)
    }
}

/// Explicit method selection, when the caller does not want the automatic
/// resolution order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AuthKind {
    /// Ledger hardware device.
    Ledger,
    /// Raw private key.
    PrivateKey,
    /// Encrypted key file.
    KeyFile,
    /// Key file found on disk for the supplied address.
    Software,
}

/// Raw credential material supplied by the caller.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    key_file: Option<PathBuf>,
    private_key: Option<String>,
    account: Option<Address>,
    password: Option<String>,
    auth_kind: Option<AuthKind>,
}

impl Credentials {
    /// Empty credentials; resolves to an error until something is added.
    pub fn new() -> Self {
        Self::default()
    }
    /// Use an encrypted key file.
    pub fn key_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.key_file = Some(path.into());
        self
    }
    /// Use a raw hex-encoded private key.
    pub fn private_key<S: Into<String>>(mut self, key: S) -> Self {
        self.private_key = Some(key.into());
        self
    }
    /// Act on behalf of this address.
    pub fn account(mut self, address: Address) -> Self {
        self.account = Some(address);
        self
    }
    /// Preset key file password; skips the interactive prompt.
    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }
    /// Force one specific signing method.
    pub fn auth_kind(mut self, kind: AuthKind) -> Self {
        self.auth_kind = Some(kind);
        self
    }
}

/// The resolved way of producing signatures.
pub enum SigningMethod<T: DeviceTransport = HidTransport> {
    /// A connected hardware device holds the key.
    Hardware(LedgerSigner<T>),
    /// In-memory private key.
    PrivateKey(PrivateKey),
    /// Encrypted key file, decrypted at signing time.
    KeyFile {
        /// Location of the key file.
        path: PathBuf,
        /// Preset password; prompted for when absent.
        password: Option<String>,
    },
    /// No key material; the wallet can only read chain state.
    WatchOnly,
}

/// One address plus the method used to sign for it.
pub struct Wallet<T: DeviceTransport = HidTransport> {
    address: Address,
    method: SigningMethod<T>,
    prompt: Box<dyn PasswordPrompt>,
}

impl<T: DeviceTransport> std::fmt::Debug for Wallet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Wallet<HidTransport> {
    pub async fn resolve(credentials: Credentials) -> Result<Self, WalletError> {
        //! Resolve credentials into a wallet, opening a hardware device if
        //! one was explicitly requested.
        if let Some(AuthKind::Ledger) = credentials.auth_kind {
            let signer = match credentials.account {
                Some(address) if !address.is_zero() => {
                    LedgerSigner::open_for_address(&address).await?
                }
                _ => LedgerSigner::open(0).await?,
            };
            let address = signer.address();
            return Ok(Self {
                address,
                method: SigningMethod::Hardware(signer),
                prompt: Box::new(TtyPrompt),
            });
        }
        Self::resolve_local(credentials, keystore::wallet_data_dirs())
    }
}

impl<T: DeviceTransport> Wallet<T> {
    pub fn resolve_local(
        credentials: Credentials,
        scan_dirs: Vec<PathBuf>,
    ) -> Result<Self, WalletError> {
        //! Resolve credentials that do not involve a hardware device.
        let Credentials {
            key_file,
            private_key,
            account,
            password,
            auth_kind,
        } = credentials;

        if key_file.is_some() && private_key.is_some() {
            return Err(WalletError::ConflictingCredentials);
        }

        let allows = |kind| auth_kind.is_none() || auth_kind == Some(kind);

        if let Some(raw) = private_key.filter(|_| allows(AuthKind::PrivateKey)) {
            let key: PrivateKey = raw
                .strip_prefix("0x")
                .unwrap_or(&raw)
                .parse()
                .map_err(WalletError::InvalidPrivateKey)?;
            return Ok(Self::with_method(key.address(), SigningMethod::PrivateKey(key)));
        }

        if let Some(path) = key_file.filter(|_| allows(AuthKind::KeyFile)) {
            let address = keystore::keystore_address(&path)?;
            return Ok(Self::with_method(
                address,
                SigningMethod::KeyFile { path, password },
            ));
        }

        let address = account.ok_or(WalletError::NoCredentials)?;
        if allows(AuthKind::Software) {
            if let Some(path) = keystore::scan_for_key_file(scan_dirs, &address) {
                return Ok(Self::with_method(
                    address,
                    SigningMethod::KeyFile { path, password },
                ));
            }
        }

        tracing::warn!(%address, "no signing method found, wallet is watch-only");
        Ok(Self::with_method(address, SigningMethod::WatchOnly))
    }

    /// Bind an address to an already resolved signing method.
    pub fn with_method(address: Address, method: SigningMethod<T>) -> Self {
        Self {
            address,
            method,
            prompt: Box::new(TtyPrompt),
        }
    }

    /// Replace the password source (used by embedding services and tests).
    pub fn with_prompt(mut self, prompt: Box<dyn PasswordPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// The address this wallet acts for.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Can this wallet produce signatures at all?
    pub fn can_sign(&self) -> bool {
        !matches!(self.method, SigningMethod::WatchOnly)
    }

    /// Is signing delegated to a hardware device?
    pub fn is_hardware(&self) -> bool {
        matches!(self.method, SigningMethod::Hardware(_))
    }

    fn unlock_key_file(
        &self,
        path: &std::path::Path,
        password: Option<&str>,
    ) -> Result<PrivateKey, WalletError> {
        // a preset password fails hard; an interactive one re-prompts
        if let Some(preset) = password {
            return Ok(keystore::decrypt_key_file(path, preset)?);
        }
        loop {
            let password = self.prompt.password(&format!(
                "Password to decrypt keystore file {}: ",
                self.address
            ))?;
            match keystore::decrypt_key_file(path, &password) {
                Ok(key) => return Ok(key),
                Err(KeystoreError::WrongPassword) => {
                    tracing::warn!("password does not match the key file, try again");
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    pub fn signer(&self) -> Result<Signer<'_, T>, WalletError> {
        //! Resolve the key material needed to sign, without signing yet.
        //!
        //! A key file is decrypted here, so a watch-only wallet or a wrong
        //! password fails before the caller does any other work.
        match &self.method {
            SigningMethod::Hardware(signer) => Ok(Signer::Device(signer)),
            SigningMethod::PrivateKey(key) => Ok(Signer::Key(*key)),
            SigningMethod::KeyFile { path, password } => {
                let key = self.unlock_key_file(path, password.as_deref())?;
                Ok(Signer::Key(key))
            }
            SigningMethod::WatchOnly => Err(WalletError::WatchOnly(self.address)),
        }
    }

    pub async fn sign_transaction(&self, tx: &Transaction) -> Result<Transaction, WalletError> {
        //! Sign a transaction with whatever method this wallet resolved to.
        self.signer()?.sign_transaction(tx).await
    }

    pub fn sign_message<S: AsRef<[u8]>>(&self, message: S) -> Result<Signature, WalletError> {
        //! Sign a detached personal message.
        //!
        //! Only key-based methods apply: the device protocol frames personal
        //! messages differently and watch-only wallets hold no key.
        let hash = hash_message(message);
        match &self.method {
            SigningMethod::PrivateKey(key) => Ok(Signature::sign_hash(&hash, key)),
            SigningMethod::KeyFile { path, password } => {
                let key = self.unlock_key_file(path, password.as_deref())?;
                Ok(Signature::sign_hash(&hash, &key))
            }
            SigningMethod::Hardware(_) | SigningMethod::WatchOnly => {
                Err(WalletError::WatchOnly(self.address))
            }
        }
    }
}

/// Key material readied for signing.
///
/// Produced by [`Wallet::signer`]; holding one proves the credential side
/// is in order before any transaction is built.
pub enum Signer<'a, T: DeviceTransport = HidTransport> {
    /// A connected hardware device signs on request.
    Device(&'a LedgerSigner<T>),
    /// A decrypted in-memory key.
    Key(PrivateKey),
}

impl<T: DeviceTransport> Signer<'_, T> {
    pub async fn sign_transaction(&self, tx: &Transaction) -> Result<Transaction, WalletError> {
        //! Sign a transaction envelope.
        match self {
            Self::Device(signer) => Ok(signer.sign_transaction(tx).await?),
            Self::Key(key) => Ok(tx.sign(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::generate_account_in;
    use crate::ledger::HidTransport;
    use tempfile::TempDir;

    // Well-known test key (hardhat account 0)
    const PK: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const PK_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn resolve(credentials: Credentials) -> Result<Wallet<HidTransport>, WalletError> {
        Wallet::resolve_local(credentials, Vec::new())
    }

    #[test]
    fn test_private_key_resolution_derives_address() {
        let wallet = resolve(Credentials::new().private_key(PK)).unwrap();
        assert_eq!(wallet.address(), PK_ADDRESS.parse().unwrap());
        assert!(wallet.can_sign());
        assert!(!wallet.is_hardware());
    }

    #[test]
    fn test_conflicting_credentials() {
        let err = resolve(Credentials::new().private_key(PK).key_file("/tmp/k.json"))
            .unwrap_err();
        assert!(matches!(err, WalletError::ConflictingCredentials));
    }

    #[test]
    fn test_no_credentials() {
        assert!(matches!(
            resolve(Credentials::new()),
            Err(WalletError::NoCredentials)
        ));
    }

    #[test]
    fn test_key_file_resolution_peeks_address() {
        let dir = TempDir::new().unwrap();
        let (path, address) = generate_account_in(dir.path(), "pw").unwrap();
        let wallet = resolve(Credentials::new().key_file(&path).password("pw")).unwrap();
        assert_eq!(wallet.address(), address);
        assert!(wallet.can_sign());
    }

    #[test]
    fn test_plain_address_scans_disk_then_watch_only() {
        let dir = TempDir::new().unwrap();
        let (_, address) = generate_account_in(dir.path(), "pw").unwrap();

        // with the key file on disk the wallet can sign
        let wallet: Wallet<HidTransport> = Wallet::resolve_local(
            Credentials::new().account(address).password("pw"),
            vec![dir.path().to_path_buf()],
        )
        .unwrap();
        assert!(wallet.can_sign());

        // without it, the wallet degrades to watch-only
        let wallet = resolve(Credentials::new().account(address)).unwrap();
        assert!(!wallet.can_sign());
        let err = wallet.sign_message(b"hello").unwrap_err();
        assert!(matches!(err, WalletError::WatchOnly(_)));
    }

    #[test]
    fn test_auth_kind_forces_method() {
        let dir = TempDir::new().unwrap();
        let (_, address) = generate_account_in(dir.path(), "pw").unwrap();
        // software scan is skipped when a private key is demanded
        let wallet: Wallet<HidTransport> = Wallet::resolve_local(
            Credentials::new()
                .account(address)
                .auth_kind(AuthKind::PrivateKey),
            vec![dir.path().to_path_buf()],
        )
        .unwrap();
        assert!(!wallet.can_sign());
    }

    /// Prompt answering from a queue, to script wrong-password retries.
    struct ScriptedPrompt(std::sync::Mutex<std::collections::VecDeque<String>>);

    impl ScriptedPrompt {
        fn new<const N: usize>(answers: [&str; N]) -> Box<Self> {
            Box::new(Self(std::sync::Mutex::new(
                answers.iter().map(|s| s.to_string()).collect(),
            )))
        }
    }

    impl PasswordPrompt for ScriptedPrompt {
        fn password(&self, _prompt: &str) -> Result<String, KeystoreError> {
            Ok(self.0.lock().unwrap().pop_front().unwrap())
        }
    }

    #[test]
    fn test_interactive_prompt_retries_on_wrong_password() {
        let dir = TempDir::new().unwrap();
        let (path, address) = generate_account_in(dir.path(), "pw").unwrap();

        // no preset password, so the prompt is consulted; the first answer
        // is wrong and the loop has to ask again
        let wallet = resolve(Credentials::new().key_file(&path))
            .unwrap()
            .with_prompt(ScriptedPrompt::new(["nope", "pw"]));
        let signature = wallet.sign_message(b"hello").unwrap();
        assert_ne!(signature.r, ethereum_types::U256::zero());
        assert_eq!(wallet.address(), address);
    }

    #[test]
    fn test_preset_wrong_password_fails_immediately() {
        let dir = TempDir::new().unwrap();
        let (path, _) = generate_account_in(dir.path(), "pw").unwrap();
        let wallet = resolve(Credentials::new().key_file(&path).password("nope")).unwrap();
        let err = wallet.sign_message(b"hello").unwrap_err();
        assert!(matches!(
            err,
            WalletError::Keystore(KeystoreError::WrongPassword)
        ));
    }

    #[tokio::test]
    async fn test_key_file_signing_matches_private_key_signing() {
        use crate::rlp::Bytes;
        use ethereum_types::U256;

        let dir = TempDir::new().unwrap();
        let (path, address) = generate_account_in(dir.path(), "pw").unwrap();
        let wallet = resolve(Credentials::new().key_file(&path).password("pw")).unwrap();

        let tx = Transaction {
            nonce: 0.into(),
            gas_price: U256::from(1_000_000_000u64),
            gas: 21000,
            to: Some(Address::ZERO),
            value: U256::zero(),
            data: Bytes::new(),
            chain_id: Some(1),
            signature: None,
        };
        let signed = wallet.sign_transaction(&tx).await.unwrap();
        assert_eq!(signed.recover_signer().unwrap(), address);
    }
}
