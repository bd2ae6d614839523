//! Encrypted JSON keystore files (web3 secret storage).
//!
//! Key files hold a scrypt-encrypted private key plus the clear-text address
//! it belongs to. Decryption and encryption are delegated to the
//! [`eth-keystore`](https://docs.rs/eth-keystore/latest/) crate; this module
//! adds the address peek, the on-disk locations where wallets keep their key
//! files, and password prompting.

use crate::address::{Address, AddressConvertible, PrivateKey};
use rand::RngCore;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Failures around key files and their passwords.
#[derive(Debug)]
#[non_exhaustive]
pub enum KeystoreError {
    /// MAC check failed: the password does not match the file.
    WrongPassword,
    /// Any other failure inside the keystore container format.
    Store(eth_keystore::KeystoreError),
    /// Filesystem or terminal failure.
    Io(std::io::Error),
    /// Key file is not valid keystore JSON.
    Malformed(serde_json::Error),
    /// Decrypted bytes are not a valid secp256k1 private key.
    BadKey(secp256k1::Error),
    /// Home directory could not be determined.
    NoHomeDir,
}

impl std::error::Error for KeystoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(source) => Some(source),
            Self::Io(source) => Some(source),
            Self::Malformed(source) => Some(source),
            Self::BadKey(source) => Some(source),
            _ => None,
        }
    }
}
impl std::fmt::Display for KeystoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongPassword => f.write_str("Password does not match the key file"),
            Self::Store(source) => write!(f, "Keystore failure: {source}"),
            Self::Io(source) => write!(f, "I/O failure: {source}"),
            Self::Malformed(source) => write!(f, "Key file is not valid keystore JSON: {source}"),
            Self::BadKey(source) => write!(f, "Key file holds an invalid private key: {source}"),
            Self::NoHomeDir => f.write_str("Could not determine the home directory"),
        }
    }
}
impl From<eth_keystore::KeystoreError> for KeystoreError {
    fn from(source: eth_keystore::KeystoreError) -> Self {
        match source {
            eth_keystore::KeystoreError::MacMismatch => Self::WrongPassword,
            other => Self::Store(other),
        }
    }
}
impl From<std::io::Error> for KeystoreError {
    fn from(source: std::io::Error) -> Self {
        Self::Io(source)
    }
}

/// Source of passwords for key file decryption.
///
/// Kept behind a trait so that clients embedded in services can wire in
/// their own secret storage, and tests can script answers.
pub trait PasswordPrompt: Send + Sync {
    /// Obtain the password, showing `prompt` if interaction is involved.
    fn password(&self, prompt: &str) -> Result<String, KeystoreError>;
}

/// Interactive prompt on the controlling terminal, with echo disabled.
pub struct TtyPrompt;

impl PasswordPrompt for TtyPrompt {
    fn password(&self, prompt: &str) -> Result<String, KeystoreError> {
        rpassword::prompt_password(prompt).map_err(KeystoreError::Io)
    }
}

impl PasswordPrompt for String {
    /// A fixed password, for non-interactive use.
    fn password(&self, _prompt: &str) -> Result<String, KeystoreError> {
        Ok(self.clone())
    }
}

pub fn decrypt_key_file<P: AsRef<Path>>(
    path: P,
    password: &str,
) -> Result<PrivateKey, KeystoreError> {
    //! Decrypt a key file and parse the plaintext as a private key.
    //!
    //! A wrong password surfaces as [`KeystoreError::WrongPassword`] so
    //! callers can re-prompt.
    let plaintext = eth_keystore::decrypt_key(path, password)?;
    PrivateKey::from_slice(&plaintext).map_err(KeystoreError::BadKey)
}

#[derive(Deserialize)]
struct KeystorePeek {
    address: String,
}

pub fn keystore_address<P: AsRef<Path>>(path: P) -> Result<Address, KeystoreError> {
    //! Read the clear-text address field out of a key file without
    //! decrypting it.
    let raw = std::fs::read_to_string(path)?;
    let peek: KeystorePeek = serde_json::from_str(&raw).map_err(KeystoreError::Malformed)?;
    peek.address.parse().map_err(|_| {
        KeystoreError::Malformed(<serde_json::Error as serde::de::Error>::custom(
            "bad address field",
        ))
    })
}

/// Directory where newly generated accounts are stored:
/// `~/.devise/keystore`.
pub fn account_keystore_dir() -> Result<PathBuf, KeystoreError> {
    let home = home::home_dir().ok_or(KeystoreError::NoHomeDir)?;
    Ok(home.join(".devise").join("keystore"))
}

pub fn generate_account(password: &str) -> Result<(PathBuf, Address), KeystoreError> {
    //! Generate a fresh key pair and store it encrypted under the default
    //! account directory. Returns the file path and the new address.
    generate_account_in(account_keystore_dir()?, password)
}

pub fn generate_account_in<P: AsRef<Path>>(
    dir: P,
    password: &str,
) -> Result<(PathBuf, Address), KeystoreError> {
    //! Same as [`generate_account`], storing the key file under `dir`.
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut rng = rand::thread_rng();
    let private_key = loop {
        // from_slice rejects the rare out-of-range scalar; redraw on it
        let mut candidate = [0u8; 32];
        rng.fill_bytes(&mut candidate);
        if let Ok(key) = PrivateKey::from_slice(&candidate) {
            break key;
        }
    };
    let address = private_key.address();

    let name = format!("{:x}.json", *address);
    eth_keystore::encrypt_key(dir, &mut rng, private_key.secret_bytes(), password, Some(&name))?;

    let path = dir.join(name);
    restrict_permissions(&path)?;
    Ok((path, address))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}
#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Well-known wallet data directories for the current platform, most
/// specific first. Only existing directories are returned.
pub fn wallet_data_dirs() -> Vec<PathBuf> {
    let Some(home) = home::home_dir() else {
        return Vec::new();
    };
    let candidates: &[&[&str]] = if cfg!(target_os = "macos") {
        &[
            &["Library", "Ethereum", "keystore"],
            &["Library", "Application Support", "io.parity.ethereum", "keys"],
        ]
    } else if cfg!(windows) {
        &[
            &["AppData", "Roaming", "Ethereum", "keystore"],
            &["AppData", "Roaming", "Parity", "Ethereum", "keys"],
        ]
    } else {
        &[
            &[".ethereum", "keystore"],
            &[".local", "share", "io.parity.ethereum", "keys"],
        ]
    };
    candidates
        .iter()
        .map(|parts| parts.iter().fold(home.clone(), |path, part| path.join(part)))
        .chain(std::iter::once(home.join(".devise").join("keystore")))
        .filter(|path| path.is_dir())
        .collect()
}

pub fn scan_for_key_file<I>(dirs: I, address: &Address) -> Option<PathBuf>
where
    I: IntoIterator,
    I::Item: Into<PathBuf>,
{
    //! Search the given directories (recursively) for a key file whose name
    //! carries `address`. Both geth-style `UTC--…--{address}` names and
    //! plain `{address}.json` names match.
    let needle = format!("{:x}", **address);
    for dir in dirs {
        if let Some(found) = walk_for_needle(&dir.into(), &needle) {
            tracing::info!(path = %found.display(), "found matching key file on disk");
            return Some(found);
        }
    }
    None
}

fn walk_for_needle(dir: &Path, needle: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = walk_for_needle(&path, needle) {
                return Some(found);
            }
        } else if path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.to_lowercase().contains(needle))
        {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_then_decrypt_roundtrip() {
        let dir = TempDir::new().unwrap();
        let (path, address) = generate_account_in(dir.path(), "hunter2").unwrap();
        assert!(path.exists());

        // clear-text address field matches the derived one
        assert_eq!(keystore_address(&path).unwrap(), address);

        let key = decrypt_key_file(&path, "hunter2").unwrap();
        assert_eq!(key.address(), address);
    }

    #[test]
    fn test_wrong_password_is_distinguishable() {
        let dir = TempDir::new().unwrap();
        let (path, _) = generate_account_in(dir.path(), "hunter2").unwrap();
        let err = decrypt_key_file(&path, "*******").unwrap_err();
        assert!(matches!(err, KeystoreError::WrongPassword));
    }

    #[test]
    fn test_scan_matches_geth_style_names() {
        let dir = TempDir::new().unwrap();
        let address: Address = "0x7567d83b7b8d80addcb281a71d54fc7b3364ffed"
            .parse()
            .unwrap();
        let nested = dir.path().join("keystore");
        std::fs::create_dir_all(&nested).unwrap();
        let file = nested.join(
            "UTC--2018-06-11T12-00-00.000000000Z--7567d83b7b8d80addcb281a71d54fc7b3364ffed",
        );
        std::fs::write(&file, "{}").unwrap();

        let found = scan_for_key_file([dir.path()], &address).unwrap();
        assert_eq!(found, file);

        let other: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
            .parse()
            .unwrap();
        assert!(scan_for_key_file([dir.path()], &other).is_none());
    }

    #[test]
    fn test_malformed_key_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            keystore_address(&path),
            Err(KeystoreError::Malformed(_))
        ));
    }
}
