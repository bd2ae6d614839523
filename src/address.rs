//! Ethereum address operations and verifications.

use crate::rlp::{Decodable, Encodable, RLPError};
use crate::utils::keccak;
use ethereum_types::Address as WrappedAddress;
pub use secp256k1::{PublicKey, SecretKey as PrivateKey};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::{
    ops::{Deref, DerefMut},
    result::Result,
    str::FromStr,
};

/// Ethereum address.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address(WrappedAddress);

impl DerefMut for Address {
    fn deref_mut(&mut self) -> &mut WrappedAddress {
        &mut self.0
    }
}
impl Deref for Address {
    type Target = WrappedAddress;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl Encodable for Address {
    fn encode(&self, out: &mut dyn open_fastrlp::BufMut) {
        self.0.encode(out)
    }
    fn length(&self) -> usize {
        self.0.length()
    }
}
impl Decodable for Address {
    fn decode(buf: &mut &[u8]) -> Result<Self, RLPError> {
        Ok(Self(WrappedAddress::decode(buf)?))
    }
}
impl FromStr for Address {
    type Err = rustc_hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(WrappedAddress::from_str(
            s.strip_prefix("0x").unwrap_or(s),
        )?))
    }
}
impl<T: Into<WrappedAddress>> From<T> for Address {
    fn from(s: T) -> Self {
        Self(s.into())
    }
}
impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_checksum_address())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}
impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

impl Address {
    /// Size of underlying array in bytes.
    pub const WIDTH: usize = 20;

    /// The all-zeroes address ("null" in contract responses).
    pub const ZERO: Self = Self(WrappedAddress::zero());

    pub fn to_hex(&self) -> String {
        //! Encode as a lowercase hex string with `0x` prefix.
        format!("{:#x}", self.0)
    }

    pub fn to_checksum_address(&self) -> String {
        //! Render in the canonical mixed-case checksum form.
        let body = self.to_hex();
        let hash = keccak(&body[2..42]);

        "0x".chars()
            .chain(
                body.chars()
                    .skip(2)
                    .zip(itertools::interleave(
                        hash.iter().map(|x| x >> 4),
                        hash.iter().map(|x| x & 15),
                    ))
                    .map(|(ch, h)| if h >= 8 { ch.to_ascii_uppercase() } else { ch }),
            )
            .collect()
    }

    pub fn is_zero(&self) -> bool {
        //! Is this the all-zeroes address?
        self.0.is_zero()
    }
}

/// A trait for objects that can generate an on-chain address.
pub trait AddressConvertible {
    /// Create an address
    fn address(&self) -> Address;
}

impl AddressConvertible for secp256k1::PublicKey {
    fn address(&self) -> Address {
        //! Generate address from public key.
        // Get rid of the 0x04 (first byte) at the beginning.
        let hash = keccak(&self.serialize_uncompressed()[1..]);
        // last 20 bytes from the 32 bytes hash.
        let suffix: [u8; 20] = hash[12..32].try_into().expect("Preset slice length");
        Address(WrappedAddress::from_slice(&suffix))
    }
}

impl AddressConvertible for PrivateKey {
    fn address(&self) -> Address {
        //! Generate address from the corresponding public key.
        let secp = secp256k1::Secp256k1::new();
        self.public_key(&secp).address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_vectors() {
        // EIP-55 test addresses
        for expected in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            let address: Address = expected.parse().unwrap();
            assert_eq!(address.to_checksum_address(), expected);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let lower: Address = "0x7567d83b7b8d80addcb281a71d54fc7b3364ffed"
            .parse()
            .unwrap();
        let upper: Address = "0x7567D83B7B8D80ADDCB281A71D54FC7B3364FFED"
            .parse()
            .unwrap();
        assert_eq!(lower, upper);
    }
}
