use tiny_keccak::{Hasher, Keccak};

pub fn keccak<S: AsRef<[u8]>>(bytes: S) -> [u8; 32] {
    //! Compute keccak-256 hash of the input.
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(bytes.as_ref());
    hasher.finalize(&mut output);
    output
}

pub fn hash_message<S: AsRef<[u8]>>(message: S) -> [u8; 32] {
    //! Hash a message with the standard personal-message prefix
    //! (`\x19Ethereum Signed Message:\n` + decimal length + message).
    //!
    //! Signatures over this hash authenticate a message without it ever
    //! being a valid transaction payload.
    let message = message.as_ref();
    let mut prefixed = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    prefixed.extend_from_slice(message);
    keccak(prefixed)
}

/// Serde adapters for the `0x`-prefixed hex encoding used by JSON-RPC nodes.
pub(crate) mod unhex {
    use bytes::Bytes;
    use ethereum_types::U256;
    use rustc_hex::{FromHex, ToHex};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use serde_with::{DeserializeAs, SerializeAs};

    fn strip_prefix(s: &str) -> &str {
        s.strip_prefix("0x").unwrap_or(s)
    }

    /// Byte strings as `0x`-prefixed hex of arbitrary length.
    pub struct Hex;

    impl SerializeAs<Bytes> for Hex {
        fn serialize_as<S: Serializer>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
            let body: String = value.as_ref().to_hex();
            serializer.serialize_str(&format!("0x{body}"))
        }
    }
    impl<'de> DeserializeAs<'de, Bytes> for Hex {
        fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
            let text = String::deserialize(deserializer)?;
            let raw: Vec<u8> = strip_prefix(&text).from_hex().map_err(D::Error::custom)?;
            Ok(raw.into())
        }
    }

    /// Quantities (`U256`, `u64`) as minimal `0x`-prefixed hex.
    pub struct HexNum;

    impl SerializeAs<U256> for HexNum {
        fn serialize_as<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&format!("0x{value:x}"))
        }
    }
    impl<'de> DeserializeAs<'de, U256> for HexNum {
        fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
            let text = String::deserialize(deserializer)?;
            U256::from_str_radix(strip_prefix(&text), 16).map_err(D::Error::custom)
        }
    }
    impl SerializeAs<u64> for HexNum {
        fn serialize_as<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&format!("0x{value:x}"))
        }
    }
    impl<'de> DeserializeAs<'de, u64> for HexNum {
        fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
            let text = String::deserialize(deserializer)?;
            u64::from_str_radix(strip_prefix(&text), 16).map_err(D::Error::custom)
        }
    }

    /// 32-byte words (transaction and block hashes) as fixed-width hex.
    pub struct HexHash;

    impl SerializeAs<U256> for HexHash {
        fn serialize_as<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&format!("0x{value:064x}"))
        }
    }
    impl<'de> DeserializeAs<'de, U256> for HexHash {
        fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
            <HexNum as DeserializeAs<'de, U256>>::deserialize_as(deserializer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hex::ToHex;

    #[test]
    fn test_keccak() {
        // keccak-256 of the empty string
        let hash: String = keccak(b"").to_hex();
        assert_eq!(
            hash,
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_hash_message_is_length_prefixed() {
        assert_eq!(
            hash_message(b"abc"),
            keccak(b"\x19Ethereum Signed Message:\n3abc")
        );
        assert_ne!(hash_message(b"abc"), hash_message(b"abcd"));
    }
}
