//! Ethereum transaction envelopes: encoding, signing and verification.

use crate::address::{Address, AddressConvertible, PrivateKey};
use crate::rlp::{BufMut, Bytes, BytesMut, Encodable, Header};
use crate::utils::keccak;
use ethereum_types::U256;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};

/// A legacy Ethereum transaction envelope.
///
/// The envelope is a value: pipeline stages that refine it (nonce, gas,
/// signature) produce a new envelope instead of mutating in place.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    /// Per-account replay-protection counter.
    pub nonce: U256,
    /// Price per unit of gas, in wei.
    pub gas_price: U256,
    /// Maximal amount of gas to spend for the transaction.
    pub gas: u64,
    /// Recipient; [`None`] deploys a contract.
    pub to: Option<Address>,
    /// Amount of wei transferred along with the call.
    pub value: U256,
    /// Contract call data.
    pub data: Bytes,
    /// Chain to bind the signature to (EIP-155); [`None`] signs without
    /// replay protection.
    pub chain_id: Option<u64>,
    /// Signature. Set to [`None`] before signing.
    pub signature: Option<Signature>,
}

/// A recoverable secp256k1 signature in the `(v, r, s)` form transactions
/// carry on the wire.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Signature {
    /// Recovery byte, offset by 27 (legacy) or `2 * chain_id + 35` (EIP-155).
    pub v: u64,
    /// First half of the ECDSA signature.
    pub r: U256,
    /// Second half of the ECDSA signature.
    pub s: U256,
}

impl Signature {
    pub fn from_device(v: u8, r: U256, s: U256, chain_id: Option<u64>) -> Self {
        //! Rebuild a full signature from the detached triple a hardware
        //! device returns.
        //!
        //! The device reports `v` as a single byte, so for EIP-155 chains the
        //! real recovery value is reconstructed from the chain id and the
        //! parity the byte encodes.
        match chain_id {
            None => Self { v: v.into(), r, s },
            Some(id) => {
                let base = 2 * id + 35;
                let parity = u64::from(v != (base & 0xff) as u8);
                Self {
                    v: base + parity,
                    r,
                    s,
                }
            }
        }
    }

    pub fn sign_hash(hash: &[u8; 32], private_key: &PrivateKey) -> Self {
        //! Sign a 32-byte digest with a local key, producing a legacy-form
        //! signature (`v` is 27 or 28).
        let secp = Secp256k1::new();
        let message = Message::from_slice(hash).expect("digest is 32 bytes");
        let (recovery_id, compact) = secp
            .sign_ecdsa_recoverable(&message, private_key)
            .serialize_compact();
        Self {
            v: 27 + recovery_id.to_i32() as u64,
            r: U256::from_big_endian(&compact[..32]),
            s: U256::from_big_endian(&compact[32..]),
        }
    }

    fn recovery_id(&self, chain_id: Option<u64>) -> Result<RecoveryId, secp256k1::Error> {
        let recovery = match chain_id {
            Some(id) => self.v.checked_sub(2 * id + 35),
            None => self.v.checked_sub(27),
        };
        match recovery {
            Some(rec @ 0..=1) => RecoveryId::from_i32(rec as i32),
            _ => Err(secp256k1::Error::InvalidRecoveryId),
        }
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        //! Serialize as the 65-byte `r || s || v` form used for detached
        //! message signatures. `v` is truncated to its lowest byte.
        let mut out = [0u8; 65];
        self.r.to_big_endian(&mut out[..32]);
        self.s.to_big_endian(&mut out[32..64]);
        out[64] = self.v as u8;
        out
    }
}

impl Transaction {
    pub fn unsigned_rlp(&self) -> Bytes {
        //! RLP encoding of the unsigned envelope: the exact payload that is
        //! hashed for local signing and shipped verbatim to a hardware
        //! signer. With a chain id set, the EIP-155 `(chain_id, 0, 0)`
        //! trailer is appended.
        let mut fields = BytesMut::new();
        self.encode_base_fields(&mut fields);
        if let Some(id) = self.chain_id {
            id.encode(&mut fields);
            0u8.encode(&mut fields);
            0u8.encode(&mut fields);
        }
        Self::wrap_list(fields)
    }

    pub fn signed_rlp(&self) -> Result<Bytes, secp256k1::Error> {
        //! RLP encoding of the signed envelope, ready for broadcasting.
        let signature = self
            .signature
            .as_ref()
            .ok_or(secp256k1::Error::IncorrectSignature)?;
        let mut fields = BytesMut::new();
        self.encode_base_fields(&mut fields);
        signature.v.encode(&mut fields);
        signature.r.encode(&mut fields);
        signature.s.encode(&mut fields);
        Ok(Self::wrap_list(fields))
    }

    fn encode_base_fields(&self, out: &mut BytesMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas.encode(out);
        if let Some(to) = self.to.as_ref() {
            to.encode(out);
        } else {
            Bytes::new().encode(out);
        }
        self.value.encode(out);
        self.data.encode(out);
    }

    fn wrap_list(fields: BytesMut) -> Bytes {
        let mut out = BytesMut::new();
        Header {
            list: true,
            payload_length: fields.len(),
        }
        .encode(&mut out);
        out.put_slice(&fields);
        out.freeze()
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        //! Canonical hash the sender's signature commits to.
        keccak(self.unsigned_rlp())
    }

    pub fn sign(&self, private_key: &PrivateKey) -> Self {
        //! Produce a signed copy of this envelope using a local private key.
        let mut signature = Signature::sign_hash(&self.signing_hash(), private_key);
        if let Some(id) = self.chain_id {
            signature.v = signature.v - 27 + 2 * id + 35;
        }
        Self {
            signature: Some(signature),
            ..self.clone()
        }
    }

    pub fn with_signature(&self, signature: Signature) -> Self {
        //! Attach a detached signature (e.g. one produced by a hardware
        //! device) to this envelope.
        Self {
            signature: Some(signature),
            ..self.clone()
        }
    }

    pub fn recover_signer(&self) -> Result<Address, secp256k1::Error> {
        //! Recover the sender address from the attached signature.
        let signature = self
            .signature
            .as_ref()
            .ok_or(secp256k1::Error::IncorrectSignature)?;
        let mut compact = [0u8; 64];
        signature.r.to_big_endian(&mut compact[..32]);
        signature.s.to_big_endian(&mut compact[32..]);
        let recoverable =
            RecoverableSignature::from_compact(&compact, signature.recovery_id(self.chain_id)?)?;
        let message =
            Message::from_slice(&self.signing_hash()).expect("signing hash is 32 bytes");
        let public_key = Secp256k1::new().recover_ecdsa(&message, &recoverable)?;
        Ok(public_key.address())
    }

    pub fn hash(&self) -> Result<U256, secp256k1::Error> {
        //! Transaction hash: keccak of the signed encoding.
        Ok(U256::from_big_endian(&keccak(self.signed_rlp()?)))
    }
}
