//! APDU framing for the Ledger Ethereum application.
//!
//! Commands share a fixed four-byte header (class, instruction, two
//! parameters) followed by a length byte and the payload: a BIP-32 path
//! element count, the path itself (four bytes per element, big-endian, top
//! bit set for hardened segments) and, for signing, the RLP encoding of the
//! unsigned transaction.

use crate::address::Address;
use ethereum_types::U256;

/// Application class byte shared by all commands.
pub const CLA: u8 = 0xE0;

/// Derivation path prefix for Ethereum accounts: `44'/60'/0'/{index}`.
const PATH_PREFIX: [u32; 3] = [0x8000_002C, 0x8000_003C, 0x8000_0000];

/// Instruction bytes understood by the device application.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Ins {
    /// Query the public key and address for a derivation path.
    GetAddress = 0x02,
    /// Sign an RLP-encoded transaction.
    SignTransaction = 0x04,
}

/// A single command frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApduCommand {
    /// Class byte.
    pub cla: u8,
    /// Instruction byte.
    pub ins: Ins,
    /// First parameter byte.
    pub p1: u8,
    /// Second parameter byte.
    pub p2: u8,
    /// Payload: path element count, path bytes and optional transaction.
    pub data: Vec<u8>,
}

/// Frame construction and parsing failures.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ApduError {
    /// Response carried fewer bytes than the expected layout.
    ShortResponse {
        /// Bytes received.
        got: usize,
        /// Minimal expected length.
        at_least: usize,
    },
    /// Address field of a response was not valid ASCII hex.
    InvalidAddress,
    /// Payload does not fit the single-byte length field.
    PayloadTooLarge(usize),
}

impl std::error::Error for ApduError {}
impl std::fmt::Display for ApduError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortResponse { got, at_least } => write!(
                f,
                "Response too short: got {got} bytes, expected at least {at_least}"
            ),
            Self::InvalidAddress => f.write_str("Device returned a malformed address"),
            Self::PayloadTooLarge(size) => {
                write!(f, "Payload of {size} bytes exceeds the APDU length field")
            }
        }
    }
}

pub fn derivation_path(account_index: u32) -> Vec<u8> {
    //! Serialize the `44'/60'/0'/{account_index}` path: four big-endian
    //! 4-byte elements, hardened segments with the top bit set.
    PATH_PREFIX
        .iter()
        .copied()
        .chain([account_index])
        .flat_map(u32::to_be_bytes)
        .collect()
}

impl ApduCommand {
    pub fn get_address(account_index: u32) -> Self {
        //! Build a get-address command for the given account index.
        let path = derivation_path(account_index);
        let mut data = vec![(path.len() / 4) as u8];
        data.extend_from_slice(&path);
        Self {
            cla: CLA,
            ins: Ins::GetAddress,
            p1: 0x00,
            p2: 0x00,
            data,
        }
    }

    pub fn sign_transaction(account_index: u32, rlp_encoded_tx: &[u8]) -> Self {
        //! Build a sign command carrying the derivation path and the raw
        //! RLP bytes of the unsigned transaction.
        let path = derivation_path(account_index);
        let mut data = vec![(path.len() / 4) as u8];
        data.extend_from_slice(&path);
        data.extend_from_slice(rlp_encoded_tx);
        Self {
            cla: CLA,
            ins: Ins::SignTransaction,
            p1: 0x00,
            p2: 0x00,
            data,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ApduError> {
        //! Render the full frame: header, length byte, payload.
        if self.data.len() > u8::MAX as usize {
            return Err(ApduError::PayloadTooLarge(self.data.len()));
        }
        let mut frame = vec![self.cla, self.ins as u8, self.p1, self.p2, self.data.len() as u8];
        frame.extend_from_slice(&self.data);
        Ok(frame)
    }
}

pub fn parse_address_response(response: &[u8]) -> Result<Address, ApduError> {
    //! Extract the address out of a get-address response:
    //! `[pubkey_len][pubkey][addr_len][addr as ascii hex]`.
    let short = |at_least| ApduError::ShortResponse {
        got: response.len(),
        at_least,
    };
    let pubkey_len = *response.first().ok_or_else(|| short(1))? as usize;
    let offset = 1 + pubkey_len;
    let addr_len = *response.get(offset).ok_or_else(|| short(offset + 1))? as usize;
    let field = response
        .get(offset + 1..offset + 1 + addr_len)
        .ok_or_else(|| short(offset + 1 + addr_len))?;
    std::str::from_utf8(field)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(ApduError::InvalidAddress)
}

pub fn parse_signature_response(response: &[u8]) -> Result<(u8, U256, U256), ApduError> {
    //! Extract the `(v, r, s)` triple out of a sign response:
    //! one recovery byte followed by two 32-byte big-endian scalars.
    if response.len() < 65 {
        return Err(ApduError::ShortResponse {
            got: response.len(),
            at_least: 65,
        });
    }
    Ok((
        response[0],
        U256::from_big_endian(&response[1..33]),
        U256::from_big_endian(&response[33..65]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_address_frame() {
        let frame = ApduCommand::get_address(0).serialize().unwrap();
        let expected = [
            0xE0, 0x02, 0x00, 0x00, 0x11, 0x04, 0x80, 0x00, 0x00, 0x2C, 0x80, 0x00, 0x00, 0x3C,
            0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_sign_frame_appends_rlp() {
        let rlp = [0xC3, 0x01, 0x02, 0x03];
        let frame = ApduCommand::sign_transaction(7, &rlp).serialize().unwrap();
        assert_eq!(frame[0], 0xE0);
        assert_eq!(frame[1], 0x04);
        // length byte covers path count + path + payload
        assert_eq!(frame[4] as usize, 1 + 16 + rlp.len());
        assert_eq!(&frame[frame.len() - rlp.len()..], &rlp);
        // account index is the last, non-hardened path element
        assert_eq!(&frame[18..22], &[0x00, 0x00, 0x00, 0x07]);
    }

    #[test]
    fn test_parse_address_response() {
        let mut response = vec![2u8, 0xAA, 0xBB]; // fake 2-byte pubkey
        let addr_hex = b"7567d83b7b8d80addcb281a71d54fc7b3364ffed";
        response.push(addr_hex.len() as u8);
        response.extend_from_slice(addr_hex);
        let parsed = parse_address_response(&response).unwrap();
        assert_eq!(
            parsed,
            "0x7567d83b7b8d80addcb281a71d54fc7b3364ffed".parse().unwrap()
        );
    }

    #[test]
    fn test_parse_address_response_truncated() {
        let err = parse_address_response(&[5, 0xAA]).unwrap_err();
        assert!(matches!(err, ApduError::ShortResponse { .. }));
    }

    #[test]
    fn test_parse_signature_response() {
        let mut response = vec![0x25u8];
        response.extend_from_slice(&[0x11; 32]);
        response.extend_from_slice(&[0x22; 32]);
        let (v, r, s) = parse_signature_response(&response).unwrap();
        assert_eq!(v, 0x25);
        assert_eq!(r, U256::from_big_endian(&[0x11; 32]));
        assert_eq!(s, U256::from_big_endian(&[0x22; 32]));
        assert!(matches!(
            parse_signature_response(&response[..64]),
            Err(ApduError::ShortResponse { got: 64, at_least: 65 })
        ));
    }
}
