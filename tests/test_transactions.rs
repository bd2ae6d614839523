use devise_client::transactions::{Signature, Transaction};
use devise_client::{AddressConvertible, PrivateKey, U256};
use rustc_hex::ToHex;

/// The worked example from the EIP-155 specification.
fn eip155_example() -> Transaction {
    Transaction {
        nonce: 9.into(),
        gas_price: U256::from(20_000_000_000u64),
        gas: 21_000,
        to: Some(
            "0x3535353535353535353535353535353535353535"
                .parse()
                .unwrap(),
        ),
        value: U256::from(10).pow(18.into()),
        data: devise_client::rlp::Bytes::new(),
        chain_id: Some(1),
        signature: None,
    }
}

fn eip155_key() -> PrivateKey {
    "4646464646464646464646464646464646464646464646464646464646464646"
        .parse()
        .unwrap()
}

#[test]
fn test_unsigned_rlp_matches_eip155_vector() {
    let encoded: String = eip155_example().unsigned_rlp().to_hex();
    assert_eq!(
        encoded,
        "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
    );
}

#[test]
fn test_signing_hash_matches_eip155_vector() {
    let hash: String = eip155_example().signing_hash().to_hex();
    assert_eq!(
        hash,
        "daf5a779ae972f972197303d7b574746c7ef83eabadc08b297029b930f5a36c8"
    );
}

#[test]
fn test_signed_rlp_matches_eip155_vector() {
    let signed = eip155_example().sign(&eip155_key());
    let signature = signed.signature.unwrap();
    assert_eq!(signature.v, 37);
    let encoded: String = signed.signed_rlp().unwrap().to_hex();
    assert_eq!(
        encoded,
        "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025\
         a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276\
         a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
    );
}

#[test]
fn test_recover_signer_roundtrip() {
    let key = eip155_key();
    let signed = eip155_example().sign(&key);
    assert_eq!(signed.recover_signer().unwrap(), key.address());
}

#[test]
fn test_transaction_hash_is_keccak_of_signed_encoding() {
    let signed = eip155_example().sign(&eip155_key());
    let raw = signed.signed_rlp().unwrap();
    let expected = U256::from_big_endian(&devise_client::keccak(raw));
    assert_eq!(signed.hash().unwrap(), expected);
}

#[test]
fn test_unsigned_transaction_has_no_broadcastable_form() {
    assert!(eip155_example().signed_rlp().is_err());
    assert!(eip155_example().hash().is_err());
    assert!(eip155_example().recover_signer().is_err());
}

#[test]
fn test_device_signature_reconstruction() {
    // chain 1: valid v values are 37 and 38, the device reports one byte
    let r = U256::from(1);
    let s = U256::from(2);
    let even = Signature::from_device(37, r, s, Some(1));
    assert_eq!(even.v, 37);
    let odd = Signature::from_device(38, r, s, Some(1));
    assert_eq!(odd.v, 38);

    // a large chain id overflows the byte; parity is still recoverable
    let chain = 7_778_454u64; // ganache
    let base = 2 * chain + 35;
    let truncated = (base & 0xff) as u8;
    assert_eq!(Signature::from_device(truncated, r, s, Some(chain)).v, base);
    assert_eq!(
        Signature::from_device(truncated.wrapping_add(1), r, s, Some(chain)).v,
        base + 1
    );

    // without a chain id the byte is taken verbatim
    assert_eq!(Signature::from_device(27, r, s, None).v, 27);
}

#[test]
fn test_detached_signature_serialization() {
    let signature = Signature {
        v: 28,
        r: U256::from(0x11),
        s: U256::from(0x22),
    };
    let bytes = signature.to_bytes();
    assert_eq!(bytes[31], 0x11);
    assert_eq!(bytes[63], 0x22);
    assert_eq!(bytes[64], 28);
}

#[test]
fn test_contract_deployment_encodes_empty_recipient() {
    let deploy = Transaction {
        to: None,
        data: b"\x60\x60\x60".to_vec().into(),
        ..eip155_example()
    };
    let encoded: String = deploy.unsigned_rlp().to_hex();
    // empty byte string (0x80) in the recipient slot
    assert!(encoded.contains("82520880"));
}
