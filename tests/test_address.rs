use devise_client::{Address, AddressConvertible, PrivateKey, PublicKey};

#[test]
fn test_pubkey_to_address() {
    let pubkey: PublicKey = "03c1573f1528638ae14cbe04a74e6583c5562d59214223762c1a11121e24619cbc"
        .parse()
        .unwrap();
    let ref_addr: Address = "Af3CD5c36B97E9c28c263dC4639c6d7d53303A13".parse().unwrap();
    assert_eq!(pubkey.address(), ref_addr);
}

#[test]
fn test_private_key_to_address() {
    // hardhat account 0
    let key: PrivateKey = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        .parse()
        .unwrap();
    let ref_addr: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
    assert_eq!(key.address(), ref_addr);
}

#[test]
fn test_can_create_from_raw() {
    let _ = Address::from([0; 20]);
}

#[test]
fn test_display_uses_checksum_casing() {
    let address: Address = "0x7567d83b7b8d80addcb281a71d54fc7b3364ffed"
        .parse()
        .unwrap();
    assert_eq!(
        address.to_string(),
        "0x7567D83b7b8d80ADdCb281A71d54Fc7B3364ffed"
    );
    assert_eq!(address.to_hex(), "0x7567d83b7b8d80addcb281a71d54fc7b3364ffed");
}

#[test]
fn test_serde_roundtrip_is_lowercase() {
    let address: Address = "0x7567D83b7b8d80ADdCb281A71d54Fc7B3364ffed"
        .parse()
        .unwrap();
    let encoded = serde_json::to_string(&address).unwrap();
    assert_eq!(encoded, "\"0x7567d83b7b8d80addcb281a71d54fc7b3364ffed\"");
    let decoded: Address = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, address);
}

#[test]
fn test_zero_address_detection() {
    assert!(Address::ZERO.is_zero());
    let real: Address = "0x7567d83b7b8d80addcb281a71d54fc7b3364ffed"
        .parse()
        .unwrap();
    assert!(!real.is_zero());
}

#[test]
fn test_rlp_encoding_is_fixed_width() {
    use devise_client::rlp::{BytesMut, Encodable};

    let address: Address = "0x0000000000000000000000000000000000000001"
        .parse()
        .unwrap();
    let mut out = BytesMut::new();
    address.encode(&mut out);
    assert_eq!(out.len(), 1 + Address::WIDTH);
    assert_eq!(out[0], 0x80 + Address::WIDTH as u8);
}
