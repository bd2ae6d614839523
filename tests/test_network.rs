use devise_client::network::{EthNode, TransactionReceipt, ValidationError};

#[test]
fn test_network_names_are_case_insensitive() {
    for name in ["rinkeby", "RINKEBY", "Rinkeby"] {
        let node = EthNode::for_network(name).unwrap();
        assert_eq!(node.base_url.as_str(), EthNode::RINKEBY_URL);
        assert_eq!(node.known_network(), Some("RINKEBY"));
    }
}

#[test]
fn test_every_known_network_roundtrips() {
    for name in ["MAINNET", "RINKEBY", "DEV1", "DEV2", "GANACHE"] {
        let node = EthNode::for_network(name).unwrap();
        assert_eq!(node.known_network(), Some(name));
    }
}

#[test]
fn test_unknown_network_is_rejected() {
    let err = EthNode::for_network("ropsten").unwrap_err();
    assert_eq!(
        err,
        ValidationError::UnsupportedNetwork("ropsten".to_string())
    );
}

#[test]
fn test_custom_node_is_not_a_known_network() {
    let node = EthNode::with_url("http://10.0.0.1:8545".parse().unwrap());
    assert_eq!(node.known_network(), None);
}

#[test]
fn test_deployment_receipt_carries_contract_address() {
    let receipt: TransactionReceipt = serde_json::from_str(
        r#"{
            "transactionHash": "0x4242424242424242424242424242424242424242424242424242424242424242",
            "blockNumber": "0x10",
            "gasUsed": "0x186a0",
            "status": "0x1",
            "contractAddress": "0x7567d83b7b8d80addcb281a71d54fc7b3364ffed"
        }"#,
    )
    .unwrap();
    assert_eq!(
        receipt.contract_address,
        Some("0x7567d83b7b8d80addcb281a71d54fc7b3364ffed".parse().unwrap())
    );
    assert_eq!(receipt.block_number, Some(16));
}
