mod common;

use alloy::{
    consensus::Transaction,
    primitives::{
        Bytes,
        U256,
    },
    signers::local::PrivateKeySigner,
};
use common::{
    GAS_PRICE_WEI,
    TestContext,
};
use deployer_core::{
    artifacts,
    hasher::{
        self,
        HashScheme,
    },
    relay::{
        RelayDispatcher,
        SignMode,
        Submission,
    },
    sign_command::submit_relay,
    submitter::TransactionCall,
};
use int_test_utils::MockNode;

#[tokio::test]
async fn test_relayed_reset_is_paid_by_relayer() {
    let ctx = TestContext::new().await;
    let abi = artifacts::load_abi(&ctx.artifacts_dir(), "Resolver").unwrap();

    ctx.submitter
        .submit(
            TransactionCall::create(Bytes::from_static(&[0x60, 0x80]), GAS_PRICE_WEI),
            &ctx.signer,
        )
        .await
        .unwrap();
    let resolver = MockNode::contract_address(1);
    ctx.node
        .set_call_response(resolver, U256::from(4).to_be_bytes::<32>().to_vec().into());

    let owner = PrivateKeySigner::random();
    let payload = RelayDispatcher::new(ctx.submitter.node().clone(), HashScheme::DoubleHash)
        .prepare_relay(&abi, "reset", &["42"], resolver, &owner)
        .await
        .unwrap();
    assert_eq!(payload.nonce, U256::from(4));
    assert_eq!(payload.signer, owner.address());
    assert_eq!(
        hasher::recover_signer(payload.digest, &payload.signature).unwrap(),
        owner.address()
    );

    submit_relay(&ctx.submitter, &abi, &payload, &ctx.signer, GAS_PRICE_WEI, true)
        .await
        .unwrap();

    let sent = ctx.node.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].to(), Some(resolver));
    assert_eq!(sent[1].input(), &payload.relay_calldata(&abi).unwrap());
}

#[tokio::test]
async fn test_schemes_sign_different_digests() {
    let ctx = TestContext::new().await;
    let abi = artifacts::load_abi(&ctx.artifacts_dir(), "Resolver").unwrap();
    let resolver = MockNode::contract_address(1);
    let owner = PrivateKeySigner::random();

    let mut digests = Vec::new();
    for scheme in [HashScheme::DoubleHash, HashScheme::SaltedTriple] {
        let payload = RelayDispatcher::new(ctx.submitter.node().clone(), scheme)
            .prepare_relay(&abi, "reset", &["42"], resolver, &owner)
            .await
            .unwrap();
        assert_eq!(payload.nonce, U256::ZERO);
        digests.push(payload.digest);
    }
    assert_ne!(digests[0], digests[1]);
    assert_eq!(ctx.node.call_count("eth_call"), 2);
}

#[tokio::test]
async fn test_both_entry_points_reach_the_resolver() {
    let ctx = TestContext::new().await;
    let abi = artifacts::load_abi(&ctx.artifacts_dir(), "Resolver").unwrap();
    ctx.submitter
        .submit(
            TransactionCall::create(Bytes::from_static(&[0x60, 0x80]), GAS_PRICE_WEI),
            &ctx.signer,
        )
        .await
        .unwrap();
    let resolver = MockNode::contract_address(1);
    let owner = PrivateKeySigner::random();
    let relayer = PrivateKeySigner::random();

    let relay_selector = abi.function("relay").unwrap()[0].selector();
    let reset_for_selector = abi.function("resetFor").unwrap()[0].selector();
    let cases = [
        (Submission::Relay, relay_selector),
        (Submission::SignedMethod, reset_for_selector),
    ];
    for (via, selector) in cases {
        let mode = SignMode::new(HashScheme::DoubleHash, via);
        let payload = RelayDispatcher::new(ctx.submitter.node().clone(), mode)
            .prepare_relay(&abi, "reset", &["42"], resolver, &owner)
            .await
            .unwrap();
        assert_eq!(payload.submission, via);

        let receipt = submit_relay(&ctx.submitter, &abi, &payload, &relayer, GAS_PRICE_WEI, true)
            .await
            .unwrap();
        assert!(receipt.status());
        assert_eq!(receipt.from, relayer.address());

        let sent = ctx.node.sent();
        let last = sent.last().unwrap();
        assert_eq!(last.to(), Some(resolver));
        assert_eq!(last.input()[..4], selector[..]);
        assert_eq!(last.input(), &payload.calldata(&abi).unwrap());
    }

    let nonces: Vec<u64> = ctx.node.sent()[1..].iter().map(Transaction::nonce).collect();
    assert_eq!(nonces, vec![0, 1]);
}
