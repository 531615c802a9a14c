use bitcoin::secp256k1::SecretKey;
use bitcoin::{Amount, NetworkKind, PrivateKey, SignedAmount};
use cash_deposit_wallet::types::Endpoint;
use cash_deposit_wallet::{
    DepositWallet, FeeRate, KeyBackend, Network, WalletConfig, WalletError, WifBackend, fee,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DESTINATION: &str = "bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a";

fn wif() -> String {
    PrivateKey::new(SecretKey::from_slice(&[1u8; 32]).unwrap(), NetworkKind::Main).to_wif()
}

fn wallet(index: &str, backup: &str, test_mode: bool) -> DepositWallet<WifBackend> {
    let settings = WalletConfig {
        index_service_url: Some(index.to_string()),
        backup_broadcast_url: Some(backup.to_string()),
        test_mode_utxo_limit: test_mode,
        ..Default::default()
    }
    .into_settings()
    .unwrap();
    DepositWallet::new(settings, WifBackend::new(Network::Mainnet)).unwrap()
}

/// (レガシーアドレス, キャッシュアドレス, scriptPubKey hex)
fn own_address(wallet: &DepositWallet<WifBackend>) -> (String, String, String) {
    let cash = wallet.derive_address(&wif()).unwrap();
    let legacy = cash.payload().to_legacy().to_string();
    let script = hex::encode(cash.payload().script_pubkey().as_bytes());
    (legacy, cash.to_string(), script)
}

fn utxo_json(cash: &str, script: &str, values: &[u64]) -> serde_json::Value {
    let list: Vec<_> = values
        .iter()
        .enumerate()
        .map(|(i, sats)| {
            serde_json::json!({
                "address": cash,
                "txid": format!("{:064x}", i + 1),
                "vout": i,
                "scriptPubKey": script,
                "amount": *sats as f64 / 1e8,
                "satoshis": sats,
                "height": 540_000,
                "confirmations": 12,
                "ts": 1_528_318_303u64
            })
        })
        .collect();
    serde_json::Value::Array(list)
}

async fn mount_utxos(server: &MockServer, legacy: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/addr/{legacy}/utxo")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn sweep_builds_signs_and_broadcasts() {
    let index = MockServer::start().await;
    let backup = MockServer::start().await;
    let wallet = wallet(&index.uri(), &backup.uri(), false);
    let (legacy, cash, script) = own_address(&wallet);

    mount_utxos(&index, &legacy, utxo_json(&cash, &script, &[60_000, 40_000])).await;
    Mock::given(method("POST"))
        .and(path("/tx/send"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&index)
        .await;

    let signed = wallet
        .build_sweep(&wif(), DESTINATION, Amount::from_sat(100_000), Some(FeeRate(1)))
        .await
        .unwrap();
    assert_eq!(signed.tx.input.len(), 2);
    assert_eq!(signed.tx.output.len(), 1);
    assert_eq!(signed.tx.output[0].value, Amount::from_sat(100_000) - signed.fee);
    assert_eq!(signed.fee, fee::MIN_RELAY_FEE);

    let result = wallet
        .sweep_to(&wif(), DESTINATION, Amount::from_sat(100_000), Some(FeeRate(1)))
        .await
        .unwrap();
    assert_eq!(result.txid, signed.txid);
    assert_eq!(result.accepted_by, Endpoint::Primary);
}

#[tokio::test]
async fn sweep_reports_both_broadcast_failures() {
    let index = MockServer::start().await;
    let backup = MockServer::start().await;
    let wallet = wallet(&index.uri(), &backup.uri(), false);
    let (legacy, cash, script) = own_address(&wallet);

    mount_utxos(&index, &legacy, utxo_json(&cash, &script, &[100_000])).await;
    Mock::given(method("POST"))
        .and(path("/tx/send"))
        .respond_with(ResponseTemplate::new(400).set_body_string("first-endpoint-rejected"))
        .mount(&index)
        .await;
    Mock::given(method("POST"))
        .and(path("/tx/send"))
        .respond_with(ResponseTemplate::new(500).set_body_string("second-endpoint-crashed"))
        .mount(&backup)
        .await;

    let err = wallet
        .sweep_to(&wif(), DESTINATION, Amount::from_sat(100_000), None)
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, WalletError::BroadcastFailed { .. }));
    assert!(message.contains("first-endpoint-rejected"));
    assert!(message.contains("second-endpoint-crashed"));
}

#[tokio::test]
async fn empty_spendable_set_never_broadcasts() {
    let index = MockServer::start().await;
    let wallet = wallet(&index.uri(), &index.uri(), false);
    let (legacy, _, _) = own_address(&wallet);

    mount_utxos(&index, &legacy, serde_json::json!([])).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&index)
        .await;

    let err = wallet
        .sweep_to(&wif(), DESTINATION, Amount::from_sat(10_000), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::NoSpendableOutputs));
}

#[tokio::test]
async fn insufficient_balance_never_broadcasts() {
    let index = MockServer::start().await;
    let wallet = wallet(&index.uri(), &index.uri(), false);
    let (legacy, cash, script) = own_address(&wallet);

    mount_utxos(&index, &legacy, utxo_json(&cash, &script, &[2_000])).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&index)
        .await;

    let err = wallet
        .sweep_to(&wif(), DESTINATION, Amount::from_sat(50_000), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::InsufficientBalance { available: 2_000, .. }));
}

#[tokio::test]
async fn legacy_destination_is_rejected_before_any_request() {
    let index = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(0)
        .mount(&index)
        .await;
    let wallet = wallet(&index.uri(), &index.uri(), false);

    let err = wallet
        .sweep_to(&wif(), "1BpEi6DfDAUFd7GtittLSdBeYJvcoaVggu", Amount::from_sat(10_000), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::InvalidAddressFormat { .. }));
}

#[tokio::test]
async fn test_mode_clips_spendable_outputs() {
    let index = MockServer::start().await;
    let clipped = wallet(&index.uri(), &index.uri(), true);
    let unclipped = wallet(&index.uri(), &index.uri(), false);
    let (legacy, cash, script) = own_address(&clipped);

    mount_utxos(&index, &legacy, utxo_json(&cash, &script, &[1_000, 2_000, 3_000])).await;

    let utxos = clipped.get_spendable_outputs(&cash).await.unwrap();
    assert_eq!(utxos.len(), 2);
    assert_eq!(utxos[0].amount, Amount::from_sat(1_000));
    assert_eq!(utxos[1].amount, Amount::from_sat(2_000));
    assert_eq!(utxos[0].address.to_string(), legacy);

    assert_eq!(unclipped.get_spendable_outputs(&cash).await.unwrap().len(), 3);
}

#[tokio::test]
async fn index_failure_surfaces_as_unreachable() {
    let index = MockServer::start().await;
    let wallet = wallet(&index.uri(), &index.uri(), false);
    let (legacy, cash, _) = own_address(&wallet);

    Mock::given(method("GET"))
        .and(path(format!("/addr/{legacy}/utxo")))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&index)
        .await;

    let err = wallet.get_spendable_outputs(&cash).await.unwrap_err();
    match err {
        WalletError::IndexServiceUnreachable { url, reason } => {
            assert!(url.ends_with("/utxo"));
            assert!(reason.contains("502"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let fee_err = wallet.estimate_fee(&wif(), None).await.unwrap_err();
    assert!(matches!(fee_err, WalletError::IndexServiceUnreachable { .. }));
}

#[tokio::test]
async fn malformed_utxo_is_an_index_response_error() {
    let index = MockServer::start().await;
    let wallet = wallet(&index.uri(), &index.uri(), false);
    let (legacy, cash, _) = own_address(&wallet);

    mount_utxos(&index, &legacy, utxo_json(&cash, "not-hex", &[1_000])).await;

    let err = wallet.get_spendable_outputs(&cash).await.unwrap_err();
    assert!(matches!(err, WalletError::IndexResponse { .. }));
}

#[tokio::test]
async fn fee_estimate_uses_all_outputs() {
    let index = MockServer::start().await;
    let wallet = wallet(&index.uri(), &index.uri(), false);
    let (legacy, cash, script) = own_address(&wallet);

    mount_utxos(&index, &legacy, utxo_json(&cash, &script, &[10_000, 20_000])).await;

    let quoted = wallet.estimate_fee(&wif(), Some(FeeRate(10))).await.unwrap();
    assert_eq!(quoted, fee::estimate_fee(FeeRate(10), 2, 1, true));
    assert_eq!(quoted, Amount::from_sat(2_160));

    // 既定の 1 sat/byte では最低リレー手数料になる
    let floored = wallet.estimate_fee(&wif(), None).await.unwrap();
    assert_eq!(floored, fee::MIN_RELAY_FEE);
}

#[tokio::test]
async fn balance_is_read_from_cash_address_endpoint() {
    let index = MockServer::start().await;
    let wallet = wallet(&index.uri(), &index.uri(), false);
    let (_, cash, _) = own_address(&wallet);

    Mock::given(method("GET"))
        .and(path(format!("/addr/{cash}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "addrStr": cash,
            "balance": 0.0015,
            "balanceSat": 150_000,
            "unconfirmedBalance": -0.0001,
            "unconfirmedBalanceSat": -10_000
        })))
        .expect(1)
        .mount(&index)
        .await;

    let balance = wallet.get_balance(&cash).await.unwrap();
    assert_eq!(balance.confirmed, Amount::from_sat(150_000));
    assert_eq!(balance.unconfirmed, SignedAmount::from_sat(-10_000));
}

#[tokio::test]
async fn history_is_summarized() {
    let index = MockServer::start().await;
    let wallet = wallet(&index.uri(), &index.uri(), false);
    let (_, cash, _) = own_address(&wallet);

    Mock::given(method("GET"))
        .and(path("/txs"))
        .and(query_param("address", cash.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "pagesTotal": 1,
            "txs": [
                {
                    "txid": "abc",
                    "vin": [{ "addr": "sender-address" }],
                    "vout": [{ "addresses": ["receiver-address"] }],
                    "fees": 0.00001,
                    "valueIn": 0.01001,
                    "valueOut": 0.01,
                    "time": 1_528_318_303u64
                },
                { "txid": "def" }
            ]
        })))
        .mount(&index)
        .await;

    let history = wallet.get_history(&cash).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].txid, "abc");
    assert_eq!(history[0].receive_address.as_deref(), Some("sender-address"));
    assert_eq!(history[0].send_address.as_deref(), Some("receiver-address"));
    assert_eq!(history[0].fee, Some(Amount::from_sat(1_000)));
    assert_eq!(history[0].amount_out, Some(Amount::from_sat(1_000_000)));
    assert!(history[1].send_address.is_none());
}

#[test]
fn backend_network_must_match_settings() {
    let settings = WalletConfig {
        network: Some("testnet".to_string()),
        ..Default::default()
    }
    .into_settings()
    .unwrap();
    let err = DepositWallet::new(settings, WifBackend::new(Network::Mainnet))
        .err()
        .unwrap();
    assert!(matches!(err, WalletError::InvalidConfiguration(_)));
}

#[test]
fn derived_address_is_cash_format() {
    let wallet = wallet("http://127.0.0.1:1/", "http://127.0.0.1:1/", false);
    let address = wallet.derive_address(&wif()).unwrap();
    let validation = wallet.validate_address(&address.to_string());
    assert!(validation.valid);
    assert_eq!(validation.network, Some(Network::Mainnet));
    assert_eq!(wallet.backend().network(), Network::Mainnet);
}
