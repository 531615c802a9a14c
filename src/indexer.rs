//! Insight 互換インデックスサービスのクライアント。
//!
//! エンドポイント:
//! - GET  addr/{address}            残高
//! - GET  addr/{address}/utxo       UTXO一覧
//! - GET  txs?address={address}     取引履歴

use std::str::FromStr;

use bitcoin::{Amount, ScriptBuf, SignedAmount, Txid};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::address;
use crate::config::Settings;
use crate::error::WalletError;
use crate::types::{Balance, TransactionSummary, Utxo};

/// テストモード時に残すUTXOの最大件数
pub const TEST_MODE_UTXO_LIMIT: usize = 2;

/// `addr/{address}/utxo` の1要素 (ワイヤ形式)
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InsightUtxo {
    pub txid: String,
    pub vout: u32,
    pub script_pub_key: String,
    pub address: String,
    pub satoshis: u64,
    #[serde(default)]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(default)]
    pub ts: Option<u64>,
}

impl TryFrom<&InsightUtxo> for Utxo {
    type Error = String;

    fn try_from(raw: &InsightUtxo) -> Result<Self, Self::Error> {
        let txid = Txid::from_str(&raw.txid).map_err(|e| format!("無効なTXID形式 ({}): {}", raw.txid, e))?;
        let script_bytes = hex::decode(&raw.script_pub_key)
            .map_err(|e| format!("scriptPubKeyのデコード失敗 ({}): {}", raw.script_pub_key, e))?;
        let address = address::to_legacy(&raw.address).map_err(|e| e.to_string())?;
        Ok(Utxo {
            txid,
            vout: raw.vout,
            script_pubkey: ScriptBuf::from_bytes(script_bytes),
            address,
            amount: Amount::from_sat(raw.satoshis),
        })
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InsightAddressInfo {
    balance: f64,
    #[serde(default)]
    unconfirmed_balance: f64,
}

#[derive(Deserialize, Debug)]
struct InsightTxPage {
    #[serde(default)]
    txs: Vec<InsightTx>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InsightTx {
    txid: String,
    #[serde(default)]
    vout: Vec<InsightTxOut>,
    #[serde(default)]
    vin: Vec<InsightTxIn>,
    fees: Option<f64>,
    value_in: Option<f64>,
    value_out: Option<f64>,
    time: Option<u64>,
}

#[derive(Deserialize, Debug)]
struct InsightTxOut {
    addresses: Option<Vec<String>>,
}

#[derive(Deserialize, Debug)]
struct InsightTxIn {
    addr: Option<String>,
}

impl From<InsightTx> for TransactionSummary {
    fn from(tx: InsightTx) -> Self {
        // 先頭の出力/入力のアドレスのみを採用する
        let send_address = tx
            .vout
            .first()
            .and_then(|out| out.addresses.as_ref())
            .and_then(|addrs| addrs.first().cloned());
        let receive_address = tx.vin.first().and_then(|input| input.addr.clone());
        TransactionSummary {
            txid: tx.txid,
            send_address,
            receive_address,
            fee: tx.fees.and_then(coins_to_amount),
            amount_in: tx.value_in.and_then(coins_to_amount),
            amount_out: tx.value_out.and_then(coins_to_amount),
            timestamp: tx.time,
        }
    }
}

fn coins_to_amount(value: f64) -> Option<Amount> {
    Amount::from_btc(value).ok()
}

#[derive(Debug, Clone)]
pub struct InsightClient {
    base: Url,
    client: reqwest::Client,
    test_mode_utxo_limit: bool,
}

impl InsightClient {
    pub fn new(settings: &Settings) -> Result<Self, WalletError> {
        let client = settings.http_client()?;
        Ok(Self::with_client(settings, client))
    }

    pub fn with_client(settings: &Settings, client: reqwest::Client) -> Self {
        InsightClient {
            base: settings.index_service_url.clone(),
            client,
            test_mode_utxo_limit: settings.test_mode_utxo_limit,
        }
    }

    pub async fn fetch_utxos(&self, address: &str) -> Result<Vec<Utxo>, WalletError> {
        let legacy = address::to_legacy(address)?.to_string();
        let url = self.endpoint(&["addr", &legacy, "utxo"])?;
        let raw: Vec<InsightUtxo> = self.get_json(url.clone()).await?;

        let mut utxos = raw
            .iter()
            .map(Utxo::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| WalletError::IndexResponse {
                url: url.to_string(),
                reason,
            })?;
        log::info!("{} 件のUTXOを取得しました: {}", utxos.len(), legacy);

        if self.test_mode_utxo_limit && utxos.len() > TEST_MODE_UTXO_LIMIT {
            log::warn!(
                "テストモード: UTXOを {} 件から {} 件に切り詰めます",
                utxos.len(),
                TEST_MODE_UTXO_LIMIT
            );
            utxos.truncate(TEST_MODE_UTXO_LIMIT);
        }
        Ok(utxos)
    }

    pub async fn fetch_balance(&self, address: &str) -> Result<Balance, WalletError> {
        let cash = address::to_cash_format(address)?.to_string();
        let url = self.endpoint(&["addr", &cash])?;
        let info: InsightAddressInfo = self.get_json(url.clone()).await?;

        let invalid = |reason: String| WalletError::IndexResponse {
            url: url.to_string(),
            reason,
        };
        let confirmed = Amount::from_btc(info.balance)
            .map_err(|e| invalid(format!("balance ({}): {}", info.balance, e)))?;
        let unconfirmed = SignedAmount::from_btc(info.unconfirmed_balance)
            .map_err(|e| invalid(format!("unconfirmedBalance ({}): {}", info.unconfirmed_balance, e)))?;
        Ok(Balance {
            confirmed,
            unconfirmed,
        })
    }

    pub async fn fetch_history(&self, address: &str) -> Result<Vec<TransactionSummary>, WalletError> {
        let mut url = self.endpoint(&["txs"])?;
        url.query_pairs_mut().append_pair("address", address);
        let page: InsightTxPage = self.get_json(url).await?;
        Ok(page.txs.into_iter().map(TransactionSummary::from).collect())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, WalletError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| WalletError::InvalidConfiguration(format!("ベースURLが不正です: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, WalletError> {
        log::debug!("GET {}", url);
        let unreachable_err = |reason: String| WalletError::IndexServiceUnreachable {
            url: url.to_string(),
            reason,
        };
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| unreachable_err(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(unreachable_err(format!("status={} body={}", status, body)));
        }
        let body = resp.text().await.map_err(|e| unreachable_err(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| WalletError::IndexResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(address: &str) -> InsightUtxo {
        InsightUtxo {
            txid: "a".repeat(64),
            vout: 3,
            script_pub_key: "76a91476a04053bda0a88bda5177b86a15c3b29f55987388ac".to_string(),
            address: address.to_string(),
            satoshis: 12_345,
            confirmations: Some(6),
            height: Some(540_000),
            ts: Some(1_528_318_303),
        }
    }

    #[test]
    fn normalizes_wire_record_without_touching_it() {
        let wire = raw("bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a");
        let utxo = Utxo::try_from(&wire).unwrap();
        assert_eq!(utxo.vout, 3);
        assert_eq!(utxo.amount, Amount::from_sat(12_345));
        assert_eq!(utxo.address.to_string(), "1BpEi6DfDAUFd7GtittLSdBeYJvcoaVggu");
        assert!(utxo.script_pubkey.is_p2pkh());
        assert_eq!(wire.confirmations, Some(6));
        assert!(wire.address.starts_with("bitcoincash:"));
    }

    #[test]
    fn rejects_bad_script_hex() {
        let mut wire = raw("1BpEi6DfDAUFd7GtittLSdBeYJvcoaVggu");
        wire.script_pub_key = "zz".to_string();
        assert!(Utxo::try_from(&wire).unwrap_err().contains("scriptPubKey"));
    }

    #[test]
    fn history_takes_first_addresses_only() {
        let json = serde_json::json!({
            "txid": "ff",
            "vout": [{ "addresses": ["addr-out-1", "addr-out-2"] }, { "addresses": ["addr-out-3"] }],
            "vin": [{ "addr": "addr-in-1" }, { "addr": "addr-in-2" }],
            "fees": 0.00000226,
            "valueIn": 0.001,
            "valueOut": 0.00099774,
            "time": 1_528_318_303u64
        });
        let tx: InsightTx = serde_json::from_value(json).unwrap();
        let summary = TransactionSummary::from(tx);
        assert_eq!(summary.send_address.as_deref(), Some("addr-out-1"));
        assert_eq!(summary.receive_address.as_deref(), Some("addr-in-1"));
        assert_eq!(summary.fee, Some(Amount::from_sat(226)));
        assert_eq!(summary.amount_in, Some(Amount::from_sat(100_000)));
        assert_eq!(summary.timestamp, Some(1_528_318_303));
    }

    #[test]
    fn history_tolerates_missing_fields() {
        let tx: InsightTx = serde_json::from_value(serde_json::json!({ "txid": "ee" })).unwrap();
        let summary = TransactionSummary::from(tx);
        assert_eq!(summary.txid, "ee");
        assert!(summary.send_address.is_none());
        assert!(summary.receive_address.is_none());
        assert!(summary.fee.is_none());
        assert!(summary.timestamp.is_none());
    }
}
