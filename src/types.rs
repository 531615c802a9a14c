use std::fmt;

use bitcoin::{Amount, ScriptBuf, SignedAmount, Transaction, Txid};
use serde::{Deserialize, Serialize};

use crate::address::LegacyAddress;

/// 1バイトあたりの手数料 (sats/byte)。
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeRate(pub u64);

impl FeeRate {
    pub const DEFAULT: FeeRate = FeeRate(1);

    pub fn sat_per_byte(self) -> u64 {
        self.0
    }
}

impl Default for FeeRate {
    fn default() -> Self {
        FeeRate::DEFAULT
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/B", self.0)
    }
}

/// インデックスサービスから取得し正規化したUTXO。生成後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub script_pubkey: ScriptBuf,
    pub address: LegacyAddress,
    #[serde(rename = "satoshis", with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub confirmed: Amount,
    // Insight は未承認分を差分で返すため負になり得る
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub unconfirmed: SignedAmount,
}

/// 取引履歴の要約。リモートが省略したフィールドは None のまま。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub txid: String,
    pub send_address: Option<String>,
    pub receive_address: Option<String>,
    #[serde(with = "bitcoin::amount::serde::as_sat::opt")]
    pub fee: Option<Amount>,
    #[serde(with = "bitcoin::amount::serde::as_sat::opt")]
    pub amount_in: Option<Amount>,
    #[serde(with = "bitcoin::amount::serde::as_sat::opt")]
    pub amount_out: Option<Amount>,
    pub timestamp: Option<u64>,
}

/// 署名済みトランザクション。`broadcasted` はブロードキャスト成功時のみ true になる。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    #[serde(skip)]
    pub tx: Transaction,
    pub signed_tx: String,
    pub txid: Txid,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub fee: Amount,
    pub broadcasted: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Primary,
    Backup,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Primary => f.write_str("primary"),
            Endpoint::Backup => f.write_str("backup"),
        }
    }
}

/// 一回分の送信失敗。最終エラーの診断情報としてのみ保持する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub endpoint: Endpoint,
    pub url: String,
    pub status: Option<u16>,
    pub body: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{} {} status={}] {}", self.endpoint, self.url, status, self.body),
            None => write!(f, "[{} {}] {}", self.endpoint, self.url, self.body),
        }
    }
}

/// 一回分の送信記録。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastAttempt {
    pub endpoint: Endpoint,
    pub url: String,
    pub outcome: Result<(), AttemptFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastResult {
    pub txid: Txid,
    pub accepted_by: Endpoint,
    pub attempts: usize,
}
