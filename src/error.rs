use std::path::PathBuf;
use thiserror::Error;

use crate::types::AttemptFailure;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("設定ファイルのパースエラー ファイル: {file_path:?}, 詳細: {source}")]
    ConfigParse {
        file_path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSONエンコードエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("入力検証エラー: {0}")]
    InputValidation(String),

    #[error("設定エラー: {0}")]
    InvalidConfiguration(String),

    #[error("アドレス形式エラー ({address}): {reason}")]
    InvalidAddressFormat { address: String, reason: String },

    #[error("鍵素材の読み込みエラー: {0}")]
    InvalidKeyMaterial(String),

    #[error("インデックスサービスに接続できません ({url}): {reason}")]
    IndexServiceUnreachable { url: String, reason: String },

    #[error("インデックスサービスの応答が不正です ({url}): {reason}")]
    IndexResponse { url: String, reason: String },

    #[error("使用可能なUTXOがありません")]
    NoSpendableOutputs,

    #[error("残高不足: 利用可能な総額 {available} sats, 要求額 {requested} sats (手数料 {fee} sats)")]
    InsufficientBalance {
        available: u64,
        requested: u64,
        fee: u64,
    },

    #[error("送金額 {amount} sats が手数料 {fee} sats を下回っています")]
    AmountBelowFee { amount: u64, fee: u64 },

    #[error("署名エラー (入力インデックス {input_index}): {reason}")]
    SigningFailed { input_index: usize, reason: String },

    // 二回目の応答を先に、一回目の応答を後に並べる
    #[error("ブロードキャストに失敗しました。デバッグ情報: {backup} ---- {primary}")]
    BroadcastFailed {
        primary: AttemptFailure,
        backup: AttemptFailure,
    },
}

impl WalletError {
    pub(crate) fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        WalletError::InvalidAddressFormat {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}
