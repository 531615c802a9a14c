use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use bitcoin::NetworkKind;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::WalletError;
use crate::types::FeeRate;

/// 参照用の公開インスタンス。本番では必ず自前のものを指定すること。
pub const DEFAULT_INDEX_SERVICE_URL: &str = "https://blockdozer.com/api/";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn cash_prefix(self) -> &'static str {
        match self {
            Network::Mainnet => "bitcoincash",
            Network::Testnet => "bchtest",
        }
    }

    pub fn p2pkh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    pub fn p2sh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet => 0xc4,
        }
    }

    /// WIF や拡張鍵のバージョンバイト判定に使う
    pub fn kind(self) -> NetworkKind {
        match self {
            Network::Mainnet => NetworkKind::Main,
            Network::Testnet => NetworkKind::Test,
        }
    }
}

impl FromStr for Network {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(WalletError::InvalidConfiguration(format!(
                "無効なネットワークが指定されました: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

/// 設定ファイル (JSON) の内容。未指定の項目は `into_settings` で既定値になる。
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WalletConfig {
    pub index_service_url: Option<String>,
    pub backup_broadcast_url: Option<String>,
    pub fee_rate_per_byte: Option<u64>,
    pub network: Option<String>,
    /// テスト環境向け。有効にすると取得するUTXOを先頭2件までに切り詰める
    #[serde(default)]
    pub test_mode_utxo_limit: bool,
    #[serde(default)]
    pub broadcast_headers: BTreeMap<String, String>,
    pub request_timeout_secs: Option<u64>,
}

impl WalletConfig {
    pub fn from_file(path: &Path) -> Result<Self, WalletError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            log::error!("設定ファイルの読み込みに失敗しました: {:?}", path);
            WalletError::Io(e)
        })?;
        serde_json::from_str(&content).map_err(|e| WalletError::ConfigParse {
            file_path: path.to_path_buf(),
            source: e,
        })
    }

    /// 設定を検証し、以後変更されない `Settings` に変換する。
    pub fn into_settings(self) -> Result<Settings, WalletError> {
        let network = match self.network.as_deref() {
            None | Some("") => Network::Mainnet,
            Some(s) => s.parse()?,
        };

        let index_service_url = match self.index_service_url {
            Some(url) => parse_base_url("indexServiceUrl", &url)?,
            None => {
                log::warn!(
                    "既定のブロックエクスプローラーを使用します。自前のURLを設定することを強く推奨します: {}",
                    DEFAULT_INDEX_SERVICE_URL
                );
                parse_base_url("indexServiceUrl", DEFAULT_INDEX_SERVICE_URL)?
            }
        };
        let backup_broadcast_url = parse_base_url(
            "backupBroadcastUrl",
            self.backup_broadcast_url
                .as_deref()
                .unwrap_or(DEFAULT_INDEX_SERVICE_URL),
        )?;

        let mut broadcast_headers = Vec::with_capacity(self.broadcast_headers.len());
        for (name, value) in self.broadcast_headers {
            let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                WalletError::InvalidConfiguration(format!("無効なヘッダー名 ({}): {}", name, e))
            })?;
            let header_value = reqwest::header::HeaderValue::from_str(&value).map_err(|e| {
                WalletError::InvalidConfiguration(format!("無効なヘッダー値 ({}): {}", name, e))
            })?;
            broadcast_headers.push((header_name, header_value));
        }

        if self.test_mode_utxo_limit {
            log::warn!("テストモード: 取得するUTXOを最大 {} 件に制限します", crate::indexer::TEST_MODE_UTXO_LIMIT);
        }

        Ok(Settings {
            index_service_url,
            backup_broadcast_url,
            fee_rate: self.fee_rate_per_byte.map(FeeRate).unwrap_or_default(),
            network,
            test_mode_utxo_limit: self.test_mode_utxo_limit,
            broadcast_headers,
            request_timeout: Duration::from_secs(
                self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        })
    }
}

/// 検証済みの設定。プロセスの生存期間中は不変。
#[derive(Debug, Clone)]
pub struct Settings {
    pub index_service_url: Url,
    pub backup_broadcast_url: Url,
    pub fee_rate: FeeRate,
    pub network: Network,
    pub test_mode_utxo_limit: bool,
    pub broadcast_headers: Vec<(reqwest::header::HeaderName, reqwest::header::HeaderValue)>,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn http_client(&self) -> Result<reqwest::Client, WalletError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| WalletError::InvalidConfiguration(format!("HTTPクライアントの初期化に失敗: {}", e)))
    }
}

fn parse_base_url(field: &str, raw: &str) -> Result<Url, WalletError> {
    let mut url = Url::parse(raw)
        .map_err(|e| WalletError::InvalidConfiguration(format!("{} が不正です ({}): {}", field, raw, e)))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(WalletError::InvalidConfiguration(format!(
            "{} はHTTP(S)のURLである必要があります: {}",
            field, raw
        )));
    }
    // 相対パスを連結できるよう末尾をスラッシュで揃える
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
