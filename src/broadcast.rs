//! 署名済みトランザクションの送信。
//!
//! プライマリに送信し、失敗した場合に限りバックアップへ一度だけ再送する。
//! 両方失敗した場合は両方の応答をエラーに含める。

use reqwest::header::HeaderMap;
use serde::Serialize;
use url::Url;

use crate::config::Settings;
use crate::error::WalletError;
use crate::types::{AttemptFailure, BroadcastAttempt, BroadcastResult, Endpoint, SignedTransaction};

#[derive(Serialize)]
struct SendRequest<'a> {
    rawtx: &'a str,
}

#[derive(Debug, Clone)]
pub struct Broadcaster {
    client: reqwest::Client,
    primary: Url,
    backup: Url,
    headers: HeaderMap,
}

impl Broadcaster {
    pub fn new(settings: &Settings) -> Result<Self, WalletError> {
        let client = settings.http_client()?;
        Ok(Self::with_client(settings, client))
    }

    pub fn with_client(settings: &Settings, client: reqwest::Client) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &settings.broadcast_headers {
            headers.insert(name.clone(), value.clone());
        }
        Broadcaster {
            client,
            primary: settings.index_service_url.clone(),
            backup: settings.backup_broadcast_url.clone(),
            headers,
        }
    }

    /// 成功時のみ `tx.broadcasted` を true にする。
    pub async fn broadcast(&self, tx: &mut SignedTransaction) -> Result<BroadcastResult, WalletError> {
        log::info!("トランザクション {} をブロードキャストします。", tx.txid);

        let first = self.attempt(Endpoint::Primary, &self.primary, &tx.signed_tx).await;
        let primary_failure = match first.outcome {
            Ok(()) => return Ok(accepted(tx, Endpoint::Primary, 1)),
            Err(failure) => failure,
        };
        log::warn!("プライマリへの送信に失敗しました。バックアップで再試行します: {}", primary_failure);

        let second = self.attempt(Endpoint::Backup, &self.backup, &tx.signed_tx).await;
        match second.outcome {
            Ok(()) => Ok(accepted(tx, Endpoint::Backup, 2)),
            Err(backup_failure) => {
                log::error!("バックアップへの送信にも失敗しました: {}", backup_failure);
                Err(WalletError::BroadcastFailed {
                    primary: primary_failure,
                    backup: backup_failure,
                })
            }
        }
    }

    async fn attempt(&self, endpoint: Endpoint, base: &Url, raw_tx: &str) -> BroadcastAttempt {
        let url = match send_url(base) {
            Ok(url) => url,
            Err(reason) => {
                return BroadcastAttempt {
                    endpoint,
                    url: base.to_string(),
                    outcome: Err(AttemptFailure {
                        endpoint,
                        url: base.to_string(),
                        status: None,
                        body: reason,
                    }),
                };
            }
        };
        log::debug!("POST {} ({})", url, endpoint);

        let response = self
            .client
            .post(url.clone())
            .headers(self.headers.clone())
            .json(&SendRequest { rawtx: raw_tx })
            .send()
            .await;

        let outcome = match response {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("応答本文の読み込みに失敗: {}", e));
                Err(AttemptFailure {
                    endpoint,
                    url: url.to_string(),
                    status: Some(status),
                    body,
                })
            }
            Err(e) => Err(AttemptFailure {
                endpoint,
                url: url.to_string(),
                status: None,
                body: e.to_string(),
            }),
        };
        BroadcastAttempt {
            endpoint,
            url: url.to_string(),
            outcome,
        }
    }
}

fn accepted(tx: &mut SignedTransaction, endpoint: Endpoint, attempts: usize) -> BroadcastResult {
    tx.broadcasted = true;
    log::info!("ブロードキャスト成功 ({}): txid={}", endpoint, tx.txid);
    BroadcastResult {
        txid: tx.txid,
        accepted_by: endpoint,
        attempts,
    }
}

fn send_url(base: &Url) -> Result<Url, String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| format!("ベースURLが不正です: {}", base))?
        .pop_if_empty()
        .extend(["tx", "send"]);
    Ok(url)
}
