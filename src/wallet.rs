//! 入金アドレス用ウォレットの窓口。
//!
//! UTXO取得 → 構築・署名 → ブロードキャストを順に実行し、最初のエラーでそのまま返す。

use bitcoin::Amount;

use crate::address::{self, AddressValidation, CashAddress};
use crate::broadcast::Broadcaster;
use crate::config::Settings;
use crate::error::WalletError;
use crate::indexer::InsightClient;
use crate::keys::KeyBackend;
use crate::transaction::{self, TransactionBuilder};
use crate::types::{Balance, BroadcastResult, FeeRate, SignedTransaction, TransactionSummary, Utxo};

pub struct DepositWallet<B: KeyBackend> {
    settings: Settings,
    backend: B,
    indexer: InsightClient,
    broadcaster: Broadcaster,
}

impl<B: KeyBackend> DepositWallet<B> {
    pub fn new(settings: Settings, backend: B) -> Result<Self, WalletError> {
        if backend.network() != settings.network {
            return Err(WalletError::InvalidConfiguration(format!(
                "鍵バックエンドのネットワーク ({}) が設定 ({}) と一致しません",
                backend.network(),
                settings.network
            )));
        }
        let client = settings.http_client()?;
        let indexer = InsightClient::with_client(&settings, client.clone());
        let broadcaster = Broadcaster::with_client(&settings, client);
        log::info!(
            "ウォレットを初期化しました: network={}, indexer={}, backup={}",
            settings.network,
            settings.index_service_url,
            settings.backup_broadcast_url
        );
        Ok(DepositWallet {
            settings,
            backend,
            indexer,
            broadcaster,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn derive_address(&self, material: &B::Material) -> Result<CashAddress, WalletError> {
        let key = self.backend.derive_key_pair(material)?;
        Ok(self.backend.to_address(&key))
    }

    pub fn validate_address(&self, address: &str) -> AddressValidation {
        address::validate(address)
    }

    pub async fn get_balance(&self, address: &str) -> Result<Balance, WalletError> {
        self.indexer.fetch_balance(address).await
    }

    pub async fn get_spendable_outputs(&self, address: &str) -> Result<Vec<Utxo>, WalletError> {
        self.indexer.fetch_utxos(address).await
    }

    pub async fn get_history(&self, address: &str) -> Result<Vec<TransactionSummary>, WalletError> {
        self.indexer.fetch_history(address).await
    }

    /// 導出アドレスの全UTXOを1出力で送金する場合の手数料見積もり
    pub async fn estimate_fee(
        &self,
        material: &B::Material,
        fee_rate: Option<FeeRate>,
    ) -> Result<Amount, WalletError> {
        let address = self.derive_address(material)?;
        let utxos = self.indexer.fetch_utxos(&address.to_string()).await?;
        let fee_rate = fee_rate.unwrap_or(self.settings.fee_rate);
        Ok(transaction::estimate_network_fee(&utxos, fee_rate))
    }

    /// UTXOを取得して署名済みトランザクションを作る (ブロードキャストはしない)
    pub async fn build_sweep(
        &self,
        material: &B::Material,
        destination: &str,
        amount: Amount,
        fee_rate: Option<FeeRate>,
    ) -> Result<SignedTransaction, WalletError> {
        let validation = address::validate(destination);
        if !validation.valid {
            return Err(WalletError::invalid_address(
                destination,
                validation.reason.unwrap_or_default(),
            ));
        }

        let key = self.backend.derive_key_pair(material)?;
        let from = self.backend.to_address(&key);
        log::info!("スイープ元: {}, 送金先: {}, 要求額: {} sats", from, destination, amount.to_sat());

        let utxos = self.indexer.fetch_utxos(&from.to_string()).await?;
        let fee_rate = fee_rate.unwrap_or(self.settings.fee_rate);
        TransactionBuilder::new(&self.backend).build(&key, &utxos, destination, amount, fee_rate)
    }

    pub async fn sweep_to(
        &self,
        material: &B::Material,
        destination: &str,
        amount: Amount,
        fee_rate: Option<FeeRate>,
    ) -> Result<BroadcastResult, WalletError> {
        let mut signed = self.build_sweep(material, destination, amount, fee_rate).await?;
        self.broadcaster.broadcast(&mut signed).await
    }
}
