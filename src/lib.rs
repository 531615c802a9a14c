//! Bitcoin Cash 入金アドレス用ウォレットヘルパー。
//!
//! 鍵からの入金アドレス導出、インデックスサービス (Insight互換) からのUTXO・残高取得、
//! 全UTXOを1つのアドレスへ送るスイープトランザクションの構築・署名、
//! プライマリ/バックアップ2系統でのブロードキャストを提供する。

pub mod address;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod error;
pub mod fee;
pub mod indexer;
pub mod keys;
pub mod sighash;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use address::{AddressValidation, CashAddress, LegacyAddress};
pub use broadcast::Broadcaster;
pub use config::{Network, Settings, WalletConfig};
pub use error::WalletError;
pub use indexer::InsightClient;
pub use keys::{Bip32Backend, KeyBackend, KeyPair, WifBackend};
pub use transaction::TransactionBuilder;
pub use types::{Balance, BroadcastResult, FeeRate, SignedTransaction, TransactionSummary, Utxo};
pub use wallet::DepositWallet;
