use bitcoin::{Amount, Denomination};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::error::WalletError;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// 設定を記述したJSONファイルへのパス
    #[clap(short, long, value_parser)]
    pub config: Option<PathBuf>,

    /// 使用するネットワーク ("mainnet", "testnet")。設定ファイルの値を上書きする
    #[clap(short, long, value_parser)]
    pub network: Option<String>,

    /// WIF形式の秘密鍵
    #[clap(long, value_parser, conflicts_with = "xprv")]
    pub wif: Option<String>,

    /// BIP32拡張秘密鍵 (xprv/tprv)
    #[clap(long, value_parser)]
    pub xprv: Option<String>,

    /// --xprv から子鍵を導出するパス
    #[clap(long, value_parser, default_value = "m")]
    pub path: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 鍵から入金アドレスを導出する
    Address,
    /// アドレスがキャッシュアドレス形式か検証する
    Validate { address: String },
    /// 残高を取得する
    Balance { address: String },
    /// 使用可能なUTXOを取得する
    Utxos { address: String },
    /// 全UTXOをスイープする場合の手数料を見積もる
    Fee {
        /// 手数料率 (sats/byte)。省略時は設定値
        #[clap(long, value_parser)]
        fee_rate: Option<u64>,
    },
    /// 全UTXOを1つのアドレスに送金する
    Sweep {
        /// 送金先 (キャッシュアドレス形式)
        #[clap(long, value_parser)]
        to: String,
        /// 送金額 (BCH単位、例: 0.001)
        #[clap(long, value_parser)]
        amount: String,
        #[clap(long, value_parser)]
        fee_rate: Option<u64>,
        /// 署名済みトランザクションを出力するだけでブロードキャストしない
        #[clap(long)]
        dry_run: bool,
    },
    /// 取引履歴を取得する
    History { address: String },
}

pub fn parse_amount(amount_str: &str) -> Result<Amount, WalletError> {
    Amount::from_str_in(amount_str.trim(), Denomination::Bitcoin)
        .map_err(|e| WalletError::InputValidation(format!("無効な金額が指定されました ({}): {}", amount_str, e)))
}
