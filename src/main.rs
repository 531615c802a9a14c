use clap::Parser;
use serde_json::{Value, json};

use cash_deposit_wallet::cli::{CliArgs, Command, parse_amount};
use cash_deposit_wallet::{
    Bip32Backend, DepositWallet, FeeRate, KeyBackend, WalletConfig, WalletError, WifBackend,
};

#[tokio::main]
async fn main() -> Result<(), WalletError> {
    env_logger::init();

    let args = CliArgs::parse();
    log::info!("アプリケーションを開始します。コマンド: {:?}", args.command);

    let mut config = match &args.config {
        Some(path) => WalletConfig::from_file(path)?,
        None => WalletConfig::default(),
    };
    if let Some(network) = &args.network {
        config.network = Some(network.clone());
    }
    let settings = config.into_settings()?;
    log::info!("指定されたネットワーク: {}", settings.network);

    // 鍵素材の種類でバックエンドを選ぶ。鍵を使わないコマンドは WIF バックエンドで足りる
    let output = match (&args.xprv, &args.wif) {
        (Some(xprv), _) => {
            let backend = Bip32Backend::with_path_str(settings.network, &args.path)?;
            let wallet = DepositWallet::new(settings, backend)?;
            execute(&wallet, Some(xprv.as_str()), &args.command).await?
        }
        (None, wif) => {
            let backend = WifBackend::new(settings.network);
            let wallet = DepositWallet::new(settings, backend)?;
            execute(&wallet, wif.as_deref(), &args.command).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    log::info!("処理が正常に完了しました。");
    Ok(())
}

async fn execute<B>(
    wallet: &DepositWallet<B>,
    material: Option<&str>,
    command: &Command,
) -> Result<Value, WalletError>
where
    B: KeyBackend<Material = str>,
{
    let require_key = || {
        material.ok_or_else(|| WalletError::InputValidation("--wif または --xprv を指定してください".to_string()))
    };

    let value = match command {
        Command::Address => {
            let address = wallet.derive_address(require_key()?)?;
            json!({
                "address": address.to_string(),
                "legacyAddress": address.payload().to_legacy().to_string(),
            })
        }
        Command::Validate { address } => serde_json::to_value(wallet.validate_address(address))?,
        Command::Balance { address } => serde_json::to_value(wallet.get_balance(address).await?)?,
        Command::Utxos { address } => {
            serde_json::to_value(wallet.get_spendable_outputs(address).await?)?
        }
        Command::Fee { fee_rate } => {
            let fee = wallet.estimate_fee(require_key()?, fee_rate.map(FeeRate)).await?;
            json!({ "fee": fee.to_sat() })
        }
        Command::Sweep {
            to,
            amount,
            fee_rate,
            dry_run,
        } => {
            let amount = parse_amount(amount)?;
            let fee_rate = fee_rate.map(FeeRate);
            if *dry_run {
                let signed = wallet.build_sweep(require_key()?, to, amount, fee_rate).await?;
                serde_json::to_value(signed)?
            } else {
                serde_json::to_value(wallet.sweep_to(require_key()?, to, amount, fee_rate).await?)?
            }
        }
        Command::History { address } => serde_json::to_value(wallet.get_history(address).await?)?,
    };
    Ok(value)
}
