use bitcoin::{
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
    absolute::LockTime, consensus::encode, script::PushBytesBuf, transaction::Version,
};

use crate::{
    address,
    error::WalletError,
    fee,
    keys::{KeyBackend, KeyPair},
    sighash::{self, SIGHASH_ALL_FORKID},
    types::{FeeRate, SignedTransaction, Utxo},
};

// 署名ハッシュ計算後、scriptSig に適用するまでの情報を一時的に保持する
struct SigningInfo {
    input_index: usize,
    script_sig: ScriptBuf,
}

/// 全UTXOを入力とし、受取人1出力だけのトランザクションを組み立てて署名する。
///
/// おつり出力は作らない。`amount - fee` を超える残高はそのまま手数料として支払われる
/// (全額スイープを前提とした挙動)。
pub struct TransactionBuilder<'a, B: KeyBackend> {
    backend: &'a B,
}

impl<'a, B: KeyBackend> TransactionBuilder<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        TransactionBuilder { backend }
    }

    pub fn build(
        &self,
        key: &KeyPair,
        utxos: &[Utxo],
        destination: &str,
        amount: Amount,
        fee_rate: FeeRate,
    ) -> Result<SignedTransaction, WalletError> {
        log::info!("トランザクション構築処理を開始します。UTXO数: {}", utxos.len());

        if utxos.is_empty() {
            return Err(WalletError::NoSpendableOutputs);
        }

        let total_available = total_available(utxos);
        let tx_fee = estimate_network_fee(utxos, fee_rate);
        log::debug!(
            "利用可能総額: {} sats, 手数料率: {}, 計算された手数料: {} sats",
            total_available.to_sat(),
            fee_rate,
            tx_fee.to_sat()
        );

        let send_value = match amount.checked_sub(tx_fee) {
            Some(value) if value > Amount::ZERO => value,
            _ => {
                return Err(WalletError::AmountBelowFee {
                    amount: amount.to_sat(),
                    fee: tx_fee.to_sat(),
                });
            }
        };
        if send_value > total_available {
            return Err(WalletError::InsufficientBalance {
                available: total_available.to_sat(),
                requested: amount.to_sat(),
                fee: tx_fee.to_sat(),
            });
        }
        if total_available > amount {
            log::warn!(
                "おつり出力は作成しません。要求額を超える {} sats も手数料として支払われます。",
                (total_available - amount).to_sat()
            );
        }

        let payload = address::decode(destination)?;
        if payload.network != self.backend.network() {
            return Err(WalletError::invalid_address(
                destination,
                format!(
                    "ネットワーク不整合: 設定 ({}) vs アドレス ({})",
                    self.backend.network(),
                    payload.network
                ),
            ));
        }
        log::debug!("受取人出力: address={}, value={}", payload.to_legacy(), send_value.to_sat());

        // 署名対象のトランザクションを初期化 (scriptSig は空)
        let mut transaction = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: utxos
                .iter()
                .map(|utxo| TxIn {
                    previous_output: OutPoint::new(utxo.txid, utxo.vout),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
                .collect(),
            output: vec![TxOut {
                value: send_value,
                script_pubkey: payload.script_pubkey(),
            }],
        };

        log::info!("トランザクション署名処理を開始します。");
        let own_script = key.address_payload(self.backend.network()).script_pubkey();
        let mut signing_infos: Vec<SigningInfo> = Vec::with_capacity(utxos.len());

        // 1. 全入力の署名を作る。ここで失敗しても署名途中のトランザクションは返さない
        for (input_index, utxo) in utxos.iter().enumerate() {
            if utxo.script_pubkey != own_script {
                return Err(WalletError::SigningFailed {
                    input_index,
                    reason: format!(
                        "このUTXO ({}:{}) のロックスクリプトは署名鍵で解除できません",
                        utxo.txid, utxo.vout
                    ),
                });
            }

            let digest = sighash::forkid_signature_hash(
                &transaction,
                input_index,
                &utxo.script_pubkey,
                utxo.amount,
            )?;
            let signature = self
                .backend
                .sign(key, digest)
                .map_err(|e| WalletError::SigningFailed {
                    input_index,
                    reason: e.to_string(),
                })?;

            let mut sig_bytes = signature.serialize_der().to_vec();
            sig_bytes.push(SIGHASH_ALL_FORKID as u8);
            let push = PushBytesBuf::try_from(sig_bytes).map_err(|_| WalletError::SigningFailed {
                input_index,
                reason: "署名のPushBytes変換に失敗".to_string(),
            })?;
            let script_sig = bitcoin::script::Builder::new()
                .push_slice(push)
                .push_key(&key.public_key)
                .into_script();
            signing_infos.push(SigningInfo {
                input_index,
                script_sig,
            });
        }

        // 2. 署名を適用
        for info in signing_infos {
            transaction.input[info.input_index].script_sig = info.script_sig;
        }
        log::info!("全ての入力の署名が完了しました。");

        let signed_tx = encode::serialize_hex(&transaction);
        let txid = transaction.compute_txid();
        log::debug!("txid={}, raw transaction hex: {}", txid, signed_tx);

        Ok(SignedTransaction {
            tx: transaction,
            signed_tx,
            txid,
            fee: tx_fee,
            broadcasted: false,
        })
    }
}

pub fn total_available(utxos: &[Utxo]) -> Amount {
    utxos.iter().fold(Amount::ZERO, |acc, utxo| {
        Amount::from_sat(acc.to_sat().saturating_add(utxo.amount.to_sat()))
    })
}

/// 全UTXOを入力、受取人1出力とした場合の手数料 (最低リレー手数料を適用済み)
pub fn estimate_network_fee(utxos: &[Utxo], fee_rate: FeeRate) -> Amount {
    fee::relay_fee(fee_rate, utxos.len())
}
