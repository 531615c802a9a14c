//! リプレイ保護付き署名ハッシュ (SIGHASH_FORKID)。
//!
//! BIP143 と同じプリイメージ構成で、ハッシュタイプに FORKID ビット (0x40) を立てる。

use bitcoin::consensus::serialize;
use bitcoin::hashes::{Hash, sha256d};
use bitcoin::{Amount, Script, Transaction};

use crate::error::WalletError;

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_FORKID: u32 = 0x40;
pub const SIGHASH_ALL_FORKID: u32 = SIGHASH_ALL | SIGHASH_FORKID;

/// SIGHASH_ALL | SIGHASH_FORKID の署名ハッシュ
pub fn forkid_signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    value: Amount,
) -> Result<[u8; 32], WalletError> {
    signature_hash(tx, input_index, script_code, value, SIGHASH_ALL_FORKID)
}

// ANYONECANPAY / NONE / SINGLE は使わないので ALL の形だけを組み立てる
fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    value: Amount,
    sighash_type: u32,
) -> Result<[u8; 32], WalletError> {
    let input = tx.input.get(input_index).ok_or_else(|| WalletError::SigningFailed {
        input_index,
        reason: format!("入力数 {} を超えています", tx.input.len()),
    })?;

    let mut prevouts = Vec::with_capacity(36 * tx.input.len());
    let mut sequences = Vec::with_capacity(4 * tx.input.len());
    for txin in &tx.input {
        prevouts.extend_from_slice(&serialize(&txin.previous_output));
        sequences.extend_from_slice(&txin.sequence.0.to_le_bytes());
    }
    let mut outputs = Vec::new();
    for txout in &tx.output {
        outputs.extend_from_slice(&serialize(txout));
    }

    let mut preimage = Vec::with_capacity(156 + script_code.len());
    preimage.extend_from_slice(&tx.version.0.to_le_bytes());
    preimage.extend_from_slice(sha256d::Hash::hash(&prevouts).as_byte_array());
    preimage.extend_from_slice(sha256d::Hash::hash(&sequences).as_byte_array());
    preimage.extend_from_slice(&serialize(&input.previous_output));
    preimage.extend_from_slice(&serialize(&script_code.to_owned()));
    preimage.extend_from_slice(&value.to_sat().to_le_bytes());
    preimage.extend_from_slice(&input.sequence.0.to_le_bytes());
    preimage.extend_from_slice(sha256d::Hash::hash(&outputs).as_byte_array());
    preimage.extend_from_slice(&tx.lock_time.to_consensus_u32().to_le_bytes());
    preimage.extend_from_slice(&sighash_type.to_le_bytes());

    Ok(sha256d::Hash::hash(&preimage).to_byte_array())
}
