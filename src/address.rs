//! レガシー形式 (Base58Check) とキャッシュアドレス形式 (cashaddr) の相互変換。
//!
//! どちらも同じ公開鍵ハッシュ/スクリプトハッシュの表現なので、変換は情報を失わない。

use std::fmt;

use bitcoin::hashes::Hash;
use bitcoin::{PubkeyHash, ScriptBuf, ScriptHash};
use serde::Serialize;

use crate::config::Network;
use crate::error::WalletError;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const CHECKSUM_LEN: usize = 8;
const HASH_LEN: usize = 20;
const KNOWN_NETWORKS: [Network; 2] = [Network::Mainnet, Network::Testnet];

const CASH_ONLY_REASON: &str =
    "Only bitcoin cash style addresses accepted (ex. bitcoincash:qrcz...f0jc)";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    P2pkh,
    P2sh,
}

impl AddressKind {
    fn type_bits(self) -> u8 {
        match self {
            AddressKind::P2pkh => 0,
            AddressKind::P2sh => 1,
        }
    }
}

/// 両形式に共通するデコード結果
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AddressPayload {
    pub network: Network,
    pub kind: AddressKind,
    pub hash: [u8; HASH_LEN],
}

impl AddressPayload {
    pub fn p2pkh(network: Network, hash: PubkeyHash) -> Self {
        AddressPayload {
            network,
            kind: AddressKind::P2pkh,
            hash: hash.to_byte_array(),
        }
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        match self.kind {
            AddressKind::P2pkh => ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(self.hash)),
            AddressKind::P2sh => ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(self.hash)),
        }
    }

    pub fn to_legacy(self) -> LegacyAddress {
        LegacyAddress(self)
    }

    pub fn to_cash(self) -> CashAddress {
        CashAddress(self)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct LegacyAddress(AddressPayload);

impl LegacyAddress {
    pub fn payload(&self) -> &AddressPayload {
        &self.0
    }
}

impl fmt::Display for LegacyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = match self.0.kind {
            AddressKind::P2pkh => self.0.network.p2pkh_version(),
            AddressKind::P2sh => self.0.network.p2sh_version(),
        };
        let mut data = Vec::with_capacity(1 + HASH_LEN);
        data.push(version);
        data.extend_from_slice(&self.0.hash);
        f.write_str(&bitcoin::base58::encode_check(&data))
    }
}

impl From<LegacyAddress> for String {
    fn from(address: LegacyAddress) -> Self {
        address.to_string()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct CashAddress(AddressPayload);

impl CashAddress {
    pub fn payload(&self) -> &AddressPayload {
        &self.0
    }
}

impl fmt::Display for CashAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.0.network.cash_prefix();
        // 160ビットハッシュのサイズコードは0
        let version = self.0.kind.type_bits() << 3;
        let mut raw = Vec::with_capacity(1 + HASH_LEN);
        raw.push(version);
        raw.extend_from_slice(&self.0.hash);
        let mut payload = convert_bits(&raw, 8, 5, true).ok_or(fmt::Error)?;
        let checksum = checksum(prefix, &payload);
        payload.extend_from_slice(&checksum);

        f.write_str(prefix)?;
        f.write_str(":")?;
        for d in payload {
            write!(f, "{}", CHARSET[d as usize] as char)?;
        }
        Ok(())
    }
}

impl From<CashAddress> for String {
    fn from(address: CashAddress) -> Self {
        address.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressValidation {
    pub valid: bool,
    pub network: Option<Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// いずれかの形式のアドレスをデコードする
pub fn decode(address: &str) -> Result<AddressPayload, WalletError> {
    let address = address.trim();
    if let Some(payload) = decode_cash(address) {
        return Ok(payload);
    }
    decode_legacy(address).ok_or_else(|| {
        WalletError::invalid_address(address, "レガシー形式でもキャッシュアドレス形式でもありません")
    })
}

pub fn to_legacy(address: &str) -> Result<LegacyAddress, WalletError> {
    decode(address).map(AddressPayload::to_legacy)
}

pub fn to_cash_format(address: &str) -> Result<CashAddress, WalletError> {
    decode(address).map(AddressPayload::to_cash)
}

pub fn is_cash_format(address: &str) -> bool {
    decode_cash(address.trim()).is_some()
}

/// 入力として受け付けるのはキャッシュアドレス形式のみ。
pub fn validate(address: &str) -> AddressValidation {
    match decode_cash(address.trim()) {
        Some(payload) => AddressValidation {
            valid: true,
            network: Some(payload.network),
            reason: None,
        },
        None => AddressValidation {
            valid: false,
            network: None,
            reason: Some(CASH_ONLY_REASON.to_string()),
        },
    }
}

fn decode_legacy(address: &str) -> Option<AddressPayload> {
    let data = bitcoin::base58::decode_check(address).ok()?;
    if data.len() != 1 + HASH_LEN {
        return None;
    }
    let (network, kind) = KNOWN_NETWORKS.iter().find_map(|&network| {
        if data[0] == network.p2pkh_version() {
            Some((network, AddressKind::P2pkh))
        } else if data[0] == network.p2sh_version() {
            Some((network, AddressKind::P2sh))
        } else {
            None
        }
    })?;
    let mut hash = [0u8; HASH_LEN];
    hash.copy_from_slice(&data[1..]);
    Some(AddressPayload { network, kind, hash })
}

fn decode_cash(address: &str) -> Option<AddressPayload> {
    let has_lower = address.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = address.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return None;
    }
    let address = address.to_ascii_lowercase();

    match address.split_once(':') {
        Some((prefix, body)) => {
            let network = KNOWN_NETWORKS
                .iter()
                .copied()
                .find(|n| n.cash_prefix() == prefix)?;
            decode_cash_body(network, body)
        }
        // プレフィックス省略時は既知のネットワークを順に試す
        None => KNOWN_NETWORKS
            .iter()
            .find_map(|&network| decode_cash_body(network, &address)),
    }
}

fn decode_cash_body(network: Network, body: &str) -> Option<AddressPayload> {
    if body.len() <= CHECKSUM_LEN {
        return None;
    }
    let mut values = Vec::with_capacity(body.len());
    for c in body.bytes() {
        let v = CHARSET.iter().position(|&x| x == c)?;
        values.push(v as u8);
    }

    let mut check = prefix_values(network.cash_prefix());
    check.extend_from_slice(&values);
    if polymod(&check) != 0 {
        return None;
    }

    let payload = &values[..values.len() - CHECKSUM_LEN];
    let raw = convert_bits(payload, 5, 8, false)?;
    let (version, hash_bytes) = raw.split_first()?;
    if version & 0x80 != 0 || version & 0x07 != 0 || hash_bytes.len() != HASH_LEN {
        return None;
    }
    let kind = match version >> 3 {
        0 => AddressKind::P2pkh,
        1 => AddressKind::P2sh,
        _ => return None,
    };
    let mut hash = [0u8; HASH_LEN];
    hash.copy_from_slice(hash_bytes);
    Some(AddressPayload { network, kind, hash })
}

/// プレフィックスの各文字の下位5ビットと区切りの0
fn prefix_values(prefix: &str) -> Vec<u8> {
    let mut values: Vec<u8> = prefix.bytes().map(|b| b & 0x1f).collect();
    values.push(0);
    values
}

fn checksum(prefix: &str, payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut values = prefix_values(prefix);
    values.extend_from_slice(payload);
    values.extend_from_slice(&[0u8; CHECKSUM_LEN]);
    let m = polymod(&values);
    let mut out = [0u8; CHECKSUM_LEN];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = ((m >> (5 * (CHECKSUM_LEN - 1 - i))) & 0x1f) as u8;
    }
    out
}

fn polymod(values: &[u8]) -> u64 {
    let mut c: u64 = 1;
    for &d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_ffff_ffff) << 5) ^ d as u64;
        if c0 & 0x01 != 0 {
            c ^= 0x98_f2bc_8e61;
        }
        if c0 & 0x02 != 0 {
            c ^= 0x79_b76d_99e2;
        }
        if c0 & 0x04 != 0 {
            c ^= 0xf3_3e5f_b3c4;
        }
        if c0 & 0x08 != 0 {
            c ^= 0xae_2eab_e2a8;
        }
        if c0 & 0x10 != 0 {
            c ^= 0x1e_4f43_e470;
        }
    }
    c ^ 1
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max_v: u32 = (1 << to) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for &value in data {
        let v = value as u32;
        if v >> from != 0 {
            return None;
        }
        acc = (acc << from) | v;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max_v) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max_v) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max_v) != 0 {
        return None;
    }
    Some(out)
}
