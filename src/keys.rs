//! 鍵導出バックエンド。
//!
//! トランザクション構築・手数料・ブロードキャストの処理はこのトレイトに対してのみ書かれ、
//! 鍵素材の形式 (WIF / BIP32拡張鍵) の違いはバックエンド側で吸収する。

use std::str::FromStr;

use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::{All, Message, Secp256k1, ecdsa};
use bitcoin::{PrivateKey, PublicKey};

use crate::address::{AddressPayload, CashAddress};
use crate::config::Network;
use crate::error::WalletError;

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    pub fn address_payload(&self, network: Network) -> AddressPayload {
        AddressPayload::p2pkh(network, self.public_key.pubkey_hash())
    }
}

pub trait KeyBackend: Send + Sync {
    /// バックエンドが受け取る鍵素材 (WIF文字列、xprv文字列など)
    type Material: ?Sized + Sync;

    fn network(&self) -> Network;

    fn derive_key_pair(&self, material: &Self::Material) -> Result<KeyPair, WalletError>;

    fn sign(&self, key: &KeyPair, digest: [u8; 32]) -> Result<ecdsa::Signature, WalletError>;

    fn to_address(&self, key: &KeyPair) -> CashAddress {
        key.address_payload(self.network()).to_cash()
    }
}

/// WIF形式の秘密鍵をそのまま使うバックエンド
#[derive(Debug, Clone)]
pub struct WifBackend {
    secp: Secp256k1<All>,
    network: Network,
}

impl WifBackend {
    pub fn new(network: Network) -> Self {
        WifBackend {
            secp: Secp256k1::new(),
            network,
        }
    }
}

impl KeyBackend for WifBackend {
    type Material = str;

    fn network(&self) -> Network {
        self.network
    }

    fn derive_key_pair(&self, wif: &str) -> Result<KeyPair, WalletError> {
        let private_key = PrivateKey::from_wif(wif.trim())
            .map_err(|e| WalletError::InvalidKeyMaterial(format!("WIFのデコードに失敗: {}", e)))?;
        ensure_network(self.network, private_key.network)?;
        let public_key = private_key.public_key(&self.secp);
        Ok(KeyPair {
            private_key,
            public_key,
        })
    }

    fn sign(&self, key: &KeyPair, digest: [u8; 32]) -> Result<ecdsa::Signature, WalletError> {
        sign_digest(&self.secp, key, digest)
    }
}

/// BIP32拡張秘密鍵 (xprv/tprv) から固定パスで子鍵を導出するバックエンド
#[derive(Debug, Clone)]
pub struct Bip32Backend {
    secp: Secp256k1<All>,
    network: Network,
    path: DerivationPath,
}

impl Bip32Backend {
    pub fn new(network: Network, path: DerivationPath) -> Self {
        Bip32Backend {
            secp: Secp256k1::new(),
            network,
            path,
        }
    }

    pub fn with_path_str(network: Network, path: &str) -> Result<Self, WalletError> {
        let path = DerivationPath::from_str(path).map_err(|e| {
            WalletError::InvalidKeyMaterial(format!("無効な導出パス ({}): {}", path, e))
        })?;
        Ok(Self::new(network, path))
    }

    pub fn path(&self) -> &DerivationPath {
        &self.path
    }
}

impl KeyBackend for Bip32Backend {
    type Material = str;

    fn network(&self) -> Network {
        self.network
    }

    fn derive_key_pair(&self, xprv: &str) -> Result<KeyPair, WalletError> {
        let master = Xpriv::from_str(xprv.trim())
            .map_err(|e| WalletError::InvalidKeyMaterial(format!("拡張秘密鍵のデコードに失敗: {}", e)))?;
        ensure_network(self.network, master.network)?;
        let child = master
            .derive_priv(&self.secp, &self.path)
            .map_err(|e| WalletError::InvalidKeyMaterial(format!("子鍵の導出に失敗 ({}): {}", self.path, e)))?;
        let private_key = child.to_priv();
        let public_key = private_key.public_key(&self.secp);
        log::debug!("BIP32導出完了: path={}", self.path);
        Ok(KeyPair {
            private_key,
            public_key,
        })
    }

    fn sign(&self, key: &KeyPair, digest: [u8; 32]) -> Result<ecdsa::Signature, WalletError> {
        sign_digest(&self.secp, key, digest)
    }
}

fn ensure_network(expected: Network, actual: bitcoin::NetworkKind) -> Result<(), WalletError> {
    if expected.kind() != actual {
        return Err(WalletError::InvalidKeyMaterial(format!(
            "ネットワーク不整合: 設定 ({}) vs 鍵 ({:?})",
            expected, actual
        )));
    }
    Ok(())
}

fn sign_digest(
    secp: &Secp256k1<All>,
    key: &KeyPair,
    digest: [u8; 32],
) -> Result<ecdsa::Signature, WalletError> {
    let message = Message::from_digest(digest);
    let signature = secp.sign_ecdsa(&message, &key.private_key.inner);
    secp.verify_ecdsa(&message, &signature, &key.public_key.inner)
        .map_err(|e| WalletError::InvalidKeyMaterial(format!("署名の検証に失敗: {}", e)))?;
    Ok(signature)
}
