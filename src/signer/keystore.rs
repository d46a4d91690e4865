//! Encrypted keystore file unlocked with an operator passphrase
//!
//! The key is decrypted only inside [`PassphraseKeystore::sign`] and dropped
//! before it returns; the passphrase is wiped when the keystore is dropped.

use super::{SigningBackend, SigningRequest};
use crate::error::{AirgapError, AirgapResult};
use crate::tx::record::normalize_recovery_id;
use crate::tx::Signature;

use async_trait::async_trait;
use ethers::signers::LocalWallet;
use ethers::types::H256;
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::Zeroizing;

/// Signing backend backed by a Web3 Secret Storage keystore
pub struct PassphraseKeystore {
    path: PathBuf,
    passphrase: Zeroizing<String>,
}

impl PassphraseKeystore {
    pub fn new(path: impl Into<PathBuf>, passphrase: Zeroizing<String>) -> Self {
        Self {
            path: path.into(),
            passphrase,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the file is present and is a keystore document
    fn check_key_material(&self) -> AirgapResult<()> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            AirgapError::Signing(format!(
                "missing key material at {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let document: serde_json::Value = serde_json::from_str(&contents).map_err(|e| {
            AirgapError::Signing(format!("{} is not a keystore: {}", self.path.display(), e))
        })?;
        if document.get("crypto").or_else(|| document.get("Crypto")).is_none() {
            return Err(AirgapError::Signing(format!(
                "{} has no crypto section",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Run the slow key derivation off the async runtime
    async fn unlock(&self) -> AirgapResult<LocalWallet> {
        self.check_key_material()?;
        info!("Applying key derivation function, this takes a moment");

        let path = self.path.clone();
        let passphrase = self.passphrase.clone();
        tokio::task::spawn_blocking(move || LocalWallet::decrypt_keystore(&path, passphrase.as_bytes()))
            .await
            .map_err(|e| AirgapError::Signing(format!("key derivation task failed: {}", e)))?
            .map_err(|e| AirgapError::AuthenticationFailed(format!("cannot decrypt keystore: {}", e)))
    }
}

#[async_trait]
impl SigningBackend for PassphraseKeystore {
    async fn sign(&self, request: &SigningRequest<'_>) -> AirgapResult<Signature> {
        let wallet = self.unlock().await?;
        let signature = wallet
            .sign_hash(H256::from(request.digest))
            .map_err(|e| AirgapError::Signing(e.to_string()))?;
        drop(wallet);

        let recovery_id = normalize_recovery_id(signature.v).ok_or_else(|| {
            AirgapError::Signing(format!("unexpected recovery value {}", signature.v))
        })?;
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        signature.r.to_big_endian(&mut r);
        signature.s.to_big_endian(&mut s);

        Signature::new(recovery_id, r, s)
    }
}
