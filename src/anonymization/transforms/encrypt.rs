//! AES-CBC encryption
//!
//! Output layout is `IV (16 bytes) || ciphertext`, base64-encoded in the
//! tree. A fresh random IV is drawn for every value.

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use zeroize::Zeroizing;

use super::Outcome;
use crate::anonymization::context::OperationKind;
use crate::domain::{CryptoError, NodeId, RecordTree, Result, Scalar, VeilError};

const IV_LEN: usize = 16;

/// AES key material
#[derive(Clone)]
pub struct EncryptSettings {
    key: Zeroizing<Vec<u8>>,
}

impl EncryptSettings {
    /// Uses the UTF-8 bytes of `key`, which must be 16, 24 or 32 bytes long
    pub fn new(key: &str) -> Result<Self> {
        check_key(key.as_bytes())?;
        Ok(Self {
            key: Zeroizing::new(key.as_bytes().to_vec()),
        })
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl std::fmt::Debug for EncryptSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptSettings")
            .field("key_bits", &(self.key.len() * 8))
            .finish()
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    match key.len() {
        16 | 24 | 32 => Ok(()),
        n => Err(CryptoError::InvalidKeySize(n * 8).into()),
    }
}

fn encrypt_error(e: impl std::fmt::Display) -> VeilError {
    CryptoError::Encrypt(e.to_string()).into()
}

fn decrypt_error(e: impl std::fmt::Display) -> VeilError {
    CryptoError::Decrypt(e.to_string()).into()
}

/// Encrypts `plaintext`, returning `IV || ciphertext`
pub fn encrypt_bytes(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, &iv)
            .map_err(encrypt_error)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, &iv)
            .map_err(encrypt_error)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, &iv)
            .map_err(encrypt_error)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        n => return Err(CryptoError::InvalidKeySize(n * 8).into()),
    };

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverses [`encrypt_bytes`]
///
/// # Errors
///
/// [`VeilError::Format`] when `data` is shorter than the IV,
/// [`CryptoError::Decrypt`] when the padding does not check out.
pub fn decrypt_bytes(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < IV_LEN {
        return Err(VeilError::format(format!(
            "ciphertext is {} bytes, shorter than the {IV_LEN}-byte IV",
            data.len()
        )));
    }
    let (iv, ciphertext) = data.split_at(IV_LEN);

    match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(decrypt_error)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(decrypt_error),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(decrypt_error)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(decrypt_error),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(decrypt_error)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(decrypt_error),
        n => Err(CryptoError::InvalidKeySize(n * 8).into()),
    }
}

/// Encrypts text into base64
pub fn encrypt_text(settings: &EncryptSettings, text: &str) -> Result<String> {
    Ok(STANDARD.encode(encrypt_bytes(settings.key(), text.as_bytes())?))
}

/// Decrypts base64 produced by [`encrypt_text`]
pub fn decrypt_text(settings: &EncryptSettings, encoded: &str) -> Result<String> {
    let data = STANDARD
        .decode(encoded.trim())
        .map_err(|e| VeilError::format(format!("invalid base64 ciphertext: {e}")))?;
    let plain = decrypt_bytes(settings.key(), &data)?;
    String::from_utf8(plain)
        .map_err(|e| VeilError::format(format!("decrypted value is not UTF-8: {e}")))
}

/// Encrypts one node's value
pub fn encrypt(tree: &mut RecordTree, node: NodeId, settings: &EncryptSettings) -> Result<Outcome> {
    let Some(value) = tree.value(node) else {
        return Ok(Outcome::unchanged());
    };
    let encrypted = encrypt_text(settings, &value.to_text())?;
    tree.set_value(node, Some(Scalar::String(encrypted)));
    Ok(Outcome::changed(OperationKind::Encrypted))
}
