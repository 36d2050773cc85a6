//! Credential vault — AES-256-CFB with a PBKDF2-HMAC-SHA256 KDF.
//!
//! The key for an encrypted provider is derived from a fixed passphrase
//! and a 16-byte salt kept next to the ciphertext. The derived key is
//! never persisted and is zeroized when dropped.
//!
//! CFB carries no authentication tag: a wrong passphrase or salt usually
//! shows up as invalid UTF-8, but is not guaranteed to.

pub mod store;

use std::path::PathBuf;

use cfb_mode::cipher::{generic_array::GenericArray, AsyncStreamCipher, KeyIvInit};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Passphrase the provisioned artifacts were sealed with.
///
/// Anyone holding the binary can derive the key; the vault only keeps
/// the secret off disk in plain text.
pub const EMBEDDED_PASSPHRASE: &str = "asoulbella";

pub type Salt = [u8; SALT_LEN];

type Aes256CfbEnc = cfb_mode::Encryptor<aes::Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<aes::Aes256>;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decryption failed: {0}")]
    Decoding(String),
}

/// Derive a 256-bit key from a passphrase and salt using PBKDF2-HMAC-SHA256.
pub fn derive_key(passphrase: &str, salt: &Salt) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut *key);
    key
}

/// Fresh random salt for provisioning a new key file.
pub fn generate_salt() -> Salt {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Encrypt text with AES-256-CFB under a random IV.
/// Returns: iv (16) || ciphertext
pub fn encrypt(plaintext: &str, key: &[u8; KEY_LEN]) -> Vec<u8> {
    encrypt_bytes(plaintext.as_bytes(), key)
}

pub fn encrypt_bytes(plaintext: &[u8], key: &[u8; KEY_LEN]) -> Vec<u8> {
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let mut out = Vec::with_capacity(IV_LEN + plaintext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(plaintext);

    Aes256CfbEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(&iv))
        .encrypt(&mut out[IV_LEN..]);
    out
}

/// Decrypt `iv || ciphertext` without interpreting the result.
pub fn decrypt_bytes(
    encrypted: &[u8],
    key: &[u8; KEY_LEN],
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    if encrypted.len() < IV_LEN {
        return Err(VaultError::Decoding(format!(
            "ciphertext is {} bytes, shorter than the {IV_LEN}-byte IV",
            encrypted.len()
        )));
    }

    let (iv, ciphertext) = encrypted.split_at(IV_LEN);
    let mut buf = Zeroizing::new(ciphertext.to_vec());
    Aes256CfbDec::new(GenericArray::from_slice(key), GenericArray::from_slice(iv))
        .decrypt(buf.as_mut_slice());
    Ok(buf)
}

/// Decrypt ciphertext produced by `encrypt` and decode it as UTF-8.
pub fn decrypt(encrypted: &[u8], key: &[u8; KEY_LEN]) -> Result<String, VaultError> {
    let plaintext = decrypt_bytes(encrypted, key)?;
    std::str::from_utf8(&plaintext)
        .map(str::to_owned)
        .map_err(|_| VaultError::Decoding("plaintext is not valid UTF-8 (wrong passphrase or salt?)".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = derive_key("test-passphrase-do-not-use", &[7u8; SALT_LEN]);
        let long = "x".repeat(1000);
        for plaintext in ["sk-0123456789abcdef", "", "多字节 ключ 🔑", long.as_str()] {
            let encrypted = encrypt(plaintext, &key);
            assert_eq!(encrypted.len(), IV_LEN + plaintext.len());
            assert_eq!(decrypt(&encrypted, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_known_passphrase_zero_salt() {
        let key = derive_key(EMBEDDED_PASSPHRASE, &[0u8; SALT_LEN]);
        let encrypted = encrypt("sk-test-1234", &key);
        assert_eq!(decrypt(&encrypted, &key).unwrap(), "sk-test-1234");
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let salt = [0x5au8; SALT_LEN];
        let k1 = derive_key("hunter2", &salt);
        let k2 = derive_key("hunter2", &salt);
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn test_derive_key_sensitivity() {
        let salt = [0u8; SALT_LEN];
        let base = derive_key(EMBEDDED_PASSPHRASE, &salt);

        let mut flipped = salt;
        flipped[SALT_LEN - 1] ^= 0x01;
        assert_ne!(*base, *derive_key(EMBEDDED_PASSPHRASE, &flipped));
        assert_ne!(*base, *derive_key("asoulbellb", &salt));
    }

    #[test]
    fn test_wrong_key_never_yields_original() {
        let salt = [0u8; SALT_LEN];
        let key = derive_key(EMBEDDED_PASSPHRASE, &salt);
        let encrypted = encrypt("sk-test-1234", &key);

        let mut other_salt = salt;
        other_salt[0] ^= 0x80;
        for wrong in [derive_key("wrong", &salt), derive_key(EMBEDDED_PASSPHRASE, &other_salt)] {
            match decrypt(&encrypted, &wrong) {
                Ok(text) => assert_ne!(text, "sk-test-1234"),
                Err(e) => assert!(matches!(e, VaultError::Decoding(_))),
            }
        }
    }

    #[test]
    fn test_different_encryptions_differ() {
        let key = derive_key("same-pass", &[1u8; SALT_LEN]);
        let e1 = encrypt("same-key", &key);
        let e2 = encrypt("same-key", &key);
        // Fresh IV each time
        assert_ne!(e1, e2);
        assert_eq!(decrypt(&e1, &key).unwrap(), "same-key");
        assert_eq!(decrypt(&e2, &key).unwrap(), "same-key");
    }

    #[test]
    fn test_invalid_utf8_is_decoding_error() {
        let key = derive_key("pass", &[2u8; SALT_LEN]);
        let encrypted = encrypt_bytes(&[0xff, 0xfe, 0xfd], &key);
        assert!(matches!(decrypt(&encrypted, &key), Err(VaultError::Decoding(_))));
    }

    #[test]
    fn test_truncated_ciphertext_is_decoding_error() {
        let key = derive_key("pass", &[3u8; SALT_LEN]);
        let err = decrypt(&[0u8; IV_LEN - 1], &key).unwrap_err();
        assert!(matches!(err, VaultError::Decoding(_)));
        // IV only: empty plaintext
        assert_eq!(decrypt(&[0u8; IV_LEN], &key).unwrap(), "");
    }

    #[test]
    fn test_cfb128_aes256_known_answer() {
        // NIST SP 800-38A, F.3.14 CFB128-AES256.Decrypt, block 1
        let key: [u8; KEY_LEN] =
            hex::decode("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4")
                .unwrap()
                .try_into()
                .unwrap();
        let mut input = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        input.extend(hex::decode("dc7e84bfda79164b7ecd8486985d3860").unwrap());

        let plaintext = decrypt_bytes(&input, &key).unwrap();
        assert_eq!(hex::encode(&*plaintext), "6bc1bee22e409f96e93d7e117393172a");
    }
}
