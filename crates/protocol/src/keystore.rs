//! RSA key material and the vendor block cipher.
//!
//! The partner private key signs outgoing envelopes and decrypts blocks addressed
//! to us; the counterparty public key verifies responses and encrypts the account
//! password.
//!
//! # Block format
//!
//! Plaintext is cut into chunks of `key_size - BLOCK_OVERHEAD` bytes. Each chunk is
//! encrypted with PKCS#1 v1.5, the ciphertext byte order is reversed, and the
//! result is base64 encoded (standard alphabet, padded). The encoded blocks are
//! concatenated without a separator.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};

use crate::error::{ProtocolError, Result};

/// Per-block overhead subtracted from the modulus size when chunking plaintext.
///
/// Larger than the 11 bytes PKCS#1 v1.5 actually needs. The counterparty expects
/// chunks of this size.
pub const BLOCK_OVERHEAD: usize = 42;

/// Key size used by [`KeyStore::generate_pem`] when none is given.
pub const DEFAULT_KEY_BITS: usize = 1024;

/// PEM encoded key pair produced by [`KeyStore::generate_pem`].
#[derive(Clone)]
pub struct KeyPairPem {
    /// PKCS#1 `RSA PRIVATE KEY` block.
    pub private_key: String,
    /// SPKI `PUBLIC KEY` block.
    pub public_key: String,
}

impl std::fmt::Debug for KeyPairPem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairPem")
            .field("private_key", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Holds the partner private key and the counterparty public key.
///
/// Immutable after construction, so one instance can be shared behind an `Arc`
/// by any number of concurrent calls.
#[derive(Clone)]
pub struct KeyStore {
    partner_private_key: RsaPrivateKey,
    counterparty_public_key: RsaPublicKey,
}

impl KeyStore {
    /// Creates a key store from already parsed keys.
    pub fn new(
        partner_private_key: RsaPrivateKey,
        counterparty_public_key: RsaPublicKey,
    ) -> Result<Self> {
        if counterparty_public_key.size() <= BLOCK_OVERHEAD {
            return Err(ProtocolError::Configuration(format!(
                "counterparty key of {} bytes is too small for {}-byte block overhead",
                counterparty_public_key.size(),
                BLOCK_OVERHEAD
            )));
        }

        Ok(Self {
            partner_private_key,
            counterparty_public_key,
        })
    }

    /// Parses a PKCS#1 DER private key and an SPKI DER public key.
    pub fn from_der(private_key_der: &[u8], public_key_der: &[u8]) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs1_der(private_key_der)
            .map_err(|e| ProtocolError::Configuration(format!("invalid private key: {}", e)))?;
        let public_key = RsaPublicKey::from_public_key_der(public_key_der)
            .map_err(|e| ProtocolError::Configuration(format!("invalid public key: {}", e)))?;

        Self::new(private_key, public_key)
    }

    /// Parses a PKCS#1 PEM private key and an SPKI PEM public key.
    pub fn from_pem(private_key_pem: &str, public_key_pem: &str) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(private_key_pem.trim())
            .map_err(|e| ProtocolError::Configuration(format!("invalid private key: {}", e)))?;
        let public_key = RsaPublicKey::from_public_key_pem(public_key_pem.trim())
            .map_err(|e| ProtocolError::Configuration(format!("invalid public key: {}", e)))?;

        Self::new(private_key, public_key)
    }

    /// Generates a fresh RSA key pair and returns it PEM encoded.
    pub fn generate_pem(bits: usize) -> Result<KeyPairPem> {
        let key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| ProtocolError::Configuration(format!("key generation failed: {}", e)))?;

        let private_key = key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| ProtocolError::Configuration(format!("private key encoding: {}", e)))?;
        let public_key = key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| ProtocolError::Configuration(format!("public key encoding: {}", e)))?;

        Ok(KeyPairPem {
            private_key: private_key.as_str().to_owned(),
            public_key,
        })
    }

    /// Size of the counterparty modulus in bytes.
    pub fn key_size(&self) -> usize {
        self.counterparty_public_key.size()
    }

    /// Largest plaintext chunk carried by one encrypted block.
    pub fn max_chunk(&self) -> usize {
        self.key_size() - BLOCK_OVERHEAD
    }

    /// Length of one base64 block produced by the partner key.
    pub fn encoded_block_size(&self) -> usize {
        encoded_len(self.partner_private_key.size())
    }

    /// Signs `data` with SHA-1 / PKCS#1 v1.5 using the partner private key.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha1::digest(data);
        self.partner_private_key
            .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha1>(), &digest)
            .map_err(|e| ProtocolError::Signing(e.to_string()))
    }

    /// Verifies a SHA-1 / PKCS#1 v1.5 signature made by the counterparty.
    ///
    /// Every failure collapses into [`ProtocolError::Verification`].
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let digest = Sha1::digest(data);
        self.counterparty_public_key
            .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, signature)
            .map_err(|_| ProtocolError::Verification)
    }

    /// Encrypts `msg` for the counterparty using the chunked, byte-reversed format.
    ///
    /// The loop runs `len / max_chunk + 1` times, so a message whose length is an
    /// exact multiple of the chunk size (zero included) ends with a block that
    /// encrypts an empty chunk.
    pub fn encrypt_block(&self, msg: &[u8]) -> Result<String> {
        let max_chunk = self.max_chunk();
        let iterations = msg.len() / max_chunk + 1;

        let mut output = String::with_capacity(iterations * encoded_len(self.key_size()));
        for i in 0..iterations {
            let start = i * max_chunk;
            let end = msg.len().min(start + max_chunk);
            let chunk = &msg[start..end];

            let mut ciphertext = self
                .counterparty_public_key
                .encrypt(&mut OsRng, Pkcs1v15Encrypt, chunk)
                .map_err(|e| ProtocolError::Encryption(e.to_string()))?;
            ciphertext.reverse();

            STANDARD.encode_string(&ciphertext, &mut output);
        }

        Ok(output)
    }

    /// Decrypts the output of [`KeyStore::encrypt_block`] with the partner private key.
    ///
    /// Reads `len / block` whole base64 blocks; a shorter tail is ignored.
    pub fn decrypt_block(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let block_size = self.encoded_block_size();
        let iterations = msg.len() / block_size;

        let mut plaintext = Vec::with_capacity(iterations * self.partner_private_key.size());
        for block in msg.chunks_exact(block_size) {
            let mut ciphertext = STANDARD
                .decode(block)
                .map_err(|e| ProtocolError::Decryption(format!("invalid base64 block: {}", e)))?;
            ciphertext.reverse();

            let chunk = self
                .partner_private_key
                .decrypt_blinded(&mut OsRng, Pkcs1v15Encrypt, &ciphertext)
                .map_err(|e| ProtocolError::Decryption(e.to_string()))?;
            plaintext.extend_from_slice(&chunk);
        }

        Ok(plaintext)
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("key_size", &self.key_size())
            .field("partner_private_key", &"[REDACTED]")
            .finish()
    }
}

/// Padded base64 length of `n` input bytes.
fn encoded_len(n: usize) -> usize {
    n.div_ceil(3) * 4
}
