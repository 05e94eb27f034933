//! Crypto interface.
//!
//! This module is the only bridge to the crypto library. It exposes three
//! opaque contexts, each created from algorithm names, then configured with
//! directional keys, then used to encrypt and decrypt whole buffers:
//!
//! * [`AeadContext`]: AEAD with a nonce made of the packet id followed by an
//!   implicit IV. Output is `tag | ciphertext`.
//! * [`CbcContext`]: optional CBC encryption followed by an HMAC over
//!   `iv | ciphertext`. Output is `hmac | iv | ciphertext`, or `hmac | plaintext`
//!   when no cipher is configured.
//! * [`CtrContext`]: the tls-crypt construction. The tag is an HMAC over
//!   `ad | plaintext` and its first 16 bytes are the CTR IV. Output is
//!   `tag | ciphertext`.

use core::{
    fmt::{Debug, Formatter},
    str::FromStr,
};

use aws_lc_rs::{
    aead::{Aad, AES_128_GCM, AES_256_GCM, CHACHA20_POLY1305, LessSafeKey, Nonce, UnboundKey},
    cipher::{
        AES_128, AES_256, DecryptingKey, DecryptionContext, EncryptingKey, EncryptionContext,
        PaddedBlockDecryptingKey, PaddedBlockEncryptingKey, UnboundCipherKey,
    },
    hmac,
    iv::FixedLength,
};
use rand::{TryRngCore, rngs::OsRng};
use tracing::debug;
use zeroize::Zeroize;

use crate::{
    error::{ControlChannelError, DataPathError, Error},
    keys::{CryptoKeys, SecretBytes},
};

/// Cipher algorithms understood by the crypto contexts.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum CipherAlgorithm {
    /// AES-128 in GCM mode with 128-bit tags and 96 bit nonces.
    Aes128Gcm,

    /// AES-256 in GCM mode with 128-bit tags and 96 bit nonces.
    Aes256Gcm,

    /// ChaCha20-Poly1305-IETF with 128-bit tags and 96 bit nonces.
    ChaCha20Poly1305,

    /// AES-128 in CBC mode with PKCS#7 padding.
    Aes128Cbc,

    /// AES-256 in CBC mode with PKCS#7 padding.
    Aes256Cbc,

    /// AES-256 in CTR mode, used by tls-crypt.
    Aes256Ctr,
}

impl CipherAlgorithm {
    /// The canonical OpenVPN name of the cipher.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::Aes128Gcm => "AES-128-GCM",
            CipherAlgorithm::Aes256Gcm => "AES-256-GCM",
            CipherAlgorithm::ChaCha20Poly1305 => "CHACHA20-POLY1305",
            CipherAlgorithm::Aes128Cbc => "AES-128-CBC",
            CipherAlgorithm::Aes256Cbc => "AES-256-CBC",
            CipherAlgorithm::Aes256Ctr => "AES-256-CTR",
        }
    }

    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            CipherAlgorithm::Aes128Gcm | CipherAlgorithm::Aes128Cbc => 16,
            CipherAlgorithm::Aes256Gcm
            | CipherAlgorithm::ChaCha20Poly1305
            | CipherAlgorithm::Aes256Cbc
            | CipherAlgorithm::Aes256Ctr => 32,
        }
    }

    /// IV (or nonce) length in bytes.
    pub fn iv_len(&self) -> usize {
        match self {
            CipherAlgorithm::Aes128Gcm
            | CipherAlgorithm::Aes256Gcm
            | CipherAlgorithm::ChaCha20Poly1305 => 12,
            CipherAlgorithm::Aes128Cbc
            | CipherAlgorithm::Aes256Cbc
            | CipherAlgorithm::Aes256Ctr => 16,
        }
    }

    /// Returns `true` for authenticated ciphers.
    pub fn is_aead(&self) -> bool {
        matches!(
            self,
            CipherAlgorithm::Aes128Gcm
                | CipherAlgorithm::Aes256Gcm
                | CipherAlgorithm::ChaCha20Poly1305
        )
    }
}

impl FromStr for CipherAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AES-128-GCM" => Ok(CipherAlgorithm::Aes128Gcm),
            "AES-256-GCM" => Ok(CipherAlgorithm::Aes256Gcm),
            "CHACHA20-POLY1305" => Ok(CipherAlgorithm::ChaCha20Poly1305),
            "AES-128-CBC" => Ok(CipherAlgorithm::Aes128Cbc),
            "AES-256-CBC" => Ok(CipherAlgorithm::Aes256Cbc),
            "AES-256-CTR" => Ok(CipherAlgorithm::Aes256Ctr),
            _ => Err(Error::Algorithm(s.to_owned())),
        }
    }
}

/// HMAC digest algorithms.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum Digest {
    /// SHA-1, the OpenVPN default for tls-auth and legacy data channels.
    #[default]
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl Digest {
    /// The canonical OpenVPN name of the digest.
    pub fn name(&self) -> &'static str {
        match self {
            Digest::Sha1 => "SHA1",
            Digest::Sha256 => "SHA256",
            Digest::Sha384 => "SHA384",
            Digest::Sha512 => "SHA512",
        }
    }

    /// Digest output length in bytes. This is also the HMAC key length.
    pub fn output_len(&self) -> usize {
        match self {
            Digest::Sha1 => 20,
            Digest::Sha256 => 32,
            Digest::Sha384 => 48,
            Digest::Sha512 => 64,
        }
    }

    fn hmac_algorithm(&self) -> hmac::Algorithm {
        match self {
            Digest::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Digest::Sha256 => hmac::HMAC_SHA256,
            Digest::Sha384 => hmac::HMAC_SHA384,
            Digest::Sha512 => hmac::HMAC_SHA512,
        }
    }

    fn hmac_key(&self, key: &SecretBytes) -> Result<hmac::Key, Error> {
        if key.len() < self.output_len() {
            return Err(Error::Creation);
        }
        Ok(hmac::Key::new(
            self.hmac_algorithm(),
            &key.as_bytes()[..self.output_len()],
        ))
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA1" => Ok(Digest::Sha1),
            "SHA256" => Ok(Digest::Sha256),
            "SHA384" => Ok(Digest::Sha384),
            "SHA512" => Ok(Digest::Sha512),
            _ => Err(Error::Algorithm(s.to_owned())),
        }
    }
}

/// Per-call inputs besides the payload.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct CryptoFlags<'a> {
    /// Explicit part of the nonce (AEAD only).
    pub(crate) iv: &'a [u8],
    /// Associated data (AEAD and CTR).
    pub(crate) ad: &'a [u8],
}

/// Failure reported by a crypto context.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum CryptoError {
    /// Tag or HMAC mismatch.
    Authentication,
    /// Input shorter than the construction overhead.
    Malformed,
    /// The context is not configured for this direction, or the library failed.
    Failure,
}

impl From<CryptoError> for DataPathError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Authentication => DataPathError::AuthenticationFailed,
            CryptoError::Malformed => DataPathError::Malformed,
            CryptoError::Failure => DataPathError::Crypto,
        }
    }
}

impl From<CryptoError> for ControlChannelError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Authentication => ControlChannelError::AuthenticationFailed,
            CryptoError::Malformed => ControlChannelError::MissingAdAndTag,
            CryptoError::Failure => ControlChannelError::Crypto,
        }
    }
}

fn cipher_key_bytes<'a>(
    cipher: CipherAlgorithm,
    key: Option<&'a SecretBytes>,
) -> Result<&'a [u8], Error> {
    match key {
        Some(key) if key.len() >= cipher.key_len() => Ok(&key.as_bytes()[..cipher.key_len()]),
        _ => Err(Error::Creation),
    }
}

fn unbound_block_key(cipher: CipherAlgorithm, key: &[u8]) -> Result<UnboundCipherKey, Error> {
    let algorithm = match cipher {
        CipherAlgorithm::Aes128Cbc => &AES_128,
        CipherAlgorithm::Aes256Cbc | CipherAlgorithm::Aes256Ctr => &AES_256,
        _ => return Err(Error::Algorithm(cipher.name().to_owned())),
    };
    UnboundCipherKey::new(algorithm, key).map_err(|_| Error::Creation)
}

fn iv128(bytes: &[u8]) -> Result<FixedLength<16>, CryptoError> {
    let iv: [u8; 16] = bytes
        .get(..16)
        .and_then(|b| b.try_into().ok())
        .ok_or(CryptoError::Malformed)?;
    Ok(FixedLength::from(iv))
}

// MARK: AEAD

const AEAD_NONCE_LEN: usize = 12;
const AEAD_TAG_LEN: usize = 16;

struct AeadKey {
    key: LessSafeKey,
    nonce: [u8; AEAD_NONCE_LEN],
}

impl AeadKey {
    fn new(cipher: CipherAlgorithm, key: &[u8], hmac_key: &[u8], id_len: usize) -> Result<Self, Error> {
        let algorithm = match cipher {
            CipherAlgorithm::Aes128Gcm => &AES_128_GCM,
            CipherAlgorithm::Aes256Gcm => &AES_256_GCM,
            CipherAlgorithm::ChaCha20Poly1305 => &CHACHA20_POLY1305,
            _ => return Err(Error::Algorithm(cipher.name().to_owned())),
        };
        let implicit_len = AEAD_NONCE_LEN - id_len;
        if hmac_key.len() < implicit_len {
            return Err(Error::Creation);
        }
        let mut nonce = [0u8; AEAD_NONCE_LEN];
        nonce[id_len..].copy_from_slice(&hmac_key[..implicit_len]);
        Ok(Self {
            key: LessSafeKey::new(UnboundKey::new(algorithm, key).map_err(|_| Error::Creation)?),
            nonce,
        })
    }

    fn nonce(&self, iv: &[u8]) -> Nonce {
        let mut nonce = self.nonce;
        let n = iv.len().min(AEAD_NONCE_LEN);
        nonce[..n].copy_from_slice(&iv[..n]);
        Nonce::assume_unique_for_key(nonce)
    }
}

impl Drop for AeadKey {
    fn drop(&mut self) {
        self.nonce.zeroize();
    }
}

/// AEAD context with an OpenVPN-style nonce.
pub(crate) struct AeadContext {
    cipher: CipherAlgorithm,
    tag_len: usize,
    id_len: usize,
    encrypter: Option<AeadKey>,
    decrypter: Option<AeadKey>,
}

impl AeadContext {
    /// Creates an unconfigured context.
    ///
    /// `id_len` is the length of the explicit nonce part (the packet id), the
    /// rest of the nonce is taken from the HMAC key at configuration time.
    pub(crate) fn create(cipher: CipherAlgorithm, tag_len: usize, id_len: usize) -> Result<Self, Error> {
        if !cipher.is_aead() {
            return Err(Error::Algorithm(cipher.name().to_owned()));
        }
        if tag_len != AEAD_TAG_LEN || id_len >= AEAD_NONCE_LEN {
            return Err(Error::Creation);
        }
        Ok(Self {
            cipher,
            tag_len,
            id_len,
            encrypter: None,
            decrypter: None,
        })
    }

    /// Creates a context configured for both directions.
    pub(crate) fn with_keys(
        cipher: CipherAlgorithm,
        tag_len: usize,
        id_len: usize,
        keys: &CryptoKeys,
    ) -> Result<Self, Error> {
        let mut ctx = Self::create(cipher, tag_len, id_len)?;
        let cipher_keys = keys.cipher.as_ref().ok_or(Error::Creation)?;
        ctx.configure_encryption(&cipher_keys.encryption_key, &keys.hmac.encryption_key)?;
        ctx.configure_decryption(&cipher_keys.decryption_key, &keys.hmac.decryption_key)?;
        Ok(ctx)
    }

    pub(crate) fn configure_encryption(
        &mut self,
        cipher_key: &SecretBytes,
        hmac_key: &SecretBytes,
    ) -> Result<(), Error> {
        let key = cipher_key_bytes(self.cipher, Some(cipher_key))?;
        self.encrypter = Some(AeadKey::new(self.cipher, key, hmac_key.as_bytes(), self.id_len)?);
        debug!(
            cipher = self.cipher.name(),
            key_len = key.len(),
            key = %cipher_key.fingerprint(),
            "AEAD encryption configured"
        );
        Ok(())
    }

    pub(crate) fn configure_decryption(
        &mut self,
        cipher_key: &SecretBytes,
        hmac_key: &SecretBytes,
    ) -> Result<(), Error> {
        let key = cipher_key_bytes(self.cipher, Some(cipher_key))?;
        self.decrypter = Some(AeadKey::new(self.cipher, key, hmac_key.as_bytes(), self.id_len)?);
        debug!(
            cipher = self.cipher.name(),
            key_len = key.len(),
            key = %cipher_key.fingerprint(),
            "AEAD decryption configured"
        );
        Ok(())
    }

    pub(crate) fn tag_len(&self) -> usize {
        self.tag_len
    }

    pub(crate) fn encryption_capacity(&self, len: usize) -> usize {
        len + self.tag_len
    }

    /// Appends `tag | ciphertext` to `dst`.
    pub(crate) fn encrypt(
        &self,
        src: &[u8],
        dst: &mut Vec<u8>,
        flags: &CryptoFlags<'_>,
    ) -> Result<(), CryptoError> {
        let key = self.encrypter.as_ref().ok_or(CryptoError::Failure)?;
        let start = dst.len();
        dst.resize(start + self.tag_len, 0);
        dst.extend_from_slice(src);
        let sealed = key.key.seal_in_place_separate_tag(
            key.nonce(flags.iv),
            Aad::from(flags.ad),
            &mut dst[start + self.tag_len..],
        );
        match sealed {
            Ok(tag) => {
                dst[start..start + self.tag_len].copy_from_slice(tag.as_ref());
                Ok(())
            }
            Err(_) => {
                dst.truncate(start);
                Err(CryptoError::Failure)
            }
        }
    }

    /// Appends the plaintext of `src = tag | ciphertext` to `dst`.
    pub(crate) fn decrypt(
        &self,
        src: &[u8],
        dst: &mut Vec<u8>,
        flags: &CryptoFlags<'_>,
    ) -> Result<(), CryptoError> {
        let key = self.decrypter.as_ref().ok_or(CryptoError::Failure)?;
        if src.len() < self.tag_len {
            return Err(CryptoError::Malformed);
        }
        // the library expects `ciphertext | tag`
        let (tag, ciphertext) = src.split_at(self.tag_len);
        let start = dst.len();
        dst.extend_from_slice(ciphertext);
        dst.extend_from_slice(tag);
        let opened = key
            .key
            .open_in_place(key.nonce(flags.iv), Aad::from(flags.ad), &mut dst[start..])
            .map(|plaintext| plaintext.len());
        match opened {
            Ok(len) => {
                dst.truncate(start + len);
                Ok(())
            }
            Err(_) => {
                dst[start..].zeroize();
                dst.truncate(start);
                Err(CryptoError::Authentication)
            }
        }
    }
}

impl Debug for AeadContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadContext")
            .field("cipher", &self.cipher)
            .field("tag_len", &self.tag_len)
            .field("id_len", &self.id_len)
            .field("encrypter", &self.encrypter.is_some())
            .field("decrypter", &self.decrypter.is_some())
            .finish()
    }
}

// MARK: CBC + HMAC

struct CbcEncrypter {
    cipher: Option<PaddedBlockEncryptingKey>,
    hmac: hmac::Key,
}

struct CbcDecrypter {
    cipher: Option<PaddedBlockDecryptingKey>,
    hmac: hmac::Key,
}

/// CBC + HMAC context. The cipher is optional.
pub(crate) struct CbcContext {
    cipher: Option<CipherAlgorithm>,
    digest: Digest,
    encrypter: Option<CbcEncrypter>,
    decrypter: Option<CbcDecrypter>,
}

impl CbcContext {
    pub(crate) fn create(cipher: Option<CipherAlgorithm>, digest: Digest) -> Result<Self, Error> {
        if let Some(cipher) = cipher {
            if !matches!(cipher, CipherAlgorithm::Aes128Cbc | CipherAlgorithm::Aes256Cbc) {
                return Err(Error::Algorithm(cipher.name().to_owned()));
            }
        }
        Ok(Self {
            cipher,
            digest,
            encrypter: None,
            decrypter: None,
        })
    }

    pub(crate) fn with_keys(
        cipher: Option<CipherAlgorithm>,
        digest: Digest,
        keys: &CryptoKeys,
    ) -> Result<Self, Error> {
        let mut ctx = Self::create(cipher, digest)?;
        let cipher_keys = keys.cipher.as_ref();
        ctx.configure_encryption(cipher_keys.map(|k| &k.encryption_key), &keys.hmac.encryption_key)?;
        ctx.configure_decryption(cipher_keys.map(|k| &k.decryption_key), &keys.hmac.decryption_key)?;
        Ok(ctx)
    }

    pub(crate) fn configure_encryption(
        &mut self,
        cipher_key: Option<&SecretBytes>,
        hmac_key: &SecretBytes,
    ) -> Result<(), Error> {
        let cipher = match self.cipher {
            Some(cipher) => {
                let key = unbound_block_key(cipher, cipher_key_bytes(cipher, cipher_key)?)?;
                Some(PaddedBlockEncryptingKey::cbc_pkcs7(key).map_err(|_| Error::Creation)?)
            }
            None => None,
        };
        self.encrypter = Some(CbcEncrypter {
            cipher,
            hmac: self.digest.hmac_key(hmac_key)?,
        });
        debug!(
            cipher = self.cipher.map(|c| c.name()).unwrap_or("none"),
            digest = self.digest.name(),
            hmac_key = %hmac_key.fingerprint(),
            "CBC encryption configured"
        );
        Ok(())
    }

    pub(crate) fn configure_decryption(
        &mut self,
        cipher_key: Option<&SecretBytes>,
        hmac_key: &SecretBytes,
    ) -> Result<(), Error> {
        let cipher = match self.cipher {
            Some(cipher) => {
                let key = unbound_block_key(cipher, cipher_key_bytes(cipher, cipher_key)?)?;
                Some(PaddedBlockDecryptingKey::cbc_pkcs7(key).map_err(|_| Error::Creation)?)
            }
            None => None,
        };
        self.decrypter = Some(CbcDecrypter {
            cipher,
            hmac: self.digest.hmac_key(hmac_key)?,
        });
        debug!(
            cipher = self.cipher.map(|c| c.name()).unwrap_or("none"),
            digest = self.digest.name(),
            hmac_key = %hmac_key.fingerprint(),
            "CBC decryption configured"
        );
        Ok(())
    }

    pub(crate) fn digest_len(&self) -> usize {
        self.digest.output_len()
    }

    pub(crate) fn iv_len(&self) -> usize {
        self.cipher.map_or(0, |c| c.iv_len())
    }

    pub(crate) fn encryption_capacity(&self, len: usize) -> usize {
        // one extra block for PKCS#7 padding
        len + self.digest_len() + 2 * self.iv_len()
    }

    /// Appends `hmac | iv | ciphertext` (or `hmac | plaintext`) to `dst`.
    pub(crate) fn encrypt(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), CryptoError> {
        let enc = self.encrypter.as_ref().ok_or(CryptoError::Failure)?;
        let digest_len = self.digest_len();
        let start = dst.len();
        dst.resize(start + digest_len, 0);

        match &enc.cipher {
            Some(key) => {
                let mut iv = [0u8; 16];
                if OsRng.try_fill_bytes(&mut iv).is_err() {
                    dst.truncate(start);
                    return Err(CryptoError::Failure);
                }
                let mut block = src.to_vec();
                if key
                    .less_safe_encrypt(&mut block, EncryptionContext::Iv128(FixedLength::from(iv)))
                    .is_err()
                {
                    block.zeroize();
                    dst.truncate(start);
                    return Err(CryptoError::Failure);
                }
                dst.extend_from_slice(&iv);
                dst.extend_from_slice(&block);
            }
            None => dst.extend_from_slice(src),
        }

        let tag = hmac::sign(&enc.hmac, &dst[start + digest_len..]);
        dst[start..start + digest_len].copy_from_slice(tag.as_ref());
        Ok(())
    }

    /// Checks the leading HMAC of `src` without decrypting.
    pub(crate) fn verify(&self, src: &[u8]) -> Result<(), CryptoError> {
        let dec = self.decrypter.as_ref().ok_or(CryptoError::Failure)?;
        let digest_len = self.digest_len();
        if src.len() < digest_len {
            return Err(CryptoError::Malformed);
        }
        let (tag, subject) = src.split_at(digest_len);
        hmac::verify(&dec.hmac, subject, tag).map_err(|_| CryptoError::Authentication)
    }

    /// Verifies and appends the plaintext of `src` to `dst`.
    pub(crate) fn decrypt(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), CryptoError> {
        let dec = self.decrypter.as_ref().ok_or(CryptoError::Failure)?;
        let digest_len = self.digest_len();
        if src.len() < digest_len + self.iv_len() {
            return Err(CryptoError::Malformed);
        }
        self.verify(src)?;

        match &dec.cipher {
            Some(key) => {
                let iv = iv128(&src[digest_len..])?;
                let mut block = src[digest_len + self.iv_len()..].to_vec();
                let result = key
                    .decrypt(&mut block, DecryptionContext::Iv128(iv))
                    .map(|plaintext| dst.extend_from_slice(plaintext));
                block.zeroize();
                result.map_err(|_| CryptoError::Failure)
            }
            None => {
                dst.extend_from_slice(&src[digest_len..]);
                Ok(())
            }
        }
    }
}

impl Debug for CbcContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CbcContext")
            .field("cipher", &self.cipher)
            .field("digest", &self.digest)
            .field("encrypter", &self.encrypter.is_some())
            .field("decrypter", &self.decrypter.is_some())
            .finish()
    }
}

// MARK: CTR + HMAC

struct CtrEncrypter {
    cipher: EncryptingKey,
    hmac: hmac::Key,
}

struct CtrDecrypter {
    cipher: DecryptingKey,
    hmac: hmac::Key,
}

/// CTR + HMAC context (tls-crypt).
pub(crate) struct CtrContext {
    cipher: CipherAlgorithm,
    digest: Digest,
    tag_len: usize,
    encrypter: Option<CtrEncrypter>,
    decrypter: Option<CtrDecrypter>,
}

impl CtrContext {
    pub(crate) fn create(cipher: CipherAlgorithm, digest: Digest, tag_len: usize) -> Result<Self, Error> {
        if cipher != CipherAlgorithm::Aes256Ctr {
            return Err(Error::Algorithm(cipher.name().to_owned()));
        }
        // the IV is carved out of the tag
        if tag_len != digest.output_len() || tag_len < cipher.iv_len() {
            return Err(Error::Creation);
        }
        Ok(Self {
            cipher,
            digest,
            tag_len,
            encrypter: None,
            decrypter: None,
        })
    }

    pub(crate) fn with_keys(
        cipher: CipherAlgorithm,
        digest: Digest,
        tag_len: usize,
        keys: &CryptoKeys,
    ) -> Result<Self, Error> {
        let mut ctx = Self::create(cipher, digest, tag_len)?;
        let cipher_keys = keys.cipher.as_ref().ok_or(Error::Creation)?;
        ctx.configure_encryption(&cipher_keys.encryption_key, &keys.hmac.encryption_key)?;
        ctx.configure_decryption(&cipher_keys.decryption_key, &keys.hmac.decryption_key)?;
        Ok(ctx)
    }

    pub(crate) fn configure_encryption(
        &mut self,
        cipher_key: &SecretBytes,
        hmac_key: &SecretBytes,
    ) -> Result<(), Error> {
        let key = unbound_block_key(self.cipher, cipher_key_bytes(self.cipher, Some(cipher_key))?)?;
        self.encrypter = Some(CtrEncrypter {
            cipher: EncryptingKey::ctr(key).map_err(|_| Error::Creation)?,
            hmac: self.digest.hmac_key(hmac_key)?,
        });
        debug!(
            cipher = self.cipher.name(),
            digest = self.digest.name(),
            key = %cipher_key.fingerprint(),
            hmac_key = %hmac_key.fingerprint(),
            "CTR encryption configured"
        );
        Ok(())
    }

    pub(crate) fn configure_decryption(
        &mut self,
        cipher_key: &SecretBytes,
        hmac_key: &SecretBytes,
    ) -> Result<(), Error> {
        let key = unbound_block_key(self.cipher, cipher_key_bytes(self.cipher, Some(cipher_key))?)?;
        self.decrypter = Some(CtrDecrypter {
            cipher: DecryptingKey::ctr(key).map_err(|_| Error::Creation)?,
            hmac: self.digest.hmac_key(hmac_key)?,
        });
        debug!(
            cipher = self.cipher.name(),
            digest = self.digest.name(),
            key = %cipher_key.fingerprint(),
            hmac_key = %hmac_key.fingerprint(),
            "CTR decryption configured"
        );
        Ok(())
    }

    /// Appends `tag | ciphertext` to `dst`, the tag authenticating
    /// `flags.ad | src`.
    pub(crate) fn encrypt(
        &self,
        src: &[u8],
        dst: &mut Vec<u8>,
        flags: &CryptoFlags<'_>,
    ) -> Result<(), CryptoError> {
        let enc = self.encrypter.as_ref().ok_or(CryptoError::Failure)?;
        let mut mac = hmac::Context::with_key(&enc.hmac);
        mac.update(flags.ad);
        mac.update(src);
        let tag = mac.sign();
        let tag = &tag.as_ref()[..self.tag_len];

        let iv = iv128(tag)?;
        let mut block = src.to_vec();
        if enc
            .cipher
            .less_safe_encrypt(&mut block, EncryptionContext::Iv128(iv))
            .is_err()
        {
            block.zeroize();
            return Err(CryptoError::Failure);
        }
        dst.extend_from_slice(tag);
        dst.extend_from_slice(&block);
        Ok(())
    }

    /// Appends the plaintext of `src = tag | ciphertext` to `dst` after
    /// checking the tag against `flags.ad | plaintext`.
    pub(crate) fn decrypt(
        &self,
        src: &[u8],
        dst: &mut Vec<u8>,
        flags: &CryptoFlags<'_>,
    ) -> Result<(), CryptoError> {
        let dec = self.decrypter.as_ref().ok_or(CryptoError::Failure)?;
        if src.len() < self.tag_len {
            return Err(CryptoError::Malformed);
        }
        let (tag, ciphertext) = src.split_at(self.tag_len);
        let iv = iv128(tag)?;

        let mut subject = Vec::with_capacity(flags.ad.len() + ciphertext.len());
        subject.extend_from_slice(flags.ad);
        subject.extend_from_slice(ciphertext);
        let plaintext_len = match dec
            .cipher
            .decrypt(&mut subject[flags.ad.len()..], DecryptionContext::Iv128(iv))
        {
            Ok(plaintext) => plaintext.len(),
            Err(_) => {
                subject.zeroize();
                return Err(CryptoError::Failure);
            }
        };

        let verified = hmac::verify(&dec.hmac, &subject, tag).map_err(|_| CryptoError::Authentication);
        if verified.is_ok() {
            let offset = flags.ad.len();
            dst.extend_from_slice(&subject[offset..offset + plaintext_len]);
        }
        subject.zeroize();
        verified
    }
}

impl Debug for CtrContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtrContext")
            .field("cipher", &self.cipher)
            .field("digest", &self.digest)
            .field("tag_len", &self.tag_len)
            .field("encrypter", &self.encrypter.is_some())
            .field("decrypter", &self.decrypter.is_some())
            .finish()
    }
}
