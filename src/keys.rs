//! Key material.
//!
//! This module owns every raw key byte in the crate. Keys live in
//! [`SecretBytes`], which is zeroed when dropped, and are only ever printed as
//! a length plus a short blake3 fingerprint.

use core::fmt::{Debug, Formatter};

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, StaticKeyError};

/// An owned buffer of secret bytes, zeroed on drop.
#[derive(Clone, Eq, PartialEq, Hash, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    /// Copies `bytes` into a new secret buffer.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Get a reference to the secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of secret bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A short, non-reversible fingerprint suitable for logs.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        hex::encode(&hash.as_bytes()[..4])
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for SecretBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for SecretBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBytes")
            .field("len", &self.0.len())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// One key per direction.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct KeyPair {
    /// Key used on egress.
    pub encryption_key: SecretBytes,
    /// Key used on ingress.
    pub decryption_key: SecretBytes,
}

impl KeyPair {
    /// Creates a key pair from the two directional keys.
    pub fn new(encryption_key: SecretBytes, decryption_key: SecretBytes) -> Self {
        Self {
            encryption_key,
            decryption_key,
        }
    }

    /// Returns the pair as seen by the peer: encryption and decryption swapped.
    pub fn swapped(&self) -> Self {
        Self {
            encryption_key: self.decryption_key.clone(),
            decryption_key: self.encryption_key.clone(),
        }
    }
}

/// The full key set of a crypto context.
///
/// `cipher` is `None` for HMAC-only contexts. For AEAD contexts, the HMAC
/// keys are not used for authentication: their first bytes seed the implicit
/// part of the nonce.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CryptoKeys {
    /// Cipher keys.
    pub cipher: Option<KeyPair>,
    /// HMAC keys.
    pub hmac: KeyPair,
}

impl CryptoKeys {
    /// Creates a key set.
    pub fn new(cipher: Option<KeyPair>, hmac: KeyPair) -> Self {
        Self { cipher, hmac }
    }

    /// Returns the key set as seen by the peer.
    pub fn swapped(&self) -> Self {
        Self {
            cipher: self.cipher.as_ref().map(KeyPair::swapped),
            hmac: self.hmac.swapped(),
        }
    }
}

/// The key-direction field of a static key.
///
/// Usually 0 on servers and 1 on clients.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeyDirection {
    /// Conventional server direction.
    Server = 0,
    /// Conventional client direction.
    Client = 1,
}

/// An OpenVPN static key, as generated by `openvpn --genkey`.
///
/// The key holds 256 bytes split in four 64-byte slots. Which slot feeds
/// which role depends on the [`KeyDirection`]; a key without a direction is
/// bidirectional and only usable for HMAC (`tls-auth`).
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct StaticKey {
    data: SecretBytes,
    direction: Option<KeyDirection>,
}

impl StaticKey {
    /// Length of the key in bytes (2048 bits).
    pub const LENGTH: usize = 256;

    const KEY_COUNT: usize = 4;
    const KEY_LENGTH: usize = Self::LENGTH / Self::KEY_COUNT;
    const FILE_HEAD: &'static str = "-----BEGIN OpenVPN Static key V1-----";
    const FILE_FOOT: &'static str = "-----END OpenVPN Static key V1-----";

    /// Creates a static key from raw bytes.
    pub fn new(data: &[u8], direction: Option<KeyDirection>) -> Result<Self, Error> {
        if data.len() != Self::LENGTH {
            return Err(StaticKeyError::InvalidLength {
                received: data.len(),
            }
            .into());
        }
        Ok(Self {
            data: SecretBytes::from_slice(data),
            direction,
        })
    }

    /// Creates a bidirectional static key from raw bytes.
    pub fn bidirectional(data: &[u8]) -> Result<Self, Error> {
        Self::new(data, None)
    }

    /// Parses the content of a static key file.
    ///
    /// Comment lines (`#`) are accepted before the header. The hex body may
    /// span any number of lines.
    pub fn from_file(content: &str, direction: Option<KeyDirection>) -> Result<Self, Error> {
        let mut is_head = true;
        let mut body = String::with_capacity(2 * Self::LENGTH);

        for line in content.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
            if is_head {
                if line.starts_with('#') {
                    continue;
                }
                if line != Self::FILE_HEAD {
                    return Err(Error::StaticKey(StaticKeyError::MissingHeader));
                }
                is_head = false;
                continue;
            }
            if line.starts_with('-') {
                if line != Self::FILE_FOOT {
                    return Err(Error::StaticKey(StaticKeyError::InvalidFooter));
                }
                break;
            }
            body.push_str(line);
        }
        if is_head {
            return Err(Error::StaticKey(StaticKeyError::MissingHeader));
        }
        if body.len() != 2 * Self::LENGTH {
            return Err(StaticKeyError::InvalidLength {
                received: body.len() / 2,
            }
            .into());
        }
        let mut data = hex::decode(&body).map_err(|_| StaticKeyError::InvalidHex)?;
        body.zeroize();
        let key = Self::new(&data, direction);
        data.zeroize();
        key
    }

    /// The key direction, `None` if bidirectional.
    pub fn direction(&self) -> Option<KeyDirection> {
        self.direction
    }

    /// The cipher encryption key, `None` if the key is bidirectional.
    pub fn cipher_encrypt_key(&self) -> Option<SecretBytes> {
        self.direction.map(|d| match d {
            KeyDirection::Server => self.key_at(0),
            KeyDirection::Client => self.key_at(2),
        })
    }

    /// The cipher decryption key, `None` if the key is bidirectional.
    pub fn cipher_decrypt_key(&self) -> Option<SecretBytes> {
        self.direction.map(|d| match d {
            KeyDirection::Server => self.key_at(2),
            KeyDirection::Client => self.key_at(0),
        })
    }

    /// The HMAC key for outbound packets.
    pub fn hmac_send_key(&self) -> SecretBytes {
        match self.direction {
            None | Some(KeyDirection::Server) => self.key_at(1),
            Some(KeyDirection::Client) => self.key_at(3),
        }
    }

    /// The HMAC key for inbound packets.
    pub fn hmac_receive_key(&self) -> SecretBytes {
        match self.direction {
            None | Some(KeyDirection::Client) => self.key_at(1),
            Some(KeyDirection::Server) => self.key_at(3),
        }
    }

    /// HMAC keys only, as used by `tls-auth`.
    pub fn hmac_keys(&self) -> CryptoKeys {
        CryptoKeys::new(
            None,
            KeyPair::new(self.hmac_send_key(), self.hmac_receive_key()),
        )
    }

    /// Cipher and HMAC keys, as used by `tls-crypt`. `None` if the key is
    /// bidirectional.
    pub fn crypt_keys(&self) -> Option<CryptoKeys> {
        let cipher = KeyPair::new(self.cipher_encrypt_key()?, self.cipher_decrypt_key()?);
        Some(CryptoKeys::new(
            Some(cipher),
            KeyPair::new(self.hmac_send_key(), self.hmac_receive_key()),
        ))
    }

    fn key_at(&self, index: usize) -> SecretBytes {
        let start = index * Self::KEY_LENGTH;
        SecretBytes::from_slice(&self.data.as_bytes()[start..start + Self::KEY_LENGTH])
    }
}

impl Debug for StaticKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKey")
            .field("data", &"*****")
            .field("fingerprint", &self.data.fingerprint())
            .field("direction", &self.direction)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A key whose byte at offset `i` is `i as u8`, which makes slot
    /// selection visible: slot `n` starts with byte `64 * n`.
    pub(crate) fn sequential_key_bytes() -> Vec<u8> {
        (0..StaticKey::LENGTH).map(|i| i as u8).collect()
    }

    pub(crate) fn static_key_file(data: &[u8]) -> String {
        let mut file = String::from("#\n# 2048 bit OpenVPN static key\n#\n");
        file.push_str(StaticKey::FILE_HEAD);
        file.push('\n');
        for chunk in data.chunks(16) {
            file.push_str(&hex::encode(chunk));
            file.push('\n');
        }
        file.push_str(StaticKey::FILE_FOOT);
        file.push('\n');
        file
    }

    #[test]
    fn test_parse_file() {
        let data = sequential_key_bytes();
        let file = static_key_file(&data);
        let key = StaticKey::from_file(&file, Some(KeyDirection::Client)).unwrap();
        assert_eq!(key, StaticKey::new(&data, Some(KeyDirection::Client)).unwrap());
        assert_eq!(key.direction(), Some(KeyDirection::Client));
    }

    #[test]
    fn test_parse_file_crlf() {
        let data = sequential_key_bytes();
        let file = static_key_file(&data).replace('\n', "\r\n");
        assert!(StaticKey::from_file(&file, None).is_ok());
    }

    #[test]
    fn test_parse_file_errors() {
        let data = sequential_key_bytes();
        let file = static_key_file(&data);

        let no_header = file.replace(StaticKey::FILE_HEAD, "garbage");
        assert_eq!(
            StaticKey::from_file(&no_header, None),
            Err(Error::StaticKey(StaticKeyError::MissingHeader))
        );

        let bad_footer = file.replace(StaticKey::FILE_FOOT, "-----END something else-----");
        assert_eq!(
            StaticKey::from_file(&bad_footer, None),
            Err(Error::StaticKey(StaticKeyError::InvalidFooter))
        );

        let short = static_key_file(&data[..128]);
        assert_eq!(
            StaticKey::from_file(&short, None),
            Err(Error::StaticKey(StaticKeyError::InvalidLength { received: 128 }))
        );

        let mut non_hex = static_key_file(&data);
        let pos = non_hex.find("0001").unwrap();
        non_hex.replace_range(pos..pos + 2, "zz");
        assert_eq!(
            StaticKey::from_file(&non_hex, None),
            Err(Error::StaticKey(StaticKeyError::InvalidHex))
        );

        assert_eq!(
            StaticKey::from_file("", None),
            Err(Error::StaticKey(StaticKeyError::MissingHeader))
        );
    }

    #[test]
    fn test_direction_slots() {
        let data = sequential_key_bytes();

        let server = StaticKey::new(&data, Some(KeyDirection::Server)).unwrap();
        assert_eq!(server.cipher_encrypt_key().unwrap().as_bytes()[0], 0);
        assert_eq!(server.cipher_decrypt_key().unwrap().as_bytes()[0], 128);
        assert_eq!(server.hmac_send_key().as_bytes()[0], 64);
        assert_eq!(server.hmac_receive_key().as_bytes()[0], 192);

        let client = StaticKey::new(&data, Some(KeyDirection::Client)).unwrap();
        assert_eq!(client.cipher_encrypt_key().unwrap().as_bytes()[0], 128);
        assert_eq!(client.cipher_decrypt_key().unwrap().as_bytes()[0], 0);
        assert_eq!(client.hmac_send_key().as_bytes()[0], 192);
        assert_eq!(client.hmac_receive_key().as_bytes()[0], 64);

        let bidi = StaticKey::bidirectional(&data).unwrap();
        assert!(bidi.cipher_encrypt_key().is_none());
        assert!(bidi.crypt_keys().is_none());
        assert_eq!(bidi.hmac_send_key(), bidi.hmac_receive_key());
        assert_eq!(bidi.hmac_send_key().len(), 64);
    }

    #[test]
    fn test_opposite_directions_mirror() {
        let data = sequential_key_bytes();
        let server = StaticKey::new(&data, Some(KeyDirection::Server)).unwrap();
        let client = StaticKey::new(&data, Some(KeyDirection::Client)).unwrap();
        assert_eq!(server.crypt_keys().unwrap(), client.crypt_keys().unwrap().swapped());
    }

    #[test]
    fn test_debug_hides_key() {
        let key = SecretBytes::from_slice(&[0x42; 32]);
        let debug = format!("{:?}", key);
        assert!(debug.contains("len: 32"));
        assert!(!debug.contains("42, 42"));

        let static_key = StaticKey::bidirectional(&sequential_key_bytes()).unwrap();
        assert!(format!("{:?}", static_key).contains("*****"));
    }
}
