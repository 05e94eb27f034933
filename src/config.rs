//! Configuration structures for setting up a [`DataPath`] or a
//! [`ControlChannelSerializer`].
//!
//! To build a data path config, you should make three decisions in order:
//!
//! 1. Supply the session keys [`CryptoKeys`], derived from the TLS handshake
//!    by the caller. The peer uses the same keys with encryption and
//!    decryption swapped.
//! 2. Choose a [`CryptoMode`]. Both peers must use the same mode.
//! 3. Choose the [`CompressionFraming`] negotiated with the peer, and
//!    optionally the peer id assigned by the server.
//!
//! The control channel is configured separately, with an optional
//! [`TlsWrap`].
//!
//! # Example
//!
//! ```
//! use ovpnwire::{
//!     CipherAlgorithm, CompressionFraming, CryptoKeys, CryptoMode, DataPathConfig, KeyPair,
//!     SecretBytes,
//! };
//!
//! let keys = CryptoKeys::new(
//!     Some(KeyPair::new(
//!         SecretBytes::from_slice(&[1; 32]),
//!         SecretBytes::from_slice(&[2; 32]),
//!     )),
//!     KeyPair::new(
//!         SecretBytes::from_slice(&[3; 20]),
//!         SecretBytes::from_slice(&[4; 20]),
//!     ),
//! );
//!
//! let config = DataPathConfig::builder_with_keys(keys)
//!     .with_crypto_mode(CryptoMode::aead(CipherAlgorithm::Aes256Gcm))
//!     .with_compression_framing(CompressionFraming::CompressV2)
//!     .with_peer_id(7)?;
//! # Ok::<(), ovpnwire::Error>(())
//! ```
//!
//! [`DataPath`]: crate::DataPath
//! [`ControlChannelSerializer`]: crate::ControlChannelSerializer
use crate::{
    crypto::Digest,
    data_path::CryptoMode,
    error::Error,
    framing::CompressionFraming,
    keys::{CryptoKeys, StaticKey},
    specification::PEER_ID_DISABLED,
};

/// Configuration structure for setting up a [`DataPath`].
///
/// For details on constructing and configuring `config`, refer to
/// the [`config`] module.
///
/// [`config`]: crate::config
/// [`DataPath`]: crate::DataPath
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DataPathConfig {
    pub(crate) keys: CryptoKeys,
    pub(crate) mode: CryptoMode,
    pub(crate) framing: CompressionFraming,
    pub(crate) peer_id: Option<u32>,
}

/// A builder for creating a [`DataPathConfig`] instance.
///
/// To get a [`ConfigBuilder`], use [`DataPathConfig::builder_with_keys`].
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ConfigBuilder<State> {
    state: State,
}

impl DataPathConfig {
    /// Sets up the session keys.
    pub fn builder_with_keys(keys: CryptoKeys) -> ConfigBuilder<WantsCryptoMode> {
        ConfigBuilder {
            state: WantsCryptoMode { keys },
        }
    }

    /// Sends `P_DATA_V2` packets carrying `peer_id`, and only accepts
    /// `P_DATA_V2` packets carrying the same id. `P_DATA_V1` packets are
    /// accepted with or without a peer id.
    ///
    /// Fails with [`Error::Creation`] if `peer_id` does not fit in 24 bits
    /// or is the reserved "disabled" value.
    pub fn with_peer_id(self, peer_id: u32) -> Result<Self, Error> {
        if peer_id >= PEER_ID_DISABLED {
            return Err(Error::Creation);
        }
        Ok(Self {
            peer_id: Some(peer_id),
            ..self
        })
    }
}

impl ConfigBuilder<WantsCryptoMode> {
    /// Sets up the crypto mode.
    ///
    /// Both peers must use the same mode.
    pub fn with_crypto_mode(self, mode: CryptoMode) -> ConfigBuilder<WantsFraming> {
        ConfigBuilder {
            state: WantsFraming {
                keys: self.state.keys,
                mode,
            },
        }
    }
}

impl ConfigBuilder<WantsFraming> {
    /// Sets up the compression framing negotiated with the peer.
    pub fn with_compression_framing(self, framing: CompressionFraming) -> DataPathConfig {
        DataPathConfig {
            keys: self.state.keys,
            mode: self.state.mode,
            framing,
            peer_id: None,
        }
    }

    /// No compression framing.
    pub fn with_default_framing(self) -> DataPathConfig {
        self.with_compression_framing(CompressionFraming::default())
    }
}

/// Config builder state where the caller must supply a crypto mode.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct WantsCryptoMode {
    keys: CryptoKeys,
}

/// Config builder state where the caller must supply a compression framing.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct WantsFraming {
    keys: CryptoKeys,
    mode: CryptoMode,
}

/// How a static key wraps the control channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TlsWrapStrategy {
    /// `tls-auth`: HMAC only.
    Auth {
        /// HMAC digest, SHA1 unless configured otherwise.
        digest: Digest,
    },
    /// `tls-crypt`: encryption and HMAC.
    Crypt,
}

/// A `tls-auth` or `tls-crypt` setting.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TlsWrap {
    /// Wrapping strategy.
    pub strategy: TlsWrapStrategy,
    /// The static key.
    pub key: StaticKey,
}

impl TlsWrap {
    /// A `tls-auth` setting.
    pub fn auth(digest: Digest, key: StaticKey) -> Self {
        Self {
            strategy: TlsWrapStrategy::Auth { digest },
            key,
        }
    }

    /// A `tls-crypt` setting. The key must have a direction.
    pub fn crypt(key: StaticKey) -> Self {
        Self {
            strategy: TlsWrapStrategy::Crypt,
            key,
        }
    }
}
