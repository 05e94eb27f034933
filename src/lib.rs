//! Ovpnwire is the secure-channel layer of the OpenVPN wire protocol. It turns
//! link packets into authenticated, decrypted tunnel payloads and back, and
//! protects the control channel that carries the TLS handshake.
//!
//! ## Quick Start
//!
//! Ovpnwire follows the sans-I/O principle: nothing in the core performs
//! network I/O or spawns threads. A session owner feeds link bytes in and
//! gets payloads out, through four independent pieces:
//!
//! * [`DataPath`]
//!
//!   The data channel engine. It assembles tunnel payloads (compression
//!   framing and packet id), encrypts them under the negotiated
//!   [`CryptoMode`], and reverses the process on ingress, dropping replayed
//!   packets and detecting keep-alives.
//!
//! * [`ControlChannelSerializer`]
//!
//!   Encodes and decodes [`ControlPacket`]s, optionally wrapped with a
//!   [`StaticKey`] as `tls-auth` (HMAC) or `tls-crypt` (AES-256-CTR and
//!   HMAC-SHA256).
//!
//! * [`PacketProcessor`]
//!
//!   Scrambles link packets with an [`ObfuscationMethod`] and frames them
//!   into a TCP byte stream with 2-byte length prefixes.
//!
//! * [`PacketStream`]
//!
//!   For convenient use in asynchronous scenarios, Ovpnwire provides a
//!   ready-to-use packet stream based on tokio, reading and writing
//!   obfuscated, length-prefixed packets over any [`AsyncRead`] and
//!   [`AsyncWrite`] transport. It requires the `tokio-stream-impl` feature.
//!
//! The first byte of every link packet carries its [`PacketCode`]; use
//! [`packet_code`] to route a packet to the data path or to the control
//! channel.
//!
//! ## Configuration
//!
//! 1. Session keys
//!
//!    Data channel keys are passed through [`CryptoKeys`], one [`KeyPair`]
//!    for the cipher and one for the HMAC. They are derived from the TLS
//!    handshake by the caller; the peer uses the same keys with encryption
//!    and decryption swapped. All key bytes live in [`SecretBytes`], which
//!    is zeroed on drop and never printed.
//!
//! 2. Crypto mode
//!
//!    Configurable through the [`CryptoMode`] enum:
//!
//!    * **AEAD**: AES-128-GCM, AES-256-GCM or ChaCha20-Poly1305.
//!    * **HMAC + CBC**: AES-128-CBC or AES-256-CBC, or no cipher at all,
//!      authenticated with HMAC-SHA1, SHA256, SHA384 or SHA512.
//!
//! 3. Compression framing
//!
//!    The [`CompressionFraming`] negotiated with the peer. Compression
//!    itself is not supported, only the framing of uncompressed payloads.
//!
//! For detailed configuration options, refer to the documentation of the
//! [`config`] module.
//!
//! ## Errors
//!
//! Every [`Error`] is fatal to the session that produced it. Replayed packets
//! are not errors: they are silently dropped.
//!
//! [`AsyncRead`]: tokio::io::AsyncRead
//! [`AsyncWrite`]: tokio::io::AsyncWrite
//! [`PacketStream`]: PacketStream
#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;

mod control;
mod crypto;
mod data_path;
mod framing;
mod keys;
mod obfuscation;
mod packet;
mod replay;
mod specification;

#[cfg(feature = "tokio-stream-impl")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-stream-impl")))]
mod tokio_stream_impl;

pub use config::{DataPathConfig, TlsWrap, TlsWrapStrategy};
pub use control::{AuthSerializer, ControlChannelSerializer, ControlPacket, CryptSerializer};
pub use crypto::{CipherAlgorithm, Digest};
pub use data_path::{CryptoMode, DataPath, DecryptedPacket};
pub use error::Error;
pub use framing::CompressionFraming;
pub use keys::{CryptoKeys, KeyDirection, KeyPair, SecretBytes, StaticKey};
pub use obfuscation::{Direction, ObfuscationMethod, PacketProcessor};
pub use packet::{PacketCode, is_ping, opcode, packet_code, ping_payload, split_opcode};
pub use replay::{BidirectionalState, REPLAY_WINSIZE, ReplayWindow};

#[cfg(feature = "tokio-stream-impl")]
pub use tokio_stream_impl::PacketStream;
