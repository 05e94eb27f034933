//! The data channel engine.
//!
//! A [`DataPath`] turns tunnel payloads into data-channel packets and back.
//! Egress runs in two steps, both also available fused:
//!
//! 1. [`DataPath::assemble`] adds the compression framing and, outside AEAD
//!    mode, the packet id.
//! 2. [`DataPath::encrypt`] prepends the header and seals the assembled
//!    buffer with the session's [`CryptoMode`].
//!
//! Ingress mirrors it with [`DataPath::decrypt`] and [`DataPath::parse`].
//! The bulk forms [`DataPath::encrypt_many`] and [`DataPath::decrypt_many`]
//! also number outbound packets, drop replays and filter keep-alives.
//!
//! # Example
//!
//! ```
//! use ovpnwire::{
//!     CipherAlgorithm, CompressionFraming, CryptoKeys, CryptoMode, DataPath, DataPathConfig,
//!     KeyPair, SecretBytes,
//! };
//!
//! let keys = CryptoKeys::new(
//!     Some(KeyPair::new(
//!         SecretBytes::from_slice(&[1; 64]),
//!         SecretBytes::from_slice(&[2; 64]),
//!     )),
//!     KeyPair::new(
//!         SecretBytes::from_slice(&[3; 64]),
//!         SecretBytes::from_slice(&[4; 64]),
//!     ),
//! );
//! let mode = CryptoMode::aead(CipherAlgorithm::Aes256Gcm);
//!
//! let mut client = DataPath::new(
//!     DataPathConfig::builder_with_keys(keys.clone())
//!         .with_crypto_mode(mode)
//!         .with_compression_framing(CompressionFraming::CompressV2),
//! )?;
//! let mut server = DataPath::new(
//!     DataPathConfig::builder_with_keys(keys.swapped())
//!         .with_crypto_mode(mode)
//!         .with_compression_framing(CompressionFraming::CompressV2),
//! )?;
//!
//! let packets = client.encrypt_many(&[b"hello".as_slice()], 0)?;
//! let (payloads, keep_alive) = server.decrypt_many(&packets)?;
//! assert_eq!(payloads, [b"hello".to_vec()]);
//! assert!(!keep_alive);
//! # Ok::<(), ovpnwire::Error>(())
//! ```

use core::fmt::{Debug, Formatter};

use tracing::{debug, trace, warn};

use crate::{
    config::DataPathConfig,
    crypto::{AeadContext, CbcContext, CipherAlgorithm, CryptoFlags, Digest},
    error::{DataPathError, Error},
    framing::CompressionFraming,
    packet::{data_header, is_ping, put_data_header},
    replay::{BidirectionalState, ReplayWindow},
    specification::{
        AEAD_TAG_LEN, BUFFER_GROWTH_STEP, BUFFER_INITIAL_CAPACITY, DATA_V2_HEADER_LEN,
        PACKET_ID_LEN, PACKET_ID_OVERFLOW, PEER_ID_DISABLED,
    },
};

/// The crypto construction protecting data packets.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CryptoMode {
    /// AEAD with the packet id in clear as explicit nonce.
    Aead {
        /// AEAD cipher.
        cipher: CipherAlgorithm,
        /// Tag length, must be 16.
        tag_len: usize,
        /// Length of the explicit nonce, must be the packet id length (4).
        id_len: usize,
    },

    /// Optional CBC encryption authenticated by an HMAC.
    HmacCbc {
        /// CBC cipher, `None` for authentication only.
        cipher: Option<CipherAlgorithm>,
        /// HMAC digest.
        digest: Digest,
    },

    /// No protection at all. Only meant for tests.
    Mock,
}

impl CryptoMode {
    /// AEAD mode with the standard tag and packet id lengths.
    pub fn aead(cipher: CipherAlgorithm) -> Self {
        CryptoMode::Aead {
            cipher,
            tag_len: AEAD_TAG_LEN,
            id_len: PACKET_ID_LEN,
        }
    }

    /// HMAC mode with an optional CBC cipher.
    pub fn hmac_cbc(cipher: Option<CipherAlgorithm>, digest: Digest) -> Self {
        CryptoMode::HmacCbc { cipher, digest }
    }
}

/// A decrypted and parsed data packet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecryptedPacket {
    /// The packet id.
    pub packet_id: u32,
    /// The tunnel payload.
    pub payload: Vec<u8>,
    /// The compression framing byte found in front of the payload.
    pub header: u8,
    /// The payload is the keep-alive message.
    pub keep_alive: bool,
}

enum Engine {
    Aead(AeadContext),
    HmacCbc(CbcContext),
    Mock,
}

/// Stateless packet transforms of a session.
struct Codec {
    engine: Engine,
    framing: CompressionFraming,
    peer_id: Option<u32>,
}

impl Codec {
    /// Packet id and framing overhead ahead of the payload.
    fn assembled_len(&self, payload_len: usize) -> usize {
        let id_len = match self.engine {
            Engine::Aead(_) => 0,
            _ => PACKET_ID_LEN,
        };
        id_len + self.framing.overhead() + payload_len
    }

    fn encrypted_len(&self, assembled_len: usize) -> usize {
        let header_len = DATA_V2_HEADER_LEN + PACKET_ID_LEN;
        header_len
            + match &self.engine {
                Engine::Aead(ctx) => ctx.encryption_capacity(assembled_len),
                Engine::HmacCbc(ctx) => ctx.encryption_capacity(assembled_len),
                Engine::Mock => assembled_len,
            }
    }

    fn assemble_into(&self, packet_id: u32, payload: &[u8], dst: &mut Vec<u8>) {
        if !matches!(self.engine, Engine::Aead(_)) {
            dst.extend_from_slice(&packet_id.to_be_bytes());
        }
        self.framing.assemble(payload, dst);
    }

    fn encrypt_into(
        &self,
        key_id: u8,
        packet_id: u32,
        assembled: &[u8],
        dst: &mut Vec<u8>,
    ) -> Result<(), DataPathError> {
        let start = dst.len();
        put_data_header(dst, key_id, self.peer_id);

        match &self.engine {
            Engine::Aead(ctx) => {
                let id = packet_id.to_be_bytes();
                // with a peer id the whole header is authenticated
                let ad_start = if self.peer_id.is_some() {
                    start
                } else {
                    dst.len()
                };
                dst.extend_from_slice(&id);

                let mut ad = [0u8; DATA_V2_HEADER_LEN + PACKET_ID_LEN];
                let ad_len = dst.len() - ad_start;
                ad[..ad_len].copy_from_slice(&dst[ad_start..]);

                let flags = CryptoFlags {
                    iv: &id,
                    ad: &ad[..ad_len],
                };
                ctx.encrypt(assembled, dst, &flags)?;
            }
            Engine::HmacCbc(ctx) => ctx.encrypt(assembled, dst)?,
            Engine::Mock => dst.extend_from_slice(assembled),
        }
        Ok(())
    }

    /// Appends the assembled buffer of `packet` to `dst` and returns its
    /// packet id.
    fn decrypt_into(&self, packet: &[u8], dst: &mut Vec<u8>) -> Result<u32, DataPathError> {
        let header = data_header(packet)?;
        // only P_DATA_V2 carries a peer id, P_DATA_V1 is always accepted
        if let Some(received) = header.peer_id {
            let expected = self.peer_id.unwrap_or(PEER_ID_DISABLED);
            if received != expected {
                debug!(expected, received, "peer id mismatch");
                return Err(DataPathError::PeerIdMismatch { expected, received });
            }
        }
        let body = &packet[header.len..];

        let packet_id = match &self.engine {
            Engine::Aead(ctx) => {
                if body.len() < PACKET_ID_LEN + ctx.tag_len() {
                    return Err(DataPathError::Malformed);
                }
                let id = &body[..PACKET_ID_LEN];
                // P_DATA_V2 authenticates its whole header, P_DATA_V1 only
                // the packet id
                let ad_start = if header.len == DATA_V2_HEADER_LEN {
                    0
                } else {
                    header.len
                };
                let flags = CryptoFlags {
                    iv: id,
                    ad: &packet[ad_start..header.len + PACKET_ID_LEN],
                };
                ctx.decrypt(&body[PACKET_ID_LEN..], dst, &flags)
                    .inspect_err(|_| trace!(len = packet.len(), "AEAD authentication failed"))?;
                read_packet_id(id)?
            }
            Engine::HmacCbc(ctx) => {
                let start = dst.len();
                ctx.decrypt(body, dst)
                    .inspect_err(|_| trace!(len = packet.len(), "HMAC authentication failed"))?;
                read_packet_id(&dst[start..])?
            }
            Engine::Mock => {
                dst.extend_from_slice(body);
                read_packet_id(body)?
            }
        };

        if packet_id > PACKET_ID_OVERFLOW {
            warn!(packet_id, "inbound packet id overflow");
            return Err(DataPathError::Overflow);
        }
        Ok(packet_id)
    }

    /// Appends the payload of `assembled` to `dst` and returns the framing
    /// header.
    fn parse_into(&self, assembled: &[u8], dst: &mut Vec<u8>) -> Result<u8, DataPathError> {
        let framed = match self.engine {
            Engine::Aead(_) => assembled,
            _ => assembled
                .get(PACKET_ID_LEN..)
                .ok_or(DataPathError::Malformed)?,
        };
        self.framing.parse(framed, dst)
    }
}

fn read_packet_id(bytes: &[u8]) -> Result<u32, DataPathError> {
    bytes
        .get(..PACKET_ID_LEN)
        .and_then(|id| id.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or(DataPathError::Malformed)
}

/// Grows `buf` so that it holds at least `len` bytes, in whole steps.
fn ensure_capacity(buf: &mut Vec<u8>, len: usize) {
    if buf.capacity() < len {
        let target = len.next_multiple_of(BUFFER_GROWTH_STEP);
        buf.reserve_exact(target - buf.len());
    }
}

#[derive(Default)]
struct Buffers {
    assembled: Vec<u8>,
    decrypted: Vec<u8>,
}

impl Buffers {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            assembled: Vec::with_capacity(capacity),
            decrypted: Vec::with_capacity(capacity),
        }
    }
}

/// The data channel of one session.
///
/// The crypto mode, framing and keys are fixed at construction. Outbound
/// packet ids start at 1.
pub struct DataPath {
    codec: Codec,
    packet_ids: BidirectionalState<u32>,
    replay: ReplayWindow,
    buffers: Buffers,
}

impl DataPath {
    /// Builds the data path of a session.
    ///
    /// Returns [`Error::Algorithm`] if the crypto mode names an algorithm
    /// that does not fit it, and [`Error::Creation`] if the keys are too
    /// short.
    pub fn new(config: DataPathConfig) -> Result<Self, Error> {
        let DataPathConfig {
            keys,
            mode,
            framing,
            peer_id,
        } = config;

        let engine = match mode {
            CryptoMode::Aead {
                cipher,
                tag_len,
                id_len,
            } => {
                if id_len != PACKET_ID_LEN {
                    return Err(Error::Creation);
                }
                Engine::Aead(AeadContext::with_keys(cipher, tag_len, id_len, &keys)?)
            }
            CryptoMode::HmacCbc { cipher, digest } => {
                Engine::HmacCbc(CbcContext::with_keys(cipher, digest, &keys)?)
            }
            CryptoMode::Mock => Engine::Mock,
        };
        debug!(?mode, ?framing, ?peer_id, "data path created");

        Ok(Self {
            codec: Codec {
                engine,
                framing,
                peer_id,
            },
            packet_ids: BidirectionalState::new(1),
            replay: ReplayWindow::new(),
            buffers: Buffers::with_capacity(BUFFER_INITIAL_CAPACITY),
        })
    }

    /// The compression framing of the session.
    pub fn framing(&self) -> CompressionFraming {
        self.codec.framing
    }

    /// The peer id sent in `P_DATA_V2` headers, if any.
    pub fn peer_id(&self) -> Option<u32> {
        self.codec.peer_id
    }

    /// Frames `payload` for encryption under `packet_id`.
    ///
    /// Outside AEAD mode the packet id is part of the assembled buffer.
    pub fn assemble(&self, packet_id: u32, payload: &[u8]) -> Vec<u8> {
        let mut dst = Vec::with_capacity(self.codec.assembled_len(payload.len()));
        self.codec.assemble_into(packet_id, payload, &mut dst);
        dst
    }

    /// Encrypts an assembled buffer into a data packet.
    pub fn encrypt(&self, key_id: u8, packet_id: u32, assembled: &[u8]) -> Result<Vec<u8>, Error> {
        let mut dst = Vec::with_capacity(self.codec.encrypted_len(assembled.len()));
        self.codec.encrypt_into(key_id, packet_id, assembled, &mut dst)?;
        Ok(dst)
    }

    /// Decrypts a data packet into its packet id and assembled buffer.
    pub fn decrypt(&self, packet: &[u8]) -> Result<(u32, Vec<u8>), Error> {
        let mut dst = Vec::with_capacity(packet.len());
        let packet_id = self.codec.decrypt_into(packet, &mut dst)?;
        Ok((packet_id, dst))
    }

    /// Extracts the payload of an assembled buffer, along with the framing
    /// header.
    pub fn parse(&self, assembled: &[u8]) -> Result<(Vec<u8>, u8), Error> {
        let mut dst = Vec::with_capacity(assembled.len());
        let header = self.codec.parse_into(assembled, &mut dst)?;
        Ok((dst, header))
    }

    /// [`Self::assemble`] followed by [`Self::encrypt`].
    pub fn assemble_and_encrypt(
        &mut self,
        key_id: u8,
        packet_id: u32,
        payload: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let assembled = &mut self.buffers.assembled;
        assembled.clear();
        ensure_capacity(assembled, self.codec.assembled_len(payload.len()));
        self.codec.assemble_into(packet_id, payload, assembled);

        let mut dst = Vec::with_capacity(self.codec.encrypted_len(assembled.len()));
        self.codec.encrypt_into(key_id, packet_id, assembled, &mut dst)?;
        Ok(dst)
    }

    /// [`Self::decrypt`] followed by [`Self::parse`].
    pub fn decrypt_and_parse(&mut self, packet: &[u8]) -> Result<DecryptedPacket, Error> {
        let decrypted = &mut self.buffers.decrypted;
        decrypted.clear();
        ensure_capacity(decrypted, packet.len());
        let packet_id = self.codec.decrypt_into(packet, decrypted)?;

        let mut payload = Vec::with_capacity(decrypted.len());
        let header = self.codec.parse_into(decrypted, &mut payload)?;
        let keep_alive = is_ping(&payload);
        Ok(DecryptedPacket {
            packet_id,
            payload,
            header,
            keep_alive,
        })
    }

    /// Encrypts `payloads` under consecutive outbound packet ids.
    ///
    /// Fails with [`DataPathError::Overflow`] once the outbound counter
    /// passes the reserved ceiling; the session must then be renegotiated.
    pub fn encrypt_many<P: AsRef<[u8]>>(
        &mut self,
        payloads: &[P],
        key_id: u8,
    ) -> Result<Vec<Vec<u8>>, Error> {
        let mut packets = Vec::with_capacity(payloads.len());
        for payload in payloads {
            if self.packet_ids.outbound > PACKET_ID_OVERFLOW {
                warn!(packet_id = self.packet_ids.outbound, "outbound packet id overflow");
                return Err(DataPathError::Overflow.into());
            }
            let packet_id = self.packet_ids.next_outbound();
            packets.push(self.assemble_and_encrypt(key_id, packet_id, payload.as_ref())?);
        }
        Ok(packets)
    }

    /// Decrypts and parses `packets`.
    ///
    /// Replayed packets are dropped. Keep-alives are dropped too and reported
    /// by the returned flag. Any other failure aborts the whole batch.
    pub fn decrypt_many<P: AsRef<[u8]>>(
        &mut self,
        packets: &[P],
    ) -> Result<(Vec<Vec<u8>>, bool), Error> {
        let mut payloads = Vec::with_capacity(packets.len());
        let mut keep_alive = false;
        for packet in packets {
            let decrypted = self.decrypt_and_parse(packet.as_ref())?;
            if self.replay.is_replayed(decrypted.packet_id) {
                trace!(packet_id = decrypted.packet_id, "replayed packet dropped");
                continue;
            }
            self.packet_ids.inbound = self.replay.highest();
            if decrypted.keep_alive {
                keep_alive = true;
                continue;
            }
            payloads.push(decrypted.payload);
        }
        Ok((payloads, keep_alive))
    }

    /// Restarts packet numbering and forgets the replay history.
    pub fn reset(&mut self) {
        self.packet_ids.reset();
        self.replay.reset();
    }
}

impl Debug for DataPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let engine: &dyn Debug = match &self.codec.engine {
            Engine::Aead(ctx) => ctx,
            Engine::HmacCbc(ctx) => ctx,
            Engine::Mock => &"Mock",
        };
        f.debug_struct("DataPath")
            .field("engine", engine)
            .field("framing", &self.codec.framing)
            .field("peer_id", &self.codec.peer_id)
            .field("packet_ids", &self.packet_ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{crypto::tests::test_keys, packet::ping_payload};

    const FRAMINGS: [CompressionFraming; 4] = [
        CompressionFraming::Disabled,
        CompressionFraming::CompLzo,
        CompressionFraming::Compress,
        CompressionFraming::CompressV2,
    ];

    fn data_path_pair(
        mode: CryptoMode,
        framing: CompressionFraming,
        peer_id: Option<u32>,
    ) -> (DataPath, DataPath) {
        let with_cipher = match mode {
            CryptoMode::Aead { .. } => true,
            CryptoMode::HmacCbc { cipher, .. } => cipher.is_some(),
            CryptoMode::Mock => false,
        };
        let keys = test_keys(with_cipher);
        let config = |keys| {
            let builder = DataPathConfig::builder_with_keys(keys)
                .with_crypto_mode(mode)
                .with_compression_framing(framing);
            match peer_id {
                Some(peer_id) => builder.with_peer_id(peer_id).unwrap(),
                None => builder,
            }
        };
        let local = DataPath::new(config(keys.swapped())).unwrap();
        let remote = DataPath::new(config(keys)).unwrap();
        (local, remote)
    }

    fn test_round_trip(mode: CryptoMode) {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for framing in FRAMINGS {
            let (mut local, mut remote) = data_path_pair(mode, framing, None);

            let payload = 0x11223344u32.to_be_bytes();
            let packet = local.assemble_and_encrypt(0, 0x1234, &payload).unwrap();
            let decrypted = remote.decrypt_and_parse(&packet).unwrap();
            assert_eq!(decrypted.packet_id, 0x1234);
            assert_eq!(decrypted.payload, payload);
            assert!(!decrypted.keep_alive);

            // the split steps agree with the fused ones
            let assembled = local.assemble(0x1234, &payload);
            let packet = local.encrypt(0, 0x1234, &assembled).unwrap();
            let (packet_id, decrypted) = remote.decrypt(&packet).unwrap();
            assert_eq!(packet_id, 0x1234);
            assert_eq!(decrypted, assembled);
            assert_eq!(remote.parse(&decrypted).unwrap().0, payload);

            let payloads: Vec<Vec<u8>> = (0..10)
                .map(|_| {
                    let len = rng.random_range(1..1500);
                    (0..len).map(|_| rng.random()).collect()
                })
                .collect();
            let packets = local.encrypt_many(&payloads, 1).unwrap();
            let (decrypted, keep_alive) = remote.decrypt_many(&packets).unwrap();
            assert_eq!(decrypted, payloads, "{mode:?} {framing:?}");
            assert!(!keep_alive);

            // one byte repeated, so framing bytes show up at both ends
            let payloads: Vec<Vec<u8>> = (0..10)
                .map(|_| vec![rng.random::<u8>(); rng.random_range(1..1500)])
                .collect();
            let packets = local.encrypt_many(&payloads, 1).unwrap();
            let (decrypted, _) = remote.decrypt_many(&packets).unwrap();
            assert_eq!(decrypted, payloads, "{mode:?} {framing:?}");
        }
    }

    #[test]
    fn test_round_trip_mock() {
        test_round_trip(CryptoMode::Mock);
    }

    #[test]
    fn test_round_trip_aes_128_gcm() {
        test_round_trip(CryptoMode::aead(CipherAlgorithm::Aes128Gcm));
    }

    #[test]
    fn test_round_trip_chacha20_poly1305() {
        test_round_trip(CryptoMode::aead(CipherAlgorithm::ChaCha20Poly1305));
    }

    #[test]
    fn test_round_trip_aes_128_cbc_sha1() {
        test_round_trip(CryptoMode::hmac_cbc(Some(CipherAlgorithm::Aes128Cbc), Digest::Sha1));
    }

    #[test]
    fn test_round_trip_hmac_only() {
        test_round_trip(CryptoMode::hmac_cbc(None, Digest::Sha1));
    }

    #[test]
    fn test_mock_layout() {
        let (mut local, _) = data_path_pair(CryptoMode::Mock, CompressionFraming::CompLzo, None);
        let packet = local
            .assemble_and_encrypt(2, 0x01020304, &[0xaa, 0xbb])
            .unwrap();
        assert_eq!(packet, [0x32, 0x01, 0x02, 0x03, 0x04, 0xfa, 0xaa, 0xbb]);
    }

    #[test]
    fn test_aead_layout() {
        let (mut local, _) = data_path_pair(
            CryptoMode::aead(CipherAlgorithm::Aes128Gcm),
            CompressionFraming::Disabled,
            None,
        );
        let packet = local.assemble_and_encrypt(1, 7, &[0u8; 10]).unwrap();
        assert_eq!(packet.len(), 1 + 4 + 16 + 10);
        assert_eq!(&packet[..5], [0x31, 0, 0, 0, 7]);
    }

    #[test]
    fn test_compress_v2_magic_bytes() {
        let payload = [0x50, 0x01, 0x02];
        let (local, remote) = data_path_pair(CryptoMode::Mock, CompressionFraming::CompressV2, None);
        let assembled = local.assemble(1, &payload);
        assert_eq!(assembled, [0, 0, 0, 1, 0x50, 0x00, 0x50, 0x01, 0x02]);
        assert_eq!(remote.parse(&assembled).unwrap(), (payload.to_vec(), 0x50));

        let (mut local, mut remote) = data_path_pair(
            CryptoMode::aead(CipherAlgorithm::Aes256Gcm),
            CompressionFraming::CompressV2,
            None,
        );
        let packets = local.encrypt_many(&[payload], 0).unwrap();
        assert_eq!(remote.decrypt_many(&packets).unwrap().0, [payload.to_vec()]);
    }

    #[test]
    fn test_compress_v2_single_bytes() {
        let payloads = [[0xfb], [0x66], [0x50], [0x00]];
        for mode in [CryptoMode::Mock, CryptoMode::aead(CipherAlgorithm::Aes128Gcm)] {
            let (mut local, mut remote) =
                data_path_pair(mode, CompressionFraming::CompressV2, None);
            let packets = local.encrypt_many(&payloads, 0).unwrap();
            let (decrypted, keep_alive) = remote.decrypt_many(&packets).unwrap();
            assert_eq!(decrypted, payloads.map(|b| b.to_vec()));
            assert!(!keep_alive);
        }
    }

    #[test]
    fn test_keep_alive() {
        let (mut local, mut remote) = data_path_pair(
            CryptoMode::aead(CipherAlgorithm::Aes128Gcm),
            CompressionFraming::CompLzo,
            None,
        );
        let payloads = [ping_payload(), b"data".as_slice(), ping_payload()];
        let packets = local.encrypt_many(&payloads, 0).unwrap();
        let (decrypted, keep_alive) = remote.decrypt_many(&packets).unwrap();
        assert_eq!(decrypted, [b"data".to_vec()]);
        assert!(keep_alive);

        let decrypted = remote
            .decrypt_and_parse(&local.assemble_and_encrypt(0, 99, ping_payload()).unwrap())
            .unwrap();
        assert!(decrypted.keep_alive);
        assert_eq!(decrypted.header, 0xfa);
    }

    #[test]
    fn test_replay_dropped() {
        let (mut local, mut remote) = data_path_pair(
            CryptoMode::hmac_cbc(Some(CipherAlgorithm::Aes256Cbc), Digest::Sha256),
            CompressionFraming::Disabled,
            None,
        );
        let packets = local.encrypt_many(&[b"one", b"two", b"six"], 0).unwrap();
        let replayed = [
            &packets[0],
            &packets[1],
            &packets[0],
            &packets[2],
            &packets[1],
        ];
        let (decrypted, _) = remote.decrypt_many(&replayed).unwrap();
        assert_eq!(decrypted, [b"one".to_vec(), b"two".to_vec(), b"six".to_vec()]);

        // a second batch is still checked against the first
        let (decrypted, _) = remote.decrypt_many(&packets).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_outbound_ids() {
        let (mut local, remote) = data_path_pair(CryptoMode::Mock, CompressionFraming::Disabled, None);
        let packets = local.encrypt_many(&[b"a", b"b"], 0).unwrap();
        assert_eq!(remote.decrypt(&packets[0]).unwrap().0, 1);
        assert_eq!(remote.decrypt(&packets[1]).unwrap().0, 2);

        local.reset();
        let packets = local.encrypt_many(&[b"c"], 0).unwrap();
        assert_eq!(remote.decrypt(&packets[0]).unwrap().0, 1);
    }

    #[test]
    fn test_overflow() {
        let (mut local, mut remote) = data_path_pair(
            CryptoMode::aead(CipherAlgorithm::Aes128Gcm),
            CompressionFraming::Disabled,
            None,
        );
        let packet = local
            .assemble_and_encrypt(0, u32::MAX - 5, b"late")
            .unwrap();
        assert_eq!(
            remote.decrypt_many(&[packet]),
            Err(Error::DataPath(DataPathError::Overflow))
        );

        local.packet_ids.outbound = PACKET_ID_OVERFLOW;
        assert_eq!(local.encrypt_many(&[b"last"], 0).unwrap().len(), 1);
        assert_eq!(
            local.encrypt_many(&[b"too far"], 0),
            Err(Error::DataPath(DataPathError::Overflow))
        );
    }

    #[test]
    fn test_peer_id() {
        let mode = CryptoMode::aead(CipherAlgorithm::Aes128Gcm);
        let (mut local, mut remote) = data_path_pair(mode, CompressionFraming::Disabled, Some(0x123456));
        let packet = local.assemble_and_encrypt(3, 1, b"payload").unwrap();
        assert_eq!(&packet[..4], [0x4b, 0x12, 0x34, 0x56]);
        assert_eq!(remote.decrypt_and_parse(&packet).unwrap().payload, b"payload");

        // the header is authenticated
        let mut tampered = packet.clone();
        tampered[0] = 0x4a;
        assert_eq!(
            remote.decrypt(&tampered),
            Err(Error::DataPath(DataPathError::AuthenticationFailed))
        );

        let (_, mut other) = data_path_pair(mode, CompressionFraming::Disabled, Some(0x654321));
        assert_eq!(
            other.decrypt_and_parse(&packet),
            Err(Error::DataPath(DataPathError::PeerIdMismatch {
                expected: 0x654321,
                received: 0x123456,
            }))
        );

        // P_DATA_V1 carries no peer id and is accepted either way
        let (mut v1, mut unassigned) = data_path_pair(mode, CompressionFraming::Disabled, None);
        let packet = v1.assemble_and_encrypt(0, 1, b"v1").unwrap();
        assert_eq!(packet[0], 0x30);
        assert_eq!(remote.decrypt_and_parse(&packet).unwrap().payload, b"v1");

        // without an assigned peer id, any P_DATA_V2 id is a mismatch
        let v2 = local.assemble_and_encrypt(3, 2, b"v2").unwrap();
        assert_eq!(
            unassigned.decrypt_and_parse(&v2),
            Err(Error::DataPath(DataPathError::PeerIdMismatch {
                expected: 0xffffff,
                received: 0x123456,
            }))
        );
    }

    #[test]
    fn test_lzo_refused() {
        let (local, mut remote) = data_path_pair(CryptoMode::Mock, CompressionFraming::CompLzo, None);
        let packet = local.encrypt(0, 1, &[0, 0, 0, 1, 0x66, 0x01]).unwrap();
        assert_eq!(
            remote.decrypt_and_parse(&packet),
            Err(Error::DataPath(DataPathError::Compression { header: 0x66 }))
        );
    }

    #[test]
    fn test_tampering() {
        for mode in [
            CryptoMode::aead(CipherAlgorithm::Aes256Gcm),
            CryptoMode::hmac_cbc(Some(CipherAlgorithm::Aes128Cbc), Digest::Sha1),
            CryptoMode::hmac_cbc(None, Digest::Sha512),
        ] {
            let (mut local, mut remote) = data_path_pair(mode, CompressionFraming::Disabled, None);
            let mut packet = local.assemble_and_encrypt(0, 1, b"payload").unwrap();
            let last = packet.len() - 1;
            packet[last] ^= 0x01;
            assert_eq!(
                remote.decrypt_and_parse(&packet),
                Err(Error::DataPath(DataPathError::AuthenticationFailed)),
                "{mode:?}"
            );
        }
    }

    #[test]
    fn test_malformed() {
        let (_, remote) = data_path_pair(
            CryptoMode::aead(CipherAlgorithm::Aes128Gcm),
            CompressionFraming::Disabled,
            None,
        );
        let malformed = Err(Error::DataPath(DataPathError::Malformed));
        assert_eq!(remote.decrypt(&[]), malformed);
        assert_eq!(remote.decrypt(&[0x30, 0, 0, 0, 1]), malformed);
        // control opcode
        assert_eq!(remote.decrypt(&[0x20; 40]), malformed);

        let (_, remote) = data_path_pair(
            CryptoMode::hmac_cbc(Some(CipherAlgorithm::Aes128Cbc), Digest::Sha1),
            CompressionFraming::Disabled,
            None,
        );
        assert_eq!(remote.decrypt(&[0x30; 36]), malformed);

        let (_, remote) = data_path_pair(CryptoMode::Mock, CompressionFraming::Disabled, None);
        assert_eq!(remote.decrypt(&[0x30, 0, 0]), malformed);
        assert_eq!(
            remote.parse(&[0, 0]),
            Err(Error::DataPath(DataPathError::Malformed))
        );
    }

    #[test]
    fn test_invalid_mode() {
        let keys = test_keys(true);
        let config = |mode| {
            DataPathConfig::builder_with_keys(keys.clone())
                .with_crypto_mode(mode)
                .with_default_framing()
        };
        assert_eq!(
            DataPath::new(config(CryptoMode::aead(CipherAlgorithm::Aes128Cbc))).unwrap_err(),
            Error::Algorithm("AES-128-CBC".into())
        );
        assert_eq!(
            DataPath::new(config(CryptoMode::Aead {
                cipher: CipherAlgorithm::Aes128Gcm,
                tag_len: 16,
                id_len: 8,
            }))
            .unwrap_err(),
            Error::Creation
        );
        assert_eq!(
            DataPath::new(config(CryptoMode::hmac_cbc(
                Some(CipherAlgorithm::Aes128Gcm),
                Digest::Sha1
            )))
            .unwrap_err(),
            Error::Algorithm("AES-128-GCM".into())
        );

        let no_cipher = test_keys(false);
        assert_eq!(
            DataPath::new(
                DataPathConfig::builder_with_keys(no_cipher)
                    .with_crypto_mode(CryptoMode::aead(CipherAlgorithm::Aes128Gcm))
                    .with_default_framing()
            )
            .unwrap_err(),
            Error::Creation
        );
    }

    #[test]
    fn test_buffers_grow() {
        let (mut local, mut remote) = data_path_pair(
            CryptoMode::aead(CipherAlgorithm::Aes128Gcm),
            CompressionFraming::Disabled,
            None,
        );
        assert!(local.buffers.assembled.capacity() >= BUFFER_INITIAL_CAPACITY);

        let payload = vec![0x5a; 100 * 1024];
        let packet = local.assemble_and_encrypt(0, 1, &payload).unwrap();
        assert!(local.buffers.assembled.capacity() >= payload.len());
        assert_eq!(remote.decrypt_and_parse(&packet).unwrap().payload, payload);
        assert!(remote.buffers.decrypted.capacity() >= packet.len());
    }
}
