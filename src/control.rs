//! Control channel packets and their serializers.
//!
//! A [`ControlPacket`] always encodes to the same plain layout. The
//! [`ControlChannelSerializer`] then optionally wraps it with a static key:
//!
//! * `Plain`: no wrapping.
//! * `Auth` (`tls-auth`): an HMAC over the packet, a replay id and a
//!   timestamp.
//! * `Crypt` (`tls-crypt`): the packet body is encrypted with AES-256-CTR and
//!   authenticated with HMAC-SHA256.
//!
//! # Example
//!
//! ```
//! use ovpnwire::{ControlChannelSerializer, ControlPacket, KeyDirection, PacketCode, StaticKey};
//!
//! let key = [0x42u8; StaticKey::LENGTH];
//! let mut client =
//!     ControlChannelSerializer::crypt(&StaticKey::new(&key, Some(KeyDirection::Client))?)?;
//! let mut server =
//!     ControlChannelSerializer::crypt(&StaticKey::new(&key, Some(KeyDirection::Server))?)?;
//!
//! let packet = ControlPacket::new(
//!     PacketCode::HardResetClientV2,
//!     0,
//!     0,
//!     [1, 2, 3, 4, 5, 6, 7, 8],
//!     None,
//! );
//! let wire = client.serialize(&packet)?;
//! assert_eq!(server.deserialize(&wire)?, packet);
//! # Ok::<(), ovpnwire::Error>(())
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, trace};

use crate::{
    config::{TlsWrap, TlsWrapStrategy},
    crypto::{CbcContext, CipherAlgorithm, CryptoFlags, CtrContext, Digest},
    error::{ControlChannelError, Error},
    keys::StaticKey,
    packet::{PacketCode, opcode, split_opcode, swap_copy},
    replay::BidirectionalState,
    specification::{
        ACK_ID_LEN, ACK_LEN_LEN, CONTROL_HEADER_LEN, CRYPT_AD_LEN, CRYPT_TAG_LEN, OPCODE_LEN,
        PACKET_ID_LEN, REPLAY_ID_LEN, REPLAY_LEN, SESSION_ID_LEN,
    },
};

/// A control channel packet.
///
/// Packets are immutable once built. Pure acknowledgements carry the
/// [`PacketCode::AckV1`] code, no payload and the packet id `u32::MAX`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ControlPacket {
    code: PacketCode,
    key: u8,
    packet_id: u32,
    session_id: [u8; SESSION_ID_LEN],
    payload: Option<Vec<u8>>,
    ack_ids: Option<Vec<u32>>,
    ack_remote_session_id: Option<[u8; SESSION_ID_LEN]>,
}

impl ControlPacket {
    /// Creates a packet without acknowledgements.
    pub fn new(
        code: PacketCode,
        key: u8,
        packet_id: u32,
        session_id: [u8; SESSION_ID_LEN],
        payload: Option<Vec<u8>>,
    ) -> Self {
        Self {
            code,
            key,
            packet_id,
            session_id,
            payload,
            ack_ids: None,
            ack_remote_session_id: None,
        }
    }

    /// Creates a pure acknowledgement of `ack_ids`.
    ///
    /// Fails with [`ControlChannelError::AckWithoutIds`] if `ack_ids` is
    /// empty, since peers refuse such packets.
    pub fn ack(
        key: u8,
        session_id: [u8; SESSION_ID_LEN],
        ack_ids: Vec<u32>,
        remote_session_id: [u8; SESSION_ID_LEN],
    ) -> Result<Self, ControlChannelError> {
        if ack_ids.is_empty() {
            return Err(ControlChannelError::AckWithoutIds);
        }
        Ok(Self::new(PacketCode::AckV1, key, u32::MAX, session_id, None)
            .with_acks(ack_ids, remote_session_id))
    }

    /// Piggybacks acknowledgements of `ack_ids` on the packet.
    ///
    /// At most 255 ids fit in a packet, the rest are ignored. An empty list
    /// clears the acknowledgements.
    pub fn with_acks(mut self, mut ack_ids: Vec<u32>, remote_session_id: [u8; SESSION_ID_LEN]) -> Self {
        if ack_ids.is_empty() {
            self.ack_ids = None;
            self.ack_remote_session_id = None;
            return self;
        }
        ack_ids.truncate(u8::MAX as usize);
        self.ack_ids = Some(ack_ids);
        self.ack_remote_session_id = Some(remote_session_id);
        self
    }

    /// The packet code.
    pub fn code(&self) -> PacketCode {
        self.code
    }

    /// The key id.
    pub fn key(&self) -> u8 {
        self.key
    }

    /// The packet id, `u32::MAX` for pure acknowledgements.
    pub fn packet_id(&self) -> u32 {
        self.packet_id
    }

    /// The sender session id.
    pub fn session_id(&self) -> &[u8; SESSION_ID_LEN] {
        &self.session_id
    }

    /// The TLS payload, if any.
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// The acknowledged packet ids, if any.
    pub fn ack_ids(&self) -> Option<&[u32]> {
        self.ack_ids.as_deref()
    }

    /// The session id of the acknowledged peer, if any.
    pub fn ack_remote_session_id(&self) -> Option<&[u8; SESSION_ID_LEN]> {
        self.ack_remote_session_id.as_ref()
    }

    /// Returns `true` for pure acknowledgements.
    pub fn is_ack(&self) -> bool {
        self.code == PacketCode::AckV1
    }

    fn header(&self) -> [u8; CONTROL_HEADER_LEN] {
        let mut header = [0u8; CONTROL_HEADER_LEN];
        header[0] = opcode(self.code, self.key);
        header[OPCODE_LEN..].copy_from_slice(&self.session_id);
        header
    }

    /// Appends everything after the header.
    fn put_body(&self, dst: &mut Vec<u8>) {
        let ack_ids = self.ack_ids.as_deref().unwrap_or_default();
        dst.push(ack_ids.len() as u8);
        if !ack_ids.is_empty() {
            for id in ack_ids {
                dst.extend_from_slice(&id.to_be_bytes());
            }
            dst.extend_from_slice(&self.ack_remote_session_id.unwrap_or_default());
        }
        if !self.is_ack() {
            dst.extend_from_slice(&self.packet_id.to_be_bytes());
            if let Some(payload) = &self.payload {
                dst.extend_from_slice(payload);
            }
        }
    }

    fn serialized_len(&self) -> usize {
        let ack_len = self.ack_ids.as_ref().map_or(0, Vec::len);
        let acks = if ack_len > 0 {
            ack_len * ACK_ID_LEN + SESSION_ID_LEN
        } else {
            0
        };
        let rest = if self.is_ack() {
            0
        } else {
            PACKET_ID_LEN + self.payload.as_ref().map_or(0, Vec::len)
        };
        CONTROL_HEADER_LEN + ACK_LEN_LEN + acks + rest
    }

    /// Encodes the packet in the plain layout.
    pub fn serialize(&self) -> Vec<u8> {
        let mut dst = Vec::with_capacity(self.serialized_len());
        dst.extend_from_slice(&self.header());
        self.put_body(&mut dst);
        dst
    }

    /// Decodes a packet in the plain layout.
    pub fn deserialize(data: &[u8]) -> Result<Self, ControlChannelError> {
        let mut reader = Reader(data);

        let (code, key) = split_opcode(reader.take::<1>(ControlChannelError::MissingOpcode)?[0]);
        let code = PacketCode::try_from(code)?;
        let session_id = reader.take::<SESSION_ID_LEN>(ControlChannelError::MissingSessionId)?;
        let ack_len = reader.take::<ACK_LEN_LEN>(ControlChannelError::MissingAckSize)?[0];

        let (ack_ids, ack_remote_session_id) = if ack_len > 0 {
            let ack_ids = (0..ack_len)
                .map(|_| {
                    reader
                        .take::<ACK_ID_LEN>(ControlChannelError::MissingAcks)
                        .map(u32::from_be_bytes)
                })
                .collect::<Result<Vec<_>, _>>()?;
            let remote = reader.take::<SESSION_ID_LEN>(ControlChannelError::MissingRemoteSessionId)?;
            (Some(ack_ids), Some(remote))
        } else {
            (None, None)
        };

        let (packet_id, payload) = if code == PacketCode::AckV1 {
            if ack_ids.is_none() {
                return Err(ControlChannelError::AckWithoutIds);
            }
            (u32::MAX, None)
        } else {
            let packet_id = u32::from_be_bytes(reader.take::<PACKET_ID_LEN>(ControlChannelError::MissingPacketId)?);
            let rest = reader.0;
            (packet_id, (!rest.is_empty()).then(|| rest.to_vec()))
        };

        Ok(Self {
            code,
            key,
            packet_id,
            session_id,
            payload,
            ack_ids,
            ack_remote_session_id,
        })
    }
}

/// Cursor over a control packet.
struct Reader<'a>(&'a [u8]);

impl Reader<'_> {
    fn take<const N: usize>(&mut self, missing: ControlChannelError) -> Result<[u8; N], ControlChannelError> {
        let Some((head, rest)) = self.0.split_first_chunk::<N>() else {
            return Err(missing);
        };
        self.0 = rest;
        Ok(*head)
    }
}

fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as u32)
}

/// Replay id and timestamp sent with every wrapped packet.
#[derive(Clone, Debug)]
struct ReplayStamp {
    replay_ids: BidirectionalState<u32>,
    timestamp: u32,
}

impl ReplayStamp {
    fn new() -> Self {
        Self {
            replay_ids: BidirectionalState::new(1),
            timestamp: unix_timestamp(),
        }
    }

    fn next(&mut self, timestamp: u32) -> [u8; REPLAY_LEN] {
        let mut stamp = [0u8; REPLAY_LEN];
        stamp[..REPLAY_ID_LEN].copy_from_slice(&self.replay_ids.next_outbound().to_be_bytes());
        stamp[REPLAY_ID_LEN..].copy_from_slice(&timestamp.to_be_bytes());
        stamp
    }

    // TODO: reject inbound replay ids once the backtrack policy for
    // reordered TCP control packets is settled.
    fn observe(&mut self, stamp: &[u8]) {
        let mut id = [0u8; REPLAY_ID_LEN];
        id.copy_from_slice(&stamp[..REPLAY_ID_LEN]);
        let mut timestamp = [0u8; REPLAY_LEN - REPLAY_ID_LEN];
        timestamp.copy_from_slice(&stamp[REPLAY_ID_LEN..REPLAY_LEN]);

        let replay_id = u32::from_be_bytes(id);
        trace!(
            replay_id,
            timestamp = u32::from_be_bytes(timestamp),
            last = self.replay_ids.inbound,
            "inbound control replay id"
        );
        self.replay_ids.inbound = replay_id;
    }
}

/// `tls-auth` state.
#[derive(Debug)]
pub struct AuthSerializer {
    ctx: CbcContext,
    stamp: ReplayStamp,
}

/// `tls-crypt` state.
#[derive(Debug)]
pub struct CryptSerializer {
    ctx: CtrContext,
    stamp: ReplayStamp,
}

/// Encodes and decodes control packets, optionally wrapped with a static
/// key.
#[derive(Debug)]
pub enum ControlChannelSerializer {
    /// No wrapping.
    Plain,
    /// `tls-auth` wrapping.
    Auth(AuthSerializer),
    /// `tls-crypt` wrapping.
    Crypt(CryptSerializer),
}

impl ControlChannelSerializer {
    /// A serializer for unwrapped packets.
    pub fn plain() -> Self {
        ControlChannelSerializer::Plain
    }

    /// A `tls-auth` serializer.
    ///
    /// Both directions use the same HMAC key if `key` is bidirectional.
    pub fn auth(digest: Digest, key: &StaticKey) -> Result<Self, Error> {
        let keys = key.hmac_keys();
        let ctx = CbcContext::with_keys(None, digest, &keys)?;
        debug!(
            digest = digest.name(),
            direction = ?key.direction(),
            send_key = %keys.hmac.encryption_key.fingerprint(),
            receive_key = %keys.hmac.decryption_key.fingerprint(),
            "tls-auth serializer created"
        );
        Ok(ControlChannelSerializer::Auth(AuthSerializer {
            ctx,
            stamp: ReplayStamp::new(),
        }))
    }

    /// A `tls-crypt` serializer. `key` must have a direction.
    pub fn crypt(key: &StaticKey) -> Result<Self, Error> {
        let keys = key
            .crypt_keys()
            .ok_or(ControlChannelError::MissingKeyDirection)?;
        let ctx = CtrContext::with_keys(CipherAlgorithm::Aes256Ctr, Digest::Sha256, CRYPT_TAG_LEN, &keys)?;
        debug!(direction = ?key.direction(), "tls-crypt serializer created");
        Ok(ControlChannelSerializer::Crypt(CryptSerializer {
            ctx,
            stamp: ReplayStamp::new(),
        }))
    }

    /// The serializer selected by an optional `tls-auth` or `tls-crypt`
    /// setting.
    pub fn with_tls_wrap(tls_wrap: Option<&TlsWrap>) -> Result<Self, Error> {
        match tls_wrap {
            None => Ok(Self::plain()),
            Some(TlsWrap {
                strategy: TlsWrapStrategy::Auth { digest },
                key,
            }) => Self::auth(*digest, key),
            Some(TlsWrap {
                strategy: TlsWrapStrategy::Crypt,
                key,
            }) => Self::crypt(key),
        }
    }

    /// Encodes `packet`, stamped with the timestamp taken at construction.
    pub fn serialize(&mut self, packet: &ControlPacket) -> Result<Vec<u8>, Error> {
        let timestamp = match self {
            ControlChannelSerializer::Plain => 0,
            ControlChannelSerializer::Auth(auth) => auth.stamp.timestamp,
            ControlChannelSerializer::Crypt(crypt) => crypt.stamp.timestamp,
        };
        self.serialize_with_timestamp(packet, timestamp)
    }

    /// Encodes `packet` with an explicit timestamp. Plain packets carry no
    /// timestamp.
    pub fn serialize_with_timestamp(
        &mut self,
        packet: &ControlPacket,
        timestamp: u32,
    ) -> Result<Vec<u8>, Error> {
        match self {
            ControlChannelSerializer::Plain => Ok(packet.serialize()),
            ControlChannelSerializer::Auth(auth) => {
                let digest_len = auth.ctx.digest_len();
                let mut subject = Vec::with_capacity(REPLAY_LEN + packet.serialized_len());
                subject.extend_from_slice(&auth.stamp.next(timestamp));
                subject.extend_from_slice(&packet.header());
                packet.put_body(&mut subject);

                // hmac | replay_id | timestamp | header | body
                let mut signed = Vec::with_capacity(digest_len + subject.len());
                auth.ctx.encrypt(&subject, &mut signed).map_err(ControlChannelError::from)?;

                // header | hmac | replay_id | timestamp | body
                let mut wire = Vec::with_capacity(signed.len());
                swap_copy(&mut wire, &signed, digest_len + REPLAY_LEN, CONTROL_HEADER_LEN);
                Ok(wire)
            }
            ControlChannelSerializer::Crypt(crypt) => {
                let mut wire = Vec::with_capacity(CRYPT_TAG_LEN + REPLAY_LEN + packet.serialized_len());
                wire.extend_from_slice(&packet.header());
                wire.extend_from_slice(&crypt.stamp.next(timestamp));
                let ad = wire.clone();

                let mut body = Vec::with_capacity(packet.serialized_len() - CONTROL_HEADER_LEN);
                packet.put_body(&mut body);
                crypt
                    .ctx
                    .encrypt(&body, &mut wire, &CryptoFlags { iv: &[], ad: &ad })
                    .map_err(ControlChannelError::from)?;
                Ok(wire)
            }
        }
    }

    /// Decodes a packet, verifying and decrypting it first if wrapped.
    pub fn deserialize(&mut self, data: &[u8]) -> Result<ControlPacket, Error> {
        match self {
            ControlChannelSerializer::Plain => Ok(ControlPacket::deserialize(data)?),
            ControlChannelSerializer::Auth(auth) => {
                let digest_len = auth.ctx.digest_len();
                let auth_len = digest_len + REPLAY_LEN;
                if data.len() < CONTROL_HEADER_LEN + auth_len {
                    return Err(ControlChannelError::MissingHmac.into());
                }

                // hmac | replay_id | timestamp | header | body
                let mut canonical = Vec::with_capacity(data.len());
                swap_copy(&mut canonical, data, CONTROL_HEADER_LEN, auth_len);
                auth.ctx.verify(&canonical).map_err(|e| {
                    trace!(len = data.len(), "tls-auth verification failed");
                    ControlChannelError::from(e)
                })?;

                auth.stamp.observe(&canonical[digest_len..auth_len]);
                Ok(ControlPacket::deserialize(&canonical[auth_len..])?)
            }
            ControlChannelSerializer::Crypt(crypt) => {
                if data.len() < CRYPT_AD_LEN + CRYPT_TAG_LEN {
                    return Err(ControlChannelError::MissingAdAndTag.into());
                }
                let (ad, sealed) = data.split_at(CRYPT_AD_LEN);

                let mut plain = Vec::with_capacity(data.len());
                plain.extend_from_slice(&ad[..CONTROL_HEADER_LEN]);
                crypt
                    .ctx
                    .decrypt(sealed, &mut plain, &CryptoFlags { iv: &[], ad })
                    .map_err(|e| {
                        trace!(len = data.len(), "tls-crypt verification failed");
                        ControlChannelError::from(e)
                    })?;

                crypt.stamp.observe(&ad[CONTROL_HEADER_LEN..]);
                Ok(ControlPacket::deserialize(&plain)?)
            }
        }
    }

    /// Hook called when the session is renegotiated. Replay ids keep
    /// counting across renegotiations, so there is nothing to reset.
    pub fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyDirection, tests::sequential_key_bytes};

    const SESSION_ID: [u8; 8] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
    const REMOTE_SESSION_ID: [u8; 8] = [0xa6, 0x39, 0x32, 0x8c, 0xbf, 0x03, 0x49, 0x0e];

    fn data_packet() -> ControlPacket {
        ControlPacket::new(
            PacketCode::ControlV1,
            3,
            0x1456,
            SESSION_ID,
            Some(hex::decode("932748238742397591704891").unwrap()),
        )
    }

    fn ack_packet() -> ControlPacket {
        ControlPacket::ack(3, SESSION_ID, vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee], REMOTE_SESSION_ID)
            .unwrap()
    }

    fn key(direction: Option<KeyDirection>) -> StaticKey {
        StaticKey::new(&sequential_key_bytes(), direction).unwrap()
    }

    fn test_round_trip(local: &mut ControlChannelSerializer, remote: &mut ControlChannelSerializer) {
        for packet in [
            data_packet(),
            ack_packet(),
            data_packet().with_acks(vec![1, 2], REMOTE_SESSION_ID),
            ControlPacket::new(PacketCode::HardResetClientV2, 0, 0, SESSION_ID, None),
        ] {
            let wire = local.serialize(&packet).unwrap();
            assert_eq!(remote.deserialize(&wire).unwrap(), packet);
        }
    }

    #[test]
    fn test_plain_data_packet() {
        let wire = hex::decode("2311223344556677880000001456932748238742397591704891").unwrap();
        let mut serializer = ControlChannelSerializer::plain();
        assert_eq!(serializer.serialize(&data_packet()).unwrap(), wire);
        assert_eq!(serializer.deserialize(&wire).unwrap(), data_packet());
    }

    #[test]
    fn test_plain_ack_packet() {
        let wire = hex::decode(
            "2b112233445566778805000000aa000000bb000000cc000000dd000000eea639328cbf03490e",
        )
        .unwrap();
        let mut serializer = ControlChannelSerializer::plain();
        assert_eq!(serializer.serialize(&ack_packet()).unwrap(), wire);

        let packet = serializer.deserialize(&wire).unwrap();
        assert_eq!(packet, ack_packet());
        assert!(packet.is_ack());
        assert_eq!(packet.packet_id(), u32::MAX);
        assert_eq!(packet.payload(), None);
        assert_eq!(packet.ack_ids(), Some([0xaa, 0xbb, 0xcc, 0xdd, 0xee].as_slice()));
        assert_eq!(packet.ack_remote_session_id(), Some(&REMOTE_SESSION_ID));

        assert_eq!(
            ControlPacket::ack(3, SESSION_ID, vec![], REMOTE_SESSION_ID),
            Err(ControlChannelError::AckWithoutIds)
        );
    }

    #[test]
    fn test_plain_errors() {
        let err = |data: &[u8]| ControlPacket::deserialize(data).unwrap_err();
        assert_eq!(err(&[]), ControlChannelError::MissingOpcode);
        assert_eq!(err(&[0x08]), ControlChannelError::UnknownCode(1));
        assert_eq!(err(&[0x20, 1, 2, 3]), ControlChannelError::MissingSessionId);
        assert_eq!(err(&[0x20, 1, 2, 3, 4, 5, 6, 7, 8]), ControlChannelError::MissingAckSize);
        assert_eq!(
            err(&[0x20, 1, 2, 3, 4, 5, 6, 7, 8, 2, 0, 0, 0, 1]),
            ControlChannelError::MissingAcks
        );
        assert_eq!(
            err(&[0x20, 1, 2, 3, 4, 5, 6, 7, 8, 1, 0, 0, 0, 1, 9]),
            ControlChannelError::MissingRemoteSessionId
        );
        assert_eq!(
            err(&[0x28, 1, 2, 3, 4, 5, 6, 7, 8, 0]),
            ControlChannelError::AckWithoutIds
        );
        assert_eq!(
            err(&[0x20, 1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0]),
            ControlChannelError::MissingPacketId
        );

        // no payload bytes left
        let packet = ControlPacket::deserialize(&[0x20, 1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0, 5]).unwrap();
        assert_eq!(packet.packet_id(), 5);
        assert_eq!(packet.payload(), None);
    }

    #[test]
    fn test_auth_round_trip() {
        let key = key(None);
        let mut local = ControlChannelSerializer::auth(Digest::Sha1, &key).unwrap();
        let mut remote = ControlChannelSerializer::auth(Digest::Sha1, &key).unwrap();
        test_round_trip(&mut local, &mut remote);

        let mut client = ControlChannelSerializer::auth(Digest::Sha256, &self::key(Some(KeyDirection::Client))).unwrap();
        let mut server = ControlChannelSerializer::auth(Digest::Sha256, &self::key(Some(KeyDirection::Server))).unwrap();
        test_round_trip(&mut client, &mut server);
        test_round_trip(&mut server, &mut client);
    }

    #[test]
    fn test_auth_layout() {
        let mut serializer = ControlChannelSerializer::auth(Digest::Sha1, &key(None)).unwrap();
        let packet = data_packet();
        let plain = packet.serialize();

        let wire = serializer.serialize_with_timestamp(&packet, 0x6000_0000).unwrap();
        assert_eq!(wire.len(), plain.len() + 20 + 8);
        assert_eq!(&wire[..9], &plain[..9]);
        assert_eq!(&wire[29..33], [0, 0, 0, 1]);
        assert_eq!(&wire[33..37], [0x60, 0, 0, 0]);
        assert_eq!(&wire[37..], &plain[9..]);

        let wire = serializer.serialize_with_timestamp(&packet, 0x6000_0000).unwrap();
        assert_eq!(&wire[29..33], [0, 0, 0, 2]);
    }

    #[test]
    fn test_auth_errors() {
        let key = key(None);
        let mut local = ControlChannelSerializer::auth(Digest::Sha1, &key).unwrap();
        let mut remote = ControlChannelSerializer::auth(Digest::Sha1, &key).unwrap();

        let mut wire = local.serialize(&data_packet()).unwrap();
        assert_eq!(
            remote.deserialize(&wire[..36]),
            Err(Error::ControlChannel(ControlChannelError::MissingHmac))
        );
        let last = wire.len() - 1;
        wire[last] ^= 1;
        assert_eq!(
            remote.deserialize(&wire),
            Err(Error::ControlChannel(ControlChannelError::AuthenticationFailed))
        );

        let mut other = ControlChannelSerializer::auth(Digest::Sha1, &self::key(Some(KeyDirection::Server))).unwrap();
        let wire = local.serialize(&data_packet()).unwrap();
        assert_eq!(
            other.deserialize(&wire),
            Err(Error::ControlChannel(ControlChannelError::AuthenticationFailed))
        );
    }

    #[test]
    fn test_crypt_round_trip() {
        let mut client = ControlChannelSerializer::crypt(&key(Some(KeyDirection::Client))).unwrap();
        let mut server = ControlChannelSerializer::crypt(&key(Some(KeyDirection::Server))).unwrap();
        test_round_trip(&mut client, &mut server);
        test_round_trip(&mut server, &mut client);
    }

    #[test]
    fn test_crypt_layout() {
        let mut client = ControlChannelSerializer::crypt(&key(Some(KeyDirection::Client))).unwrap();
        let packet = data_packet();
        let plain = packet.serialize();

        let wire = client.serialize_with_timestamp(&packet, 0x6000_0001).unwrap();
        assert_eq!(wire.len(), 17 + 32 + plain.len() - 9);
        assert_eq!(&wire[..9], &plain[..9]);
        assert_eq!(&wire[9..13], [0, 0, 0, 1]);
        assert_eq!(&wire[13..17], [0x60, 0, 0, 1]);
        assert_ne!(&wire[49..], &plain[9..]);
    }

    #[test]
    fn test_crypt_errors() {
        let mut client = ControlChannelSerializer::crypt(&key(Some(KeyDirection::Client))).unwrap();
        let mut server = ControlChannelSerializer::crypt(&key(Some(KeyDirection::Server))).unwrap();

        let mut wire = client.serialize(&ack_packet()).unwrap();
        assert_eq!(
            server.deserialize(&wire[..48]),
            Err(Error::ControlChannel(ControlChannelError::MissingAdAndTag))
        );

        // the header is authenticated
        wire[1] ^= 1;
        assert_eq!(
            server.deserialize(&wire),
            Err(Error::ControlChannel(ControlChannelError::AuthenticationFailed))
        );

        // a packet can't be read back by its sender
        let wire = client.serialize(&ack_packet()).unwrap();
        assert_eq!(
            client.deserialize(&wire),
            Err(Error::ControlChannel(ControlChannelError::AuthenticationFailed))
        );

        assert_eq!(
            ControlChannelSerializer::crypt(&key(None)).unwrap_err(),
            Error::ControlChannel(ControlChannelError::MissingKeyDirection)
        );
    }

    #[test]
    fn test_tls_wrap() {
        assert!(matches!(
            ControlChannelSerializer::with_tls_wrap(None),
            Ok(ControlChannelSerializer::Plain)
        ));
        let wrap = TlsWrap::auth(Digest::Sha512, key(None));
        assert!(matches!(
            ControlChannelSerializer::with_tls_wrap(Some(&wrap)),
            Ok(ControlChannelSerializer::Auth(_))
        ));
        let wrap = TlsWrap::crypt(key(Some(KeyDirection::Client)));
        let mut serializer = ControlChannelSerializer::with_tls_wrap(Some(&wrap)).unwrap();
        assert!(matches!(serializer, ControlChannelSerializer::Crypt(_)));
        serializer.reset();
    }
}
