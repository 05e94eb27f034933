//! The informal specification of the OpenVPN secure-channel wire format.

// Opcode byte:
// ```text
// |   code   | key_id |
// |  5 bits  | 3 bits |
// ```
pub(crate) const OPCODE_LEN: usize = 1;
pub(crate) const OPCODE_SHIFT: u8 = 3;
pub(crate) const KEY_ID_MASK: u8 = 0x07;

// Data packet, AEAD:
// ```text
// | opcode | peer_id | packet_id | tag | ciphertext |
// |   1B   |   3B    |     4B    | 16B |  variable  |
// |   <- header ->   |         <- AD = packet_id (or header | packet_id)
// ```
//
// Data packet, HMAC + CBC:
// ```text
// | opcode | peer_id |   hmac   | iv  | CBC(packet_id | payload) |
// |   1B   |   3B    | 20B..64B | 16B |         variable         |
// ```
//
// Without a cipher the `iv` is absent and `packet_id | payload` is in clear.
// The peer id is only present in `P_DATA_V2` packets.
pub(crate) const PACKET_ID_LEN: usize = 4;
pub(crate) const PEER_ID_LEN: usize = 3;
pub(crate) const DATA_V2_HEADER_LEN: usize = OPCODE_LEN + PEER_ID_LEN;
pub(crate) const PEER_ID_DISABLED: u32 = 0x00ff_ffff;
pub(crate) const AEAD_TAG_LEN: usize = 16;

/// Packet ids above this value are refused, leaving the peer room to
/// renegotiate before the counter wraps.
pub(crate) const PACKET_ID_OVERFLOW: u32 = u32::MAX - 10240;

// Keep-alive payload, matched after decryption and parsing.
pub(crate) const PING_STRING: [u8; 16] = [
    0x2a, 0x18, 0x7b, 0xf3, 0x64, 0x1e, 0xb4, 0xcb, 0x07, 0xed, 0x2d, 0x0a, 0x98, 0x1f, 0xc7, 0x48,
];

// Control packet, plain:
// ```text
// | opcode | session_id | ack_len | ack_ids  | remote_session_id | packet_id | payload  |
// |   1B   |     8B     |    1B   | 4B * len |  8B (if ack_len)  |    4B     | variable |
// ```
//
// `ACK_V1` packets stop after the remote session id.
pub(crate) const SESSION_ID_LEN: usize = 8;
pub(crate) const ACK_LEN_LEN: usize = 1;
pub(crate) const ACK_ID_LEN: usize = 4;
pub(crate) const CONTROL_HEADER_LEN: usize = OPCODE_LEN + SESSION_ID_LEN;

// Control packet, tls-auth:
// ```text
// | opcode | session_id |   hmac   | replay_id | timestamp | ack_len | ... |
// |   1B   |     8B     | 20B..64B |    4B     |    4B     |    1B   |     |
// ```
//
// The HMAC covers `replay_id | timestamp | opcode | session_id | ack_len | ...`.
pub(crate) const REPLAY_ID_LEN: usize = 4;
pub(crate) const TIMESTAMP_LEN: usize = 4;
pub(crate) const REPLAY_LEN: usize = REPLAY_ID_LEN + TIMESTAMP_LEN;

// Control packet, tls-crypt:
// ```text
// | opcode | session_id | replay_id | timestamp | tag | CTR(ack_len | ...) |
// |   1B   |     8B     |    4B     |    4B     | 32B |      variable      |
// |                 <- AD ->                    |
// ```
//
// The tag is an HMAC-SHA256 over `AD | plaintext`, its first 16 bytes are
// the CTR IV.
pub(crate) const CRYPT_AD_LEN: usize = CONTROL_HEADER_LEN + REPLAY_LEN; // 17
pub(crate) const CRYPT_TAG_LEN: usize = 32;

// Compression framing bytes.
pub(crate) const NO_COMPRESS: u8 = 0xfa;
pub(crate) const NO_COMPRESS_SWAP: u8 = 0xfb;
pub(crate) const LZO_COMPRESS: u8 = 0x66;
pub(crate) const V2_INDICATOR: u8 = 0x50;
pub(crate) const V2_UNCOMPRESSED: u8 = 0x00;

// Obfuscated stream record:
// ```text
// |  len  | obfuscated packet |
// |  2B   |     len bytes     |
// ```
pub(crate) const STREAM_LEN_LEN: usize = 2;

// Data path scratch buffers.
pub(crate) const BUFFER_INITIAL_CAPACITY: usize = 64 * 1024;
pub(crate) const BUFFER_GROWTH_STEP: usize = 1024;
