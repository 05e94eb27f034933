//! Opcodes and header helpers shared by the data path and the control channel.

use crate::{
    error::{ControlChannelError, DataPathError},
    specification::{DATA_V2_HEADER_LEN, KEY_ID_MASK, OPCODE_LEN, OPCODE_SHIFT, PING_STRING},
};

/// Packet codes, the high 5 bits of the opcode byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum PacketCode {
    /// `P_CONTROL_SOFT_RESET_V1`
    SoftResetV1,
    /// `P_CONTROL_V1`
    ControlV1,
    /// `P_ACK_V1`
    AckV1,
    /// `P_DATA_V1`
    DataV1,
    /// `P_CONTROL_HARD_RESET_CLIENT_V2`
    HardResetClientV2,
    /// `P_CONTROL_HARD_RESET_SERVER_V2`
    HardResetServerV2,
    /// `P_DATA_V2`
    DataV2,
}

impl PacketCode {
    /// Returns `true` for the data-channel codes.
    pub fn is_data(&self) -> bool {
        matches!(self, PacketCode::DataV1 | PacketCode::DataV2)
    }
}

impl From<PacketCode> for u8 {
    fn from(code: PacketCode) -> u8 {
        match code {
            PacketCode::SoftResetV1 => 3,
            PacketCode::ControlV1 => 4,
            PacketCode::AckV1 => 5,
            PacketCode::DataV1 => 6,
            PacketCode::HardResetClientV2 => 7,
            PacketCode::HardResetServerV2 => 8,
            PacketCode::DataV2 => 9,
        }
    }
}

impl TryFrom<u8> for PacketCode {
    type Error = ControlChannelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(PacketCode::SoftResetV1),
            4 => Ok(PacketCode::ControlV1),
            5 => Ok(PacketCode::AckV1),
            6 => Ok(PacketCode::DataV1),
            7 => Ok(PacketCode::HardResetClientV2),
            8 => Ok(PacketCode::HardResetServerV2),
            9 => Ok(PacketCode::DataV2),
            _ => Err(ControlChannelError::UnknownCode(value)),
        }
    }
}

/// Packs a code and a key id into an opcode byte.
pub fn opcode(code: PacketCode, key_id: u8) -> u8 {
    (u8::from(code) << OPCODE_SHIFT) | (key_id & KEY_ID_MASK)
}

/// Splits an opcode byte into its raw code and key id.
pub fn split_opcode(opcode: u8) -> (u8, u8) {
    (opcode >> OPCODE_SHIFT, opcode & KEY_ID_MASK)
}

/// Reads the packet code of a link packet, used to route it to the data path
/// or to the control channel.
pub fn packet_code(packet: &[u8]) -> Result<PacketCode, ControlChannelError> {
    let first = packet.first().ok_or(ControlChannelError::MissingOpcode)?;
    PacketCode::try_from(split_opcode(*first).0)
}

/// Appends the data header for `key_id` to `dst`: `P_DATA_V1` without a peer
/// id, `P_DATA_V2` followed by the 24-bit peer id otherwise.
pub(crate) fn put_data_header(dst: &mut Vec<u8>, key_id: u8, peer_id: Option<u32>) {
    match peer_id {
        Some(peer_id) => {
            dst.push(opcode(PacketCode::DataV2, key_id));
            dst.extend_from_slice(&peer_id.to_be_bytes()[1..]);
        }
        None => dst.push(opcode(PacketCode::DataV1, key_id)),
    }
}

/// The data header at the front of `packet`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct DataHeader {
    pub(crate) key_id: u8,
    pub(crate) peer_id: Option<u32>,
    pub(crate) len: usize,
}

/// Reads the data header at the front of `packet`.
///
/// A `P_DATA_V2` header always reports its peer id, the disabled value
/// included.
pub(crate) fn data_header(packet: &[u8]) -> Result<DataHeader, DataPathError> {
    let first = *packet.first().ok_or(DataPathError::Malformed)?;
    let (code, key_id) = split_opcode(first);
    match PacketCode::try_from(code) {
        Ok(PacketCode::DataV1) => Ok(DataHeader {
            key_id,
            peer_id: None,
            len: OPCODE_LEN,
        }),
        Ok(PacketCode::DataV2) => {
            let bytes = packet
                .get(OPCODE_LEN..DATA_V2_HEADER_LEN)
                .ok_or(DataPathError::Malformed)?;
            let peer_id = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
            Ok(DataHeader {
                key_id,
                peer_id: Some(peer_id),
                len: DATA_V2_HEADER_LEN,
            })
        }
        _ => Err(DataPathError::Malformed),
    }
}

/// Returns `true` if `payload` is the keep-alive message.
pub fn is_ping(payload: &[u8]) -> bool {
    payload == PING_STRING
}

/// The keep-alive message sent over the data channel.
pub fn ping_payload() -> &'static [u8] {
    &PING_STRING
}

/// Copies `src` into `dst` with the block `src[prefix..prefix + len]` moved
/// to the front: `a | b | rest` becomes `b | a | rest`.
pub(crate) fn swap_copy(dst: &mut Vec<u8>, src: &[u8], prefix: usize, len: usize) {
    dst.extend_from_slice(&src[prefix..prefix + len]);
    dst.extend_from_slice(&src[..prefix]);
    dst.extend_from_slice(&src[prefix + len..]);
}
