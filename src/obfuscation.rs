//! Link obfuscation and TCP stream framing.
//!
//! Obfuscation scrambles whole link packets with a cheap reversible
//! transform. It hides the OpenVPN opcodes from naive inspection and is not
//! meant as a security layer.
//!
//! Over TCP, every packet is prefixed with its length as a 2-byte big endian
//! integer. The length itself is never obfuscated.

use core::fmt::{Debug, Formatter};

use tracing::{debug, trace};

use crate::{
    error::{DataPathError, Error},
    specification::STREAM_LEN_LEN,
};

/// A packet scrambling method.
#[derive(Clone, Eq, PartialEq, Hash)]
pub enum ObfuscationMethod {
    /// Packets are sent as is.
    None,

    /// Every byte is XORed with the mask, repeated over the packet.
    XorMask(Vec<u8>),

    /// Every byte is XORed with its 1-based position.
    XorPtrPos,

    /// Everything after the first byte is reversed.
    Reverse,

    /// The combination of the above used by the `xorpatch` scramble mode.
    /// Unlike the other methods, it is not its own inverse.
    XorObfuscate(Vec<u8>),
}

impl Debug for ObfuscationMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ObfuscationMethod::None => write!(f, "None"),
            ObfuscationMethod::XorMask(mask) => write!(f, "XorMask(len: {})", mask.len()),
            ObfuscationMethod::XorPtrPos => write!(f, "XorPtrPos"),
            ObfuscationMethod::Reverse => write!(f, "Reverse"),
            ObfuscationMethod::XorObfuscate(mask) => write!(f, "XorObfuscate(len: {})", mask.len()),
        }
    }
}

/// Which way a packet travels.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    /// From the link to the secure channel.
    Inbound,
    /// From the secure channel to the link.
    Outbound,
}

fn xor_mask(packet: &mut [u8], mask: &[u8]) {
    for (byte, m) in packet.iter_mut().zip(mask.iter().cycle()) {
        *byte ^= m;
    }
}

fn xor_ptr_pos(packet: &mut [u8]) {
    for (i, byte) in packet.iter_mut().enumerate() {
        *byte ^= (i + 1) as u8;
    }
}

fn reverse(packet: &mut [u8]) {
    if packet.len() > 2 {
        packet[1..].reverse();
    }
}

/// Applies an [`ObfuscationMethod`] to packets and length-prefixed streams.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PacketProcessor {
    method: ObfuscationMethod,
}

impl PacketProcessor {
    /// Creates a processor.
    ///
    /// Fails with [`Error::Creation`] if a mask-based method has an empty
    /// mask.
    pub fn new(method: ObfuscationMethod) -> Result<Self, Error> {
        if let ObfuscationMethod::XorMask(mask) | ObfuscationMethod::XorObfuscate(mask) = &method {
            if mask.is_empty() {
                return Err(Error::Creation);
            }
        }
        debug!(?method, "packet processor created");
        Ok(Self { method })
    }

    /// The obfuscation method.
    pub fn method(&self) -> &ObfuscationMethod {
        &self.method
    }

    /// Obfuscates (outbound) or de-obfuscates (inbound) `packet` in place.
    pub fn process_in_place(&self, packet: &mut [u8], direction: Direction) {
        match &self.method {
            ObfuscationMethod::None => {}
            ObfuscationMethod::XorMask(mask) => xor_mask(packet, mask),
            ObfuscationMethod::XorPtrPos => xor_ptr_pos(packet),
            ObfuscationMethod::Reverse => reverse(packet),
            ObfuscationMethod::XorObfuscate(mask) => match direction {
                Direction::Outbound => {
                    xor_ptr_pos(packet);
                    reverse(packet);
                    xor_ptr_pos(packet);
                    xor_mask(packet, mask);
                }
                Direction::Inbound => {
                    xor_mask(packet, mask);
                    xor_ptr_pos(packet);
                    reverse(packet);
                    xor_ptr_pos(packet);
                }
            },
        }
    }

    /// Returns the obfuscated (outbound) or de-obfuscated (inbound) copy of
    /// `packet`.
    pub fn process(&self, packet: &[u8], direction: Direction) -> Vec<u8> {
        let mut processed = packet.to_vec();
        self.process_in_place(&mut processed, direction);
        processed
    }

    /// Extracts every complete length-prefixed packet from `stream`.
    ///
    /// Returns the processed packets and the number of bytes consumed. The
    /// caller keeps the bytes after `consumed` and calls again once more
    /// data arrived.
    pub fn packets_from_stream(&self, stream: &[u8], direction: Direction) -> (Vec<Vec<u8>>, usize) {
        let mut packets = vec![];
        let mut consumed = 0;
        while let Some((len, rest)) = stream[consumed..].split_first_chunk::<STREAM_LEN_LEN>() {
            let len = u16::from_be_bytes(*len) as usize;
            let Some(packet) = rest.get(..len) else {
                break;
            };
            packets.push(self.process(packet, direction));
            consumed += STREAM_LEN_LEN + len;
        }
        trace!(packets = packets.len(), consumed, "packets extracted from stream");
        (packets, consumed)
    }

    /// Processes `packet` and prefixes it with its length.
    ///
    /// Fails with [`DataPathError::Malformed`] if `packet` is longer than
    /// 65535 bytes.
    pub fn stream_from_packet(&self, packet: &[u8], direction: Direction) -> Result<Vec<u8>, Error> {
        let mut stream = Vec::with_capacity(STREAM_LEN_LEN + packet.len());
        self.put_stream_packet(packet, direction, &mut stream)?;
        Ok(stream)
    }

    /// Processes and length-prefixes each of `packets`, concatenated.
    pub fn stream_from_packets<P: AsRef<[u8]>>(
        &self,
        packets: &[P],
        direction: Direction,
    ) -> Result<Vec<u8>, Error> {
        let len = packets
            .iter()
            .map(|p| STREAM_LEN_LEN + p.as_ref().len())
            .sum();
        let mut stream = Vec::with_capacity(len);
        for packet in packets {
            self.put_stream_packet(packet.as_ref(), direction, &mut stream)?;
        }
        Ok(stream)
    }

    fn put_stream_packet(&self, packet: &[u8], direction: Direction, dst: &mut Vec<u8>) -> Result<(), Error> {
        let len = u16::try_from(packet.len()).map_err(|_| DataPathError::Malformed)?;
        dst.extend_from_slice(&len.to_be_bytes());
        let start = dst.len();
        dst.extend_from_slice(packet);
        self.process_in_place(&mut dst[start..], direction);
        Ok(())
    }
}
