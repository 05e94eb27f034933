//! Compression framing.
//!
//! No compression algorithm is implemented: the framing byte only tells the
//! peer that the payload is uncompressed, in the dialect negotiated for the
//! session. Compressed packets are refused on ingress.

use crate::{
    error::DataPathError,
    specification::{LZO_COMPRESS, NO_COMPRESS, NO_COMPRESS_SWAP, V2_INDICATOR, V2_UNCOMPRESSED},
};

/// The compression framing negotiated for the data channel.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum CompressionFraming {
    /// No framing byte at all.
    #[default]
    Disabled,

    /// `comp-lzo`: a leading `0xfa` marks uncompressed payloads.
    CompLzo,

    /// `compress`: the first payload byte is moved to the end and replaced
    /// by `0xfb`.
    Compress,

    /// `compress` v2: payloads are sent as is, unless their first byte
    /// collides with the v2 indicator, in which case `0x50 0x00` is prepended.
    CompressV2,
}

impl CompressionFraming {
    /// Maximum number of bytes added by [`Self::assemble`].
    pub(crate) fn overhead(&self) -> usize {
        match self {
            CompressionFraming::Disabled => 0,
            CompressionFraming::CompLzo | CompressionFraming::Compress => 1,
            CompressionFraming::CompressV2 => 2,
        }
    }

    /// Appends the framed `payload` to `dst`.
    pub(crate) fn assemble(&self, payload: &[u8], dst: &mut Vec<u8>) {
        match self {
            CompressionFraming::Disabled => dst.extend_from_slice(payload),
            CompressionFraming::CompLzo => {
                dst.push(NO_COMPRESS);
                dst.extend_from_slice(payload);
            }
            CompressionFraming::Compress => match payload.split_first() {
                Some((first, rest)) => {
                    dst.push(NO_COMPRESS_SWAP);
                    dst.extend_from_slice(rest);
                    dst.push(*first);
                }
                None => dst.push(NO_COMPRESS_SWAP),
            },
            CompressionFraming::CompressV2 => {
                if payload.first() == Some(&V2_INDICATOR) {
                    dst.push(V2_INDICATOR);
                    dst.push(V2_UNCOMPRESSED);
                }
                dst.extend_from_slice(payload);
            }
        }
    }

    /// Appends the payload of `framed` to `dst` and returns the framing
    /// header byte, `0x00` when framing is disabled.
    ///
    /// A literal payload (no framing byte) reports its own first byte.
    pub(crate) fn parse(&self, framed: &[u8], dst: &mut Vec<u8>) -> Result<u8, DataPathError> {
        match self {
            CompressionFraming::Disabled => {
                dst.extend_from_slice(framed);
                Ok(0x00)
            }
            CompressionFraming::CompLzo | CompressionFraming::Compress => {
                parse_v1(framed, dst)
            }
            CompressionFraming::CompressV2 => parse_v2(framed, dst),
        }
    }
}

fn parse_v1(framed: &[u8], dst: &mut Vec<u8>) -> Result<u8, DataPathError> {
    let Some((&header, rest)) = framed.split_first() else {
        return Ok(0x00);
    };
    match header {
        NO_COMPRESS => dst.extend_from_slice(rest),
        NO_COMPRESS_SWAP => {
            if let Some((last, middle)) = rest.split_last() {
                dst.push(*last);
                dst.extend_from_slice(middle);
            }
        }
        LZO_COMPRESS => return Err(DataPathError::Compression { header }),
        _ => dst.extend_from_slice(framed),
    }
    Ok(header)
}

fn parse_v2(framed: &[u8], dst: &mut Vec<u8>) -> Result<u8, DataPathError> {
    match framed {
        [] => Ok(0x00),
        [V2_INDICATOR, V2_UNCOMPRESSED, rest @ ..] => {
            dst.extend_from_slice(rest);
            Ok(V2_INDICATOR)
        }
        [V2_INDICATOR, ..] => Err(DataPathError::Compression {
            header: V2_INDICATOR,
        }),
        [header, ..] => {
            dst.extend_from_slice(framed);
            Ok(*header)
        }
    }
}
