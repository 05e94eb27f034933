//! All possible non-I/O secure-channel errors.
//!
//! Every error is fatal to the session that produced it: the owner of the
//! session is expected to tear it down and, if policy allows, reconnect with
//! a fresh [`DataPath`] and [`ControlChannelSerializer`] pair. Nothing in this
//! crate retries or decodes on a best-effort basis.
//!
//! A duplicate packet id is not an error. Duplicates are expected on
//! unreliable transports and are silently dropped.
//!
//! [`DataPath`]: crate::DataPath
//! [`ControlChannelSerializer`]: crate::ControlChannelSerializer
use core::{
    error,
    fmt::{Display, Formatter},
};
use std::io::{self, ErrorKind};

/// Enumeration of all possible non-I/O secure-channel errors.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum Error {
    /// The cipher or digest name is not supported.
    ///
    /// The parameter is the name that failed to resolve.
    Algorithm(String),

    /// A crypto context could not be constructed, typically because the key
    /// material is shorter than the algorithm requires.
    Creation,

    /// A data-channel packet could not be processed.
    DataPath(DataPathError),

    /// A control-channel packet could not be processed.
    ControlChannel(ControlChannelError),

    /// A static key could not be parsed.
    StaticKey(StaticKeyError),
}

/// Data-channel failures.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum DataPathError {
    /// HMAC digest or AEAD tag did not match.
    AuthenticationFailed,

    /// The buffer is too short for the declared header, tag or digest, or
    /// its opcode is not a data opcode.
    Malformed,

    /// The packet id reached the reserved ceiling. The session must be
    /// renegotiated, the counter never wraps.
    Overflow,

    /// A `P_DATA_V2` packet carried a peer id other than the configured one.
    PeerIdMismatch {
        /// The configured peer id.
        expected: u32,
        /// The peer id found on the wire.
        received: u32,
    },

    /// The payload is compressed, or carries a malformed compression header.
    Compression {
        /// The framing byte that could not be handled.
        header: u8,
    },

    /// The crypto library failed on otherwise valid input.
    Crypto,
}

/// Control-channel failures.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ControlChannelError {
    /// The buffer is empty.
    MissingOpcode,

    /// The opcode does not map to a known packet code.
    UnknownCode(u8),

    /// The buffer ends inside the session id.
    MissingSessionId,

    /// The buffer ends before the ack count.
    MissingAckSize,

    /// The buffer ends inside the ack ids.
    MissingAcks,

    /// The buffer ends inside the remote session id.
    MissingRemoteSessionId,

    /// An `ACK_V1` packet without any ack id.
    AckWithoutIds,

    /// The buffer ends inside the packet id.
    MissingPacketId,

    /// The buffer is shorter than the tls-auth preamble.
    MissingHmac,

    /// The buffer is shorter than the tls-crypt associated data plus tag.
    MissingAdAndTag,

    /// HMAC or tag verification failed.
    AuthenticationFailed,

    /// tls-crypt was requested with a static key that has no direction.
    MissingKeyDirection,

    /// The crypto library failed on otherwise valid input.
    Crypto,
}

/// Static key file failures.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum StaticKeyError {
    /// The first non-comment line is not the static key header.
    MissingHeader,

    /// A line starting with `-` is not the static key footer.
    InvalidFooter,

    /// The key body does not hold the expected number of bytes.
    InvalidLength {
        /// The number of bytes found.
        received: usize,
    },

    /// The key body contains a non-hexadecimal character.
    InvalidHex,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Algorithm(name) => write!(f, "Algorithm: unsupported {:?}", name),
            Error::Creation => write!(f, "Creation"),
            Error::DataPath(err) => write!(f, "DataPath: {}", err),
            Error::ControlChannel(err) => write!(f, "ControlChannel: {}", err),
            Error::StaticKey(err) => write!(f, "StaticKey: {}", err),
        }
    }
}

impl Display for DataPathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            DataPathError::AuthenticationFailed => write!(f, "AuthenticationFailed"),
            DataPathError::Malformed => write!(f, "Malformed"),
            DataPathError::Overflow => write!(f, "Overflow"),
            DataPathError::PeerIdMismatch { expected, received } => write!(
                f,
                "PeerIdMismatch: expected {:#08x}, received {:#08x}",
                expected, received
            ),
            DataPathError::Compression { header } => {
                write!(f, "Compression: header {:#04x}", header)
            }
            DataPathError::Crypto => write!(f, "Crypto"),
        }
    }
}

impl Display for ControlChannelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            ControlChannelError::MissingOpcode => write!(f, "Missing opcode"),
            ControlChannelError::UnknownCode(code) => write!(f, "Unknown code: {}", code),
            ControlChannelError::MissingSessionId => write!(f, "Missing sessionId"),
            ControlChannelError::MissingAckSize => write!(f, "Missing ackSize"),
            ControlChannelError::MissingAcks => write!(f, "Missing acks"),
            ControlChannelError::MissingRemoteSessionId => write!(f, "Missing remoteSessionId"),
            ControlChannelError::AckWithoutIds => write!(f, "Ack packet without ids"),
            ControlChannelError::MissingPacketId => write!(f, "Missing packetId"),
            ControlChannelError::MissingHmac => write!(f, "Missing HMAC"),
            ControlChannelError::MissingAdAndTag => write!(f, "Missing AD+TAG"),
            ControlChannelError::AuthenticationFailed => write!(f, "Authentication failed"),
            ControlChannelError::MissingKeyDirection => write!(f, "Missing key direction"),
            ControlChannelError::Crypto => write!(f, "Crypto failure"),
        }
    }
}

impl Display for StaticKeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            StaticKeyError::MissingHeader => write!(f, "MissingHeader"),
            StaticKeyError::InvalidFooter => write!(f, "InvalidFooter"),
            StaticKeyError::InvalidLength { received } => {
                write!(f, "InvalidLength: received {} bytes", received)
            }
            StaticKeyError::InvalidHex => write!(f, "InvalidHex"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::DataPath(err) => Some(err),
            Error::ControlChannel(err) => Some(err),
            Error::StaticKey(err) => Some(err),
            Error::Algorithm(_) | Error::Creation => None,
        }
    }
}

impl error::Error for DataPathError {}

impl error::Error for ControlChannelError {}

impl error::Error for StaticKeyError {}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        io::Error::new(ErrorKind::Other, e)
    }
}

impl From<DataPathError> for io::Error {
    fn from(e: DataPathError) -> Self {
        io::Error::new(ErrorKind::Other, Error::DataPath(e))
    }
}

impl From<DataPathError> for Error {
    fn from(e: DataPathError) -> Self {
        Error::DataPath(e)
    }
}

impl From<ControlChannelError> for Error {
    fn from(e: ControlChannelError) -> Self {
        Error::ControlChannel(e)
    }
}

impl From<StaticKeyError> for Error {
    fn from(e: StaticKeyError) -> Self {
        Error::StaticKey(e)
    }
}
