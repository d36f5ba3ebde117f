// TKey TOTP
// Written in 2023 by
//   Andrew Poelstra <icboc@wpsoftware.net>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! # Error Handling

use std::{io, string};
use thiserror::Error;

/// Broad classification of an [`Error`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Opening, writing or reading the connection failed
    Transport,
    /// No response arrived within the read bound
    Timeout,
    /// The response did not match the request; the connection is out of sync
    Protocol,
    /// The device explicitly refused the request; the connection is still usable
    DeviceRejected,
    /// The device is running some other app
    WrongApp,
    /// The caller asked for something we refuse before touching the device
    InvalidInput,
}

/// TKey TOTP error
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
    #[error("serial port")]
    Serial(#[from] serialport::Error),
    #[error("could not open {path}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
    #[error("no serial port given (device auto-detection is not supported)")]
    NoPort,
    #[error("timed out waiting for {response}")]
    Timeout { response: &'static str },
    #[error("unexpected end-of-data")]
    UnexpectedEof,
    #[error("frame header {header:#04x} has its reserved bit set")]
    FrameReservedBit { header: u8 },
    #[error("incorrect length for {response} (expected {expected:?}, found {found:?})")]
    ResponseWrongLength {
        response: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("incorrect frame id for {response} (expected {expected:?}, found {found:?})")]
    ResponseWrongId {
        response: &'static str,
        expected: u8,
        found: u8,
    },
    #[error("incorrect endpoint for {response} (expected {expected:?}, found {found:?})")]
    ResponseWrongEndpoint {
        response: &'static str,
        expected: u8,
        found: u8,
    },
    #[error("expected {response} but device replied with code {found:#04x}")]
    ResponseWrongCode { response: &'static str, found: u8 },
    #[error("device reported {found} bytes left in {response} transfer, we expected {expected}")]
    TransferOutOfSync {
        response: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("device digest of the loaded app does not match ours")]
    AppDigestMismatch,
    #[error("device flagged {response} as not OK")]
    ResponseNotOk { response: &'static str },
    #[error("device replied to {command} with bad status code {status:#04x}")]
    ResponseBadStatus { command: &'static str, status: u8 },
    #[error("no TKey on the serial port, or it is running the wrong app ({found})")]
    WrongApp { found: String },
    #[error("request id {0} does not fit in a frame header")]
    BadRequestId(u8),
    #[error("chunk of {len} bytes exceeds the {max} byte payload limit")]
    ChunkTooLarge { len: usize, max: usize },
    #[error("record {field} is {len} bytes, max is {max}")]
    RecordFieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("app binary of {len} bytes exceeds the {max} byte limit")]
    AppTooLarge { len: usize, max: usize },
    #[error("device is in firmware mode but no app binary was given")]
    NoAppBinary,
    #[error("the phrases entered for the USS did not match")]
    UssMismatch,
    #[error("utf8")]
    FromUtf8(#[from] string::FromUtf8Error),
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::Io(..) | Error::Serial(..) | Error::Open { .. } | Error::UnexpectedEof => {
                ErrorKind::Transport
            }
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::FrameReservedBit { .. }
            | Error::ResponseWrongLength { .. }
            | Error::ResponseWrongId { .. }
            | Error::ResponseWrongEndpoint { .. }
            | Error::ResponseWrongCode { .. }
            | Error::TransferOutOfSync { .. }
            | Error::AppDigestMismatch
            | Error::FromUtf8(..) => ErrorKind::Protocol,
            Error::ResponseNotOk { .. } | Error::ResponseBadStatus { .. } => {
                ErrorKind::DeviceRejected
            }
            Error::WrongApp { .. } => ErrorKind::WrongApp,
            Error::NoPort
            | Error::BadRequestId(..)
            | Error::ChunkTooLarge { .. }
            | Error::RecordFieldTooLong { .. }
            | Error::AppTooLarge { .. }
            | Error::NoAppBinary
            | Error::UssMismatch => ErrorKind::InvalidInput,
        }
    }

    /// Whether the connection should be abandoned after this error
    ///
    /// Only an explicit refusal from the device leaves the session usable.
    pub fn is_fatal(&self) -> bool {
        match self.kind() {
            ErrorKind::DeviceRejected | ErrorKind::InvalidInput => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let timeout = Error::Timeout { response: "rspGetList" };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert!(timeout.is_fatal());

        let rejected = Error::ResponseBadStatus { command: "cmdDelToken", status: 1 };
        assert_eq!(rejected.kind(), ErrorKind::DeviceRejected);
        assert!(!rejected.is_fatal());

        let desync = Error::ResponseWrongId { response: "rspGetRecords", expected: 1, found: 2 };
        assert_eq!(desync.kind(), ErrorKind::Protocol);
        assert!(desync.is_fatal());

        let io = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert_eq!(io.kind(), ErrorKind::Transport);
    }

    #[test]
    fn messages() {
        let e = Error::ResponseBadStatus { command: "cmdGetRecords", status: 1 };
        assert_eq!(e.to_string(), "device replied to cmdGetRecords with bad status code 0x01");
        let e = Error::ChunkTooLarge { len: 200, max: 126 };
        assert_eq!(e.to_string(), "chunk of 200 bytes exceeds the 126 byte payload limit");
    }
}
