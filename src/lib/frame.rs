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

//! # Frames
//!
//! Every exchange with the TKey is a single fixed-size frame. The first byte
//! is a header which packs the frame id, the destination endpoint and one of
//! four length classes:
//!
//! ```text
//!   bit 7     reserved, always 0
//!   bits 6-5  frame id (echoed back in the response)
//!   bits 4-3  endpoint
//!   bit 2     set in a response if the device considers it "not OK"
//!   bits 1-0  length class: 1, 4, 32 or 128 bytes following the header
//! ```
//!
//! The byte after the header is always the command or response code.
//!

use core::fmt;

use crate::catalog::Command;
use crate::Error;

const RESERVED_BIT: u8 = 0x80;
const NOT_OK_BIT: u8 = 0x04;
const ID_SHIFT: u8 = 5;
const ENDPOINT_SHIFT: u8 = 3;

/// Largest frame id that fits in the header
pub const MAX_ID: u8 = 3;

/// Length class of a frame, i.e. the number of bytes following the header
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CmdLen {
    /// One byte, just the code
    Len1,
    /// Four bytes
    Len4,
    /// 32 bytes
    Len32,
    /// 128 bytes
    Len128,
}

impl CmdLen {
    /// Number of bytes following the header
    pub const fn byte_len(self) -> usize {
        match self {
            CmdLen::Len1 => 1,
            CmdLen::Len4 => 4,
            CmdLen::Len32 => 32,
            CmdLen::Len128 => 128,
        }
    }

    /// The two header bits encoding this length class
    pub const fn bits(self) -> u8 {
        match self {
            CmdLen::Len1 => 0,
            CmdLen::Len4 => 1,
            CmdLen::Len32 => 2,
            CmdLen::Len128 => 3,
        }
    }

    fn from_bits(bits: u8) -> CmdLen {
        match bits & 0x03 {
            0 => CmdLen::Len1,
            1 => CmdLen::Len4,
            2 => CmdLen::Len32,
            _ => CmdLen::Len128,
        }
    }
}

/// Destination of a frame on the device
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The firmware, i.e. the app loader
    Firmware,
    /// Whatever device app is running
    App,
}

impl Endpoint {
    /// The two header bits encoding this endpoint
    pub const fn bits(self) -> u8 {
        match self {
            Endpoint::Firmware => 2,
            Endpoint::App => 3,
        }
    }
}

/// Decoded frame header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame id
    pub id: u8,
    /// Raw endpoint bits
    pub endpoint: u8,
    /// Length class
    pub cmd_len: CmdLen,
    /// Whether the device flagged the frame as "not OK"
    pub response_not_ok: bool,
}

impl FrameHeader {
    /// Parse a header byte
    pub fn parse(byte: u8) -> Result<FrameHeader, Error> {
        if byte & RESERVED_BIT != 0 {
            return Err(Error::FrameReservedBit { header: byte });
        }
        Ok(FrameHeader {
            id: (byte >> ID_SHIFT) & 0x03,
            endpoint: (byte >> ENDPOINT_SHIFT) & 0x03,
            cmd_len: CmdLen::from_bits(byte),
            response_not_ok: byte & NOT_OK_BIT != 0,
        })
    }

    /// Encode the header into its byte
    pub fn encode(&self) -> u8 {
        let mut byte = (self.id & 0x03) << ID_SHIFT;
        byte |= (self.endpoint & 0x03) << ENDPOINT_SHIFT;
        byte |= self.cmd_len.bits();
        if self.response_not_ok {
            byte |= NOT_OK_BIT;
        }
        byte
    }

    /// Total number of bytes in a frame with this header, header included
    pub fn frame_len(&self) -> usize {
        1 + self.cmd_len.byte_len()
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "id {} endpoint {} len {}{}",
            self.id,
            self.endpoint,
            self.cmd_len.byte_len(),
            if self.response_not_ok { " NOK" } else { "" },
        )
    }
}

/// Allocate a zeroed frame for `cmd` with the header and code filled in
///
/// The returned buffer has room for the header and the full length class
/// of the command, so callers write their payload from offset 2.
pub fn new_frame_buf(cmd: &Command, id: u8) -> Result<Vec<u8>, Error> {
    if id > MAX_ID {
        return Err(Error::BadRequestId(id));
    }
    let header = FrameHeader {
        id,
        endpoint: cmd.endpoint().bits(),
        cmd_len: cmd.cmd_len(),
        response_not_ok: false,
    };
    let mut ret = vec![0; header.frame_len()];
    ret[0] = header.encode();
    ret[1] = cmd.code();
    Ok(ret)
}

/// Check that a complete received frame is the response we were waiting for
///
/// A frame flagged "not OK" must still carry our id, but is otherwise
/// returned as-is; the device answers such frames with whatever length and
/// code it likes.
pub fn validate_response(frame: &[u8], expected: &Command, id: u8) -> Result<FrameHeader, Error> {
    let header = FrameHeader::parse(*frame.first().ok_or(Error::UnexpectedEof)?)?;
    if frame.len() != header.frame_len() {
        return Err(Error::UnexpectedEof);
    }
    if header.id != id {
        return Err(Error::ResponseWrongId {
            response: expected.name(),
            expected: id,
            found: header.id,
        });
    }
    if header.response_not_ok {
        return Ok(header);
    }
    if header.cmd_len != expected.cmd_len() {
        return Err(Error::ResponseWrongLength {
            response: expected.name(),
            expected: expected.frame_len(),
            found: header.cmd_len.byte_len(),
        });
    }
    if header.endpoint != expected.endpoint().bits() {
        return Err(Error::ResponseWrongEndpoint {
            response: expected.name(),
            expected: expected.endpoint().bits(),
            found: header.endpoint,
        });
    }
    if frame[1] != expected.code() {
        return Err(Error::ResponseWrongCode {
            response: expected.name(),
            found: frame[1],
        });
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{app, firmware};
    use crate::ErrorKind;

    #[test]
    fn header_bits() {
        let header = FrameHeader {
            id: 2,
            endpoint: Endpoint::App.bits(),
            cmd_len: CmdLen::Len128,
            response_not_ok: false,
        };
        assert_eq!(header.encode(), 0b0101_1011);
        assert_eq!(FrameHeader::parse(0b0101_1011).unwrap(), header);

        let nok = FrameHeader::parse(0b0001_0100).unwrap();
        assert!(nok.response_not_ok);
        assert_eq!(nok.endpoint, Endpoint::Firmware.bits());
        assert_eq!(nok.cmd_len, CmdLen::Len1);
        assert_eq!(nok.id, 0);
    }

    #[test]
    fn reserved_bit() {
        match FrameHeader::parse(0x80) {
            Err(Error::FrameReservedBit { header: 0x80 }) => {}
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn frame_buf() {
        let tx = new_frame_buf(&app::CMD_LOAD_RECORDS, 1).unwrap();
        assert_eq!(tx.len(), 129);
        assert_eq!(tx[0], 0b0011_1011);
        assert_eq!(tx[1], 0x03);
        assert!(tx[2..].iter().all(|&b| b == 0));

        let tx = new_frame_buf(&firmware::CMD_GET_NAME_VERSION, 2).unwrap();
        assert_eq!(tx, vec![0b0101_0000, 0x01]);

        assert!(matches!(
            new_frame_buf(&app::CMD_RESET_APP, 4),
            Err(Error::BadRequestId(4))
        ));
    }

    #[test]
    fn validate() {
        let mut rx = new_frame_buf(&app::RSP_DEL_TOKEN, 1).unwrap();
        assert!(validate_response(&rx, &app::RSP_DEL_TOKEN, 1).is_ok());

        let err = validate_response(&rx, &app::RSP_DEL_TOKEN, 2).unwrap_err();
        assert!(matches!(err, Error::ResponseWrongId { expected: 2, found: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let err = validate_response(&rx, &app::RSP_GET_LIST, 1).unwrap_err();
        assert!(matches!(err, Error::ResponseWrongLength { found: 4, .. }));

        let err = validate_response(&rx, &app::RSP_LOAD_RECORDS, 1).unwrap_err();
        assert!(matches!(err, Error::ResponseWrongCode { found: 0x0e, .. }));

        let err = validate_response(&rx, &firmware::RSP_LOAD_APP, 1).unwrap_err();
        assert!(matches!(err, Error::ResponseWrongEndpoint { found: 3, expected: 2, .. }));

        rx.pop();
        assert!(matches!(
            validate_response(&rx, &app::RSP_DEL_TOKEN, 1),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn not_ok_skips_checks() {
        // What an app sends back for a frame addressed to the firmware
        let nok = FrameHeader {
            id: 2,
            endpoint: Endpoint::Firmware.bits(),
            cmd_len: CmdLen::Len1,
            response_not_ok: true,
        };
        let rx = [nok.encode(), 0];
        let header = validate_response(&rx, &firmware::RSP_GET_NAME_VERSION, 2).unwrap();
        assert!(header.response_not_ok);
    }

    #[test]
    fn stale_not_ok() {
        // A refusal left over from some other request
        let nok = FrameHeader {
            id: 3,
            endpoint: Endpoint::App.bits(),
            cmd_len: CmdLen::Len1,
            response_not_ok: true,
        };
        let rx = [nok.encode(), 0];
        let err = validate_response(&rx, &app::RSP_DEL_TOKEN, 1).unwrap_err();
        assert!(matches!(err, Error::ResponseWrongId { expected: 1, found: 3, .. }));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }
}
