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

//! # Command Catalog
//!
//! Every command the host sends and every response the device returns, with
//! its code and length class. Requests and responses always come in pairs;
//! the response code is the request code plus one.
//!

use core::fmt;

use crate::frame::{CmdLen, Endpoint, FrameHeader};

/// Descriptor of one command or response
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Command {
    code: u8,
    name: &'static str,
    cmd_len: CmdLen,
    endpoint: Endpoint,
}

impl Command {
    const fn new(code: u8, name: &'static str, cmd_len: CmdLen, endpoint: Endpoint) -> Self {
        Command {
            code,
            name,
            cmd_len,
            endpoint,
        }
    }

    /// One-byte op-code
    pub const fn code(&self) -> u8 {
        self.code
    }

    /// Human-readable name
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Length class
    pub const fn cmd_len(&self) -> CmdLen {
        self.cmd_len
    }

    /// Endpoint the command is addressed to (or the response comes from)
    pub const fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Length of the frame, not counting the header byte
    pub const fn frame_len(&self) -> usize {
        self.cmd_len.byte_len()
    }

    /// Payload bytes left once the code and status bytes are accounted for
    ///
    /// One-byte frames have no room for either and report zero.
    pub const fn payload_capacity(&self) -> usize {
        self.frame_len().saturating_sub(2)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Bound on the size of any chunk in a multi-frame transfer
pub const PAYLOAD_MAX_BYTES: usize = app::CMD_LOAD_RECORDS.payload_capacity();

/// Requests whose payload must never reach the log: a raw TOTP secret, or
/// the hash of the USS
const SECRET_REQUESTS: [Command; 2] = [app::CMD_ADD_TOKEN, firmware::CMD_LOAD_APP];

/// Whether `frame` is one of the requests that carry a secret
pub fn carries_secret(frame: &[u8]) -> bool {
    let header = match frame.first().map(|&b| FrameHeader::parse(b)) {
        Some(Ok(header)) => header,
        _ => return false,
    };
    match frame.get(1) {
        Some(&code) => SECRET_REQUESTS
            .iter()
            .any(|cmd| cmd.code() == code && cmd.endpoint().bits() == header.endpoint),
        None => false,
    }
}

/// Commands understood by the TOTP device app
#[allow(missing_docs)]
pub mod app {
    use super::Command;
    use crate::frame::{CmdLen, Endpoint};

    pub const CMD_GET_NAME_VERSION: Command =
        Command::new(0x01, "cmdGetNameVersion", CmdLen::Len1, Endpoint::App);
    pub const RSP_GET_NAME_VERSION: Command =
        Command::new(0x02, "rspGetNameVersion", CmdLen::Len32, Endpoint::App);
    pub const CMD_LOAD_RECORDS: Command =
        Command::new(0x03, "cmdLoadRecords", CmdLen::Len128, Endpoint::App);
    pub const RSP_LOAD_RECORDS: Command =
        Command::new(0x04, "rspLoadRecords", CmdLen::Len4, Endpoint::App);
    pub const CMD_GET_RECORDS: Command =
        Command::new(0x05, "cmdGetRecords", CmdLen::Len1, Endpoint::App);
    pub const RSP_GET_RECORDS: Command =
        Command::new(0x06, "rspGetRecords", CmdLen::Len128, Endpoint::App);
    pub const CMD_GET_LIST: Command =
        Command::new(0x07, "cmdGetList", CmdLen::Len4, Endpoint::App);
    pub const RSP_GET_LIST: Command =
        Command::new(0x08, "rspGetList", CmdLen::Len128, Endpoint::App);
    pub const CMD_CALC_TOKEN: Command =
        Command::new(0x09, "cmdCalcToken", CmdLen::Len4, Endpoint::App);
    pub const RSP_CALC_TOKEN: Command =
        Command::new(0x0a, "rspCalcToken", CmdLen::Len128, Endpoint::App);
    pub const CMD_ADD_TOKEN: Command =
        Command::new(0x0b, "cmdAddToken", CmdLen::Len128, Endpoint::App);
    pub const RSP_ADD_TOKEN: Command =
        Command::new(0x0c, "rspAddToken", CmdLen::Len4, Endpoint::App);
    pub const CMD_DEL_TOKEN: Command =
        Command::new(0x0d, "cmdDelToken", CmdLen::Len4, Endpoint::App);
    pub const RSP_DEL_TOKEN: Command =
        Command::new(0x0e, "rspDelToken", CmdLen::Len4, Endpoint::App);
    pub const CMD_RESET_APP: Command =
        Command::new(0x0f, "cmdResetApp", CmdLen::Len1, Endpoint::App);
    pub const RSP_RESET_APP: Command =
        Command::new(0x10, "rspResetApp", CmdLen::Len1, Endpoint::App);
    /// Sent by the app in reply to a code it does not know
    pub const RSP_UNKNOWN_CMD: Command =
        Command::new(0xff, "rspUnknownCmd", CmdLen::Len1, Endpoint::App);

    /// Every (request, response) pair, in code order
    pub const PAIRS: [(Command, Command); 8] = [
        (CMD_GET_NAME_VERSION, RSP_GET_NAME_VERSION),
        (CMD_LOAD_RECORDS, RSP_LOAD_RECORDS),
        (CMD_GET_RECORDS, RSP_GET_RECORDS),
        (CMD_GET_LIST, RSP_GET_LIST),
        (CMD_CALC_TOKEN, RSP_CALC_TOKEN),
        (CMD_ADD_TOKEN, RSP_ADD_TOKEN),
        (CMD_DEL_TOKEN, RSP_DEL_TOKEN),
        (CMD_RESET_APP, RSP_RESET_APP),
    ];
}

/// Commands understood by the firmware, i.e. the app loader
#[allow(missing_docs)]
pub mod firmware {
    use super::Command;
    use crate::frame::{CmdLen, Endpoint};

    pub const CMD_GET_NAME_VERSION: Command =
        Command::new(0x01, "cmdFwGetNameVersion", CmdLen::Len1, Endpoint::Firmware);
    pub const RSP_GET_NAME_VERSION: Command =
        Command::new(0x02, "rspFwGetNameVersion", CmdLen::Len32, Endpoint::Firmware);
    pub const CMD_LOAD_APP: Command =
        Command::new(0x03, "cmdLoadApp", CmdLen::Len128, Endpoint::Firmware);
    pub const RSP_LOAD_APP: Command =
        Command::new(0x04, "rspLoadApp", CmdLen::Len4, Endpoint::Firmware);
    pub const CMD_LOAD_APP_DATA: Command =
        Command::new(0x05, "cmdLoadAppData", CmdLen::Len128, Endpoint::Firmware);
    pub const RSP_LOAD_APP_DATA: Command =
        Command::new(0x06, "rspLoadAppData", CmdLen::Len4, Endpoint::Firmware);
    /// Answers the final LoadAppData chunk, carrying the digest of the app
    pub const RSP_LOAD_APP_DATA_READY: Command =
        Command::new(0x07, "rspLoadAppDataReady", CmdLen::Len128, Endpoint::Firmware);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn all() -> Vec<Command> {
        let mut ret = vec![];
        for (req, rsp) in &app::PAIRS {
            ret.push(*req);
            ret.push(*rsp);
        }
        ret.push(app::RSP_UNKNOWN_CMD);
        ret.extend(&[
            firmware::CMD_GET_NAME_VERSION,
            firmware::RSP_GET_NAME_VERSION,
            firmware::CMD_LOAD_APP,
            firmware::RSP_LOAD_APP,
            firmware::CMD_LOAD_APP_DATA,
            firmware::RSP_LOAD_APP_DATA,
            firmware::RSP_LOAD_APP_DATA_READY,
        ]);
        ret
    }

    #[test]
    fn payload_capacity() {
        for cmd in all() {
            let expected = cmd.frame_len().checked_sub(2).unwrap_or(0);
            assert_eq!(cmd.payload_capacity(), expected, "{}", cmd);
        }
        assert_eq!(app::CMD_GET_RECORDS.payload_capacity(), 0);
        assert_eq!(app::RSP_GET_NAME_VERSION.payload_capacity(), 30);
    }

    #[test]
    fn payload_max_bytes() {
        assert_eq!(PAYLOAD_MAX_BYTES, app::CMD_LOAD_RECORDS.payload_capacity());
        assert_eq!(PAYLOAD_MAX_BYTES, 126);
    }

    #[test]
    fn pairs() {
        for (req, rsp) in &app::PAIRS {
            assert_eq!(req.code() + 1, rsp.code(), "{} / {}", req, rsp);
            assert_eq!(req.endpoint(), rsp.endpoint());
            assert_eq!(req.code() % 2, 1);
        }
        let codes: HashSet<u8> = app::PAIRS.iter().map(|(req, _)| req.code()).collect();
        assert_eq!(codes.len(), app::PAIRS.len());
        let names: HashSet<&str> = all().iter().map(Command::name).collect();
        assert_eq!(names.len(), all().len());
    }

    #[test]
    fn secret_requests() {
        use crate::frame::new_frame_buf;

        assert!(carries_secret(&new_frame_buf(&app::CMD_ADD_TOKEN, 1).unwrap()));
        assert!(carries_secret(&new_frame_buf(&firmware::CMD_LOAD_APP, 2).unwrap()));
        assert!(!carries_secret(&new_frame_buf(&app::CMD_LOAD_RECORDS, 1).unwrap()));
        assert!(!carries_secret(&new_frame_buf(&firmware::CMD_LOAD_APP_DATA, 2).unwrap()));
        // Same code, other endpoint: LoadRecords (0x03) is not LoadApp
        assert!(!carries_secret(&new_frame_buf(&app::CMD_LOAD_RECORDS, 2).unwrap()));
        assert!(!carries_secret(&[]));
    }

    #[test]
    fn frame_lengths() {
        assert_eq!(app::CMD_GET_NAME_VERSION.frame_len(), 1);
        assert_eq!(app::RSP_GET_NAME_VERSION.frame_len(), 32);
        assert_eq!(app::CMD_LOAD_RECORDS.frame_len(), 128);
        assert_eq!(app::RSP_LOAD_RECORDS.frame_len(), 4);
        assert_eq!(app::CMD_GET_LIST.frame_len(), 4);
        assert_eq!(app::RSP_RESET_APP.frame_len(), 1);
    }
}
