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

//! # Transport
//!
//! Abstract API for moving frames to and from the device
//!

use std::time::Duration;

use log::warn;

use crate::catalog::{self, Command};
use crate::constants::frame::{status, STATUS_OFFSET};
use crate::frame::FrameHeader;
use crate::{util, Error};

pub mod serial;

pub use self::serial::SerialTransport;

/// Trait representing a framed connection to a TKey
///
/// Implementations move whole frames; they know nothing about what the
/// payloads mean.
pub trait Transport {
    /// Sends one complete frame, header included
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error>;

    /// Reads one complete frame and checks it is the response `expected`
    /// tagged with `id`. The returned frame includes the header byte.
    ///
    /// A frame the device flagged "not OK" is returned without the code and
    /// length checks; the caller decides what that means.
    fn read_frame(&mut self, expected: &Command, id: u8) -> Result<(Vec<u8>, FrameHeader), Error>;

    /// Bounds how long `read_frame` will wait. `None` waits forever.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error>;

    /// Closes the connection
    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Something that can load a device app onto a TKey in firmware mode
pub trait AppLoader {
    /// Loads `binary`, mixing `secret` (if any) into the app's key derivation
    fn load_app(&mut self, binary: &[u8], secret: Option<&[u8]>) -> Result<(), Error>;
}

/// Reads one frame with the read bound set to `timeout`
///
/// The bound is cleared again on every path out of this function, so the
/// connection is always left without a timeout.
pub fn read_with_timeout<T: Transport + ?Sized>(
    transport: &mut T,
    timeout: Duration,
    expected: &Command,
    id: u8,
) -> Result<(Vec<u8>, FrameHeader), Error> {
    transport.set_read_timeout(Some(timeout))?;
    let result = transport.read_frame(expected, id);
    let restore = transport.set_read_timeout(None);
    match (result, restore) {
        (Ok(frame), Ok(())) => Ok(frame),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore_err)) => {
            warn!("failed to clear read timeout after error: {}", restore_err);
            Err(e)
        }
    }
}

/// Sends `tx` and waits for the matching `expected` response
///
/// With a `timeout` the read is bounded as in [`read_with_timeout`]; without
/// one it uses whatever bound the transport currently has. A response the
/// device flagged "not OK" becomes [`Error::ResponseNotOk`]. Requests that
/// carry a secret are logged without their payload.
pub fn exchange<T: Transport + ?Sized>(
    transport: &mut T,
    tx: &[u8],
    expected: &Command,
    id: u8,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, Error> {
    util::dump(&format!("{} tx", expected.name()), tx, catalog::carries_secret(tx));
    transport.write_frame(tx)?;
    let (rx, header) = match timeout {
        Some(timeout) => read_with_timeout(transport, timeout, expected, id)?,
        None => transport.read_frame(expected, id)?,
    };
    util::dump(&format!("{} rx", expected.name()), &rx, false);
    if header.response_not_ok {
        return Err(Error::ResponseNotOk {
            response: expected.name(),
        });
    }
    Ok(rx)
}

/// Checks the status byte of a status-carrying response
pub fn check_status(command: &Command, rx: &[u8]) -> Result<(), Error> {
    match rx.get(STATUS_OFFSET) {
        Some(&status::OK) => Ok(()),
        Some(&code) => Err(Error::ResponseBadStatus {
            command: command.name(),
            status: code,
        }),
        None => Err(Error::UnexpectedEof),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::app;
    use crate::testing::{response, ScriptedTransport};
    use crate::ErrorKind;
    use std::io;

    const BOUND: Duration = Duration::from_secs(2);

    #[test]
    fn timeout_cleared_on_success() {
        let mut t = ScriptedTransport::new();
        t.reply(response(&app::RSP_DEL_TOKEN, 1, &[status::OK]));
        read_with_timeout(&mut t, BOUND, &app::RSP_DEL_TOKEN, 1).unwrap();
        assert_eq!(t.timeouts, vec![Some(BOUND), None]);
        assert_eq!(t.current_timeout, None);
    }

    #[test]
    fn timeout_cleared_on_failure() {
        let mut t = ScriptedTransport::new();
        t.fail_read(Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        let err = read_with_timeout(&mut t, BOUND, &app::RSP_DEL_TOKEN, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(t.timeouts, vec![Some(BOUND), None]);

        // Nothing scripted: the device never answers
        let err = read_with_timeout(&mut t, BOUND, &app::RSP_DEL_TOKEN, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(t.current_timeout, None);

        // Answer for some other request
        t.reply(response(&app::RSP_DEL_TOKEN, 2, &[status::OK]));
        let err = read_with_timeout(&mut t, BOUND, &app::RSP_DEL_TOKEN, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(t.current_timeout, None);
    }

    #[test]
    fn exchange_not_ok() {
        let mut t = ScriptedTransport::new();
        t.reply(crate::testing::not_ok(&app::RSP_RESET_APP, 1));
        let tx = crate::frame::new_frame_buf(&app::CMD_RESET_APP, 1).unwrap();
        let err = exchange(&mut t, &tx, &app::RSP_RESET_APP, 1, Some(BOUND)).unwrap_err();
        assert!(matches!(err, Error::ResponseNotOk { response: "rspResetApp" }));
        assert_eq!(t.written, vec![tx]);
        assert_eq!(t.current_timeout, None);
    }

    #[test]
    fn status_byte() {
        let ok = response(&app::RSP_ADD_TOKEN, 1, &[status::OK]);
        assert!(check_status(&app::CMD_ADD_TOKEN, &ok).is_ok());
        let bad = response(&app::RSP_ADD_TOKEN, 1, &[status::BAD]);
        assert!(matches!(
            check_status(&app::CMD_ADD_TOKEN, &bad),
            Err(Error::ResponseBadStatus { command: "cmdAddToken", status: 1 })
        ));
        let short = response(&app::RSP_RESET_APP, 1, &[]);
        assert!(matches!(check_status(&app::CMD_RESET_APP, &short), Err(Error::UnexpectedEof)));
    }
}
