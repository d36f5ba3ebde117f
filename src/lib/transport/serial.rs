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

//! # Serial Transport
//!
//! The TKey shows up as a USB CDC serial device. Frames go over the line
//! back to back with no further envelope.
//!

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use log::debug;
use serialport::{ClearBuffer, SerialPort};

use crate::catalog::Command;
use crate::constants::timeout::POLL_INTERVAL;
use crate::frame::{self, FrameHeader};
use crate::transport::Transport;
use crate::Error;

/// Structure representing an open serial connection to the device
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    path: String,
    read_timeout: Option<Duration>,
}

impl SerialTransport {
    /// Opens the serial port at `path` with line speed `speed`
    pub fn open(path: &str, speed: u32) -> Result<SerialTransport, Error> {
        let port = serialport::new(path, speed)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|source| Error::Open {
                path: path.to_owned(),
                source,
            })?;
        // Drop anything left over from an earlier session
        port.clear(ClearBuffer::All)?;
        debug!("opened {} at {} b/s", path, speed);
        Ok(SerialTransport {
            port,
            path: path.to_owned(),
            read_timeout: None,
        })
    }
}

impl Transport for SerialTransport {
    fn write_frame(&mut self, data: &[u8]) -> Result<(), Error> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_frame(&mut self, expected: &Command, id: u8) -> Result<(Vec<u8>, FrameHeader), Error> {
        let deadline = self.read_timeout.map(|timeout| Instant::now() + timeout);

        let mut header_byte = [0u8; 1];
        read_exact_until(&mut *self.port, &mut header_byte, deadline, expected.name())?;
        let header = FrameHeader::parse(header_byte[0])?;

        // Always consume the whole frame, even one we are going to reject,
        // so the next read starts on a header
        let mut ret = vec![0; header.frame_len()];
        ret[0] = header_byte[0];
        read_exact_until(&mut *self.port, &mut ret[1..], deadline, expected.name())?;

        let header = frame::validate_response(&ret, expected, id)?;
        Ok((ret, header))
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        self.read_timeout = timeout;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        debug!("closing {}", self.path);
        self.port.flush()?;
        Ok(())
    }
}

/// Fill `buf` from `reader`, giving up with [`Error::Timeout`] once
/// `deadline` has passed
///
/// The port itself is opened with a short poll interval; with no deadline we
/// simply keep polling.
fn read_exact_until<R: Read + ?Sized>(
    reader: &mut R,
    mut buf: &mut [u8],
    deadline: Option<Instant>,
    response: &'static str,
) -> Result<(), Error> {
    while !buf.is_empty() {
        match reader.read(buf) {
            Ok(0) => {}
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
                continue;
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(Error::Timeout { response });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Reader which hands out scripted results one at a time
    struct Trickle(VecDeque<io::Result<Vec<u8>>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "poll")),
            }
        }
    }

    fn timed_out() -> io::Result<Vec<u8>> {
        Err(io::Error::new(io::ErrorKind::TimedOut, "poll"))
    }

    #[test]
    fn reassembles_partial_reads() {
        let mut reader = Trickle(
            vec![Ok(vec![1]), timed_out(), Ok(vec![2, 3]), Ok(vec![]), Ok(vec![4])]
                .into_iter()
                .collect(),
        );
        let mut buf = [0; 4];
        read_exact_until(&mut reader, &mut buf, None, "rspGetList").unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn deadline() {
        let mut reader = Trickle(vec![Ok(vec![1])].into_iter().collect());
        let mut buf = [0; 4];
        let deadline = Some(Instant::now());
        match read_exact_until(&mut reader, &mut buf, deadline, "rspGetList") {
            Err(Error::Timeout { response: "rspGetList" }) => {}
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn io_errors_propagate() {
        let mut reader = Trickle(
            vec![Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))]
                .into_iter()
                .collect(),
        );
        let mut buf = [0; 1];
        match read_exact_until(&mut reader, &mut buf, None, "rspGetList") {
            Err(Error::Io(ref e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
            x => panic!("unexpected {:?}", x),
        }
    }
}
