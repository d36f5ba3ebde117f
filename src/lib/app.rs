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

//! # TOTP App
//!
//! Session with the TOTP device app. Every operation is one or more strictly
//! serial request/response round trips; there is never more than one request
//! outstanding, which is what makes the fixed per-operation frame ids safe.
//!

use core::{cmp, fmt};
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info};

use crate::catalog::{app, Command, PAYLOAD_MAX_BYTES};
use crate::constants::frame::{CHUNK_OFFSET, REMAINING_OFFSET, STATUS_OFFSET};
use crate::constants::{identity, timeout};
use crate::frame::new_frame_buf;
use crate::record::{Record, RecordList};
use crate::transport::{self, Transport};
use crate::Error;

/// Frame ids used for each operation
mod id {
    pub const GET_NAME_VERSION: u8 = 2;
    pub const GET_RECORDS: u8 = 1;
    pub const LOAD_RECORDS: u8 = 1;
    pub const GET_LIST: u8 = 1;
    pub const CALC_TOKEN: u8 = 1;
    pub const ADD_TOKEN: u8 = 1;
    pub const DEL_TOKEN: u8 = 1;
    pub const RESET_APP: u8 = 1;
}

/// Client-side settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Bound on the wait for each response
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            read_timeout: timeout::DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Name and version of whatever is running on the device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameVersion {
    /// First four-character name word
    pub name0: String,
    /// Second four-character name word
    pub name1: String,
    /// Version number
    pub version: u32,
}

impl NameVersion {
    /// Unpack from the 12 bytes following the response code
    pub fn unpack(data: &[u8]) -> Result<NameVersion, Error> {
        if data.len() < 12 {
            return Err(Error::UnexpectedEof);
        }
        Ok(NameVersion {
            name0: String::from_utf8_lossy(&data[0..4]).into_owned(),
            name1: String::from_utf8_lossy(&data[4..8]).into_owned(),
            version: LittleEndian::read_u32(&data[8..12]),
        })
    }

    /// Whether this is the TOTP device app
    pub fn is_totp_app(&self) -> bool {
        self.name0 == identity::TK1_NAME0 && self.name1 == identity::APP_NAME1
    }

    /// Whether this is the firmware
    pub fn is_firmware(&self) -> bool {
        self.name0 == identity::TK1_NAME0 && self.name1 == identity::FIRMWARE_NAME1
    }
}

impl fmt::Display for NameVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{} version {}", self.name0, self.name1, self.version)
    }
}

/// Progress of one multi-chunk download
///
/// The device reports, with each chunk, how many bytes of the whole transfer
/// are left including that chunk. The first report fixes the total. The
/// device's count is authoritative: a chunk is only committed once the next
/// report shows how far the device actually moved past it, and never more
/// than the frame carried.
#[derive(Debug, Default)]
struct Transfer {
    declared: Option<usize>,
    /// Count from the latest report
    last: usize,
    /// Chunk from the latest report, not yet committed
    held: Vec<u8>,
    data: Vec<u8>,
}

impl Transfer {
    /// Take one chunk; returns whether the transfer is complete
    fn accept(&mut self, response: &'static str, bytes_remaining: usize, chunk: &[u8]) -> Result<bool, Error> {
        let declared = match self.declared {
            None => {
                self.declared = Some(bytes_remaining);
                self.data.reserve(bytes_remaining);
                bytes_remaining
            }
            Some(declared) => {
                if bytes_remaining >= self.last {
                    return Err(Error::TransferOutOfSync {
                        response,
                        expected: self.last.saturating_sub(self.held.len()),
                        found: bytes_remaining,
                    });
                }
                let step = cmp::min(self.last - bytes_remaining, self.held.len());
                self.commit(declared, step);
                declared
            }
        };
        self.last = bytes_remaining;
        self.held.clear();
        self.held.extend_from_slice(chunk);
        if bytes_remaining <= chunk.len() {
            self.commit(declared, bytes_remaining);
            return Ok(true);
        }
        if chunk.is_empty() {
            return Err(Error::UnexpectedEof);
        }
        Ok(false)
    }

    /// Move the first `n` held bytes into the data, up to the declared total
    fn commit(&mut self, declared: usize, n: usize) {
        let n = cmp::min(n, declared - self.data.len());
        self.data.extend_from_slice(&self.held[..n]);
        self.held.clear();
    }

    fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Structure representing a session with the TOTP device app
///
/// Owns the connection for as long as it lives.
pub struct TotpApp<T> {
    transport: T,
    config: ClientConfig,
}

impl<T: Transport> TotpApp<T> {
    /// Wraps a connection on which the TOTP app is running
    pub fn new(transport: T) -> Self {
        TotpApp::with_config(transport, ClientConfig::default())
    }

    /// Wraps a connection with explicit settings
    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        TotpApp { transport, config }
    }

    /// Borrow the underlying connection
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Give up the session, returning the connection
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Closes the connection
    pub fn close(mut self) -> Result<(), Error> {
        self.transport.close()
    }

    fn exchange(&mut self, tx: &[u8], expected: &Command, id: u8) -> Result<Vec<u8>, Error> {
        transport::exchange(&mut self.transport, tx, expected, id, Some(self.config.read_timeout))
    }

    /// Round trip for a response which carries only a status byte
    fn exchange_status(&mut self, cmd: &Command, tx: &[u8], expected: &Command, id: u8) -> Result<Vec<u8>, Error> {
        let rx = self.exchange(tx, expected, id)?;
        transport::check_status(cmd, &rx)?;
        Ok(rx)
    }

    /// Gets the name and version of the running app
    pub fn get_app_name_version(&mut self) -> Result<NameVersion, Error> {
        let tx = new_frame_buf(&app::CMD_GET_NAME_VERSION, id::GET_NAME_VERSION)?;
        let rx = self.exchange(&tx, &app::RSP_GET_NAME_VERSION, id::GET_NAME_VERSION)?;
        NameVersion::unpack(&rx[2..])
    }

    /// Requests the next chunk of the encrypted record blob
    ///
    /// Returns the number of bytes the device says are left, counting this
    /// chunk, and the chunk area of the frame. Only the first
    /// `min(bytes_remaining, chunk.len())` bytes of the chunk are data.
    pub fn get_records(&mut self) -> Result<(usize, Vec<u8>), Error> {
        self.get_chunk(&app::CMD_GET_RECORDS, &app::RSP_GET_RECORDS, id::GET_RECORDS)
    }

    /// Requests the next chunk of the record label list
    pub fn get_list(&mut self) -> Result<(usize, Vec<u8>), Error> {
        self.get_chunk(&app::CMD_GET_LIST, &app::RSP_GET_LIST, id::GET_LIST)
    }

    fn get_chunk(&mut self, cmd: &Command, rsp: &Command, id: u8) -> Result<(usize, Vec<u8>), Error> {
        let tx = new_frame_buf(cmd, id)?;
        let rx = self.exchange_status(cmd, &tx, rsp, id)?;
        if rx.len() < CHUNK_OFFSET {
            return Err(Error::UnexpectedEof);
        }
        let bytes_left = usize::from(LittleEndian::read_u16(&rx[REMAINING_OFFSET..CHUNK_OFFSET]));
        debug!("{}: {} bytes left", rsp.name(), bytes_left);
        Ok((bytes_left, rx[CHUNK_OFFSET..].to_vec()))
    }

    /// Sends one chunk of an encrypted record blob
    ///
    /// The chunk may be at most [`PAYLOAD_MAX_BYTES`] long and is zero-padded
    /// to the frame length. There is no sequence number on the wire, so
    /// chunks must be sent in order.
    pub fn load_records(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if chunk.len() > PAYLOAD_MAX_BYTES {
            return Err(Error::ChunkTooLarge {
                len: chunk.len(),
                max: PAYLOAD_MAX_BYTES,
            });
        }
        let mut tx = new_frame_buf(&app::CMD_LOAD_RECORDS, id::LOAD_RECORDS)?;
        tx[2..2 + chunk.len()].copy_from_slice(chunk);
        self.exchange_status(&app::CMD_LOAD_RECORDS, &tx, &app::RSP_LOAD_RECORDS, id::LOAD_RECORDS)?;
        Ok(())
    }

    /// Asks the device to calculate the token for the record at `index`
    pub fn calc_token(&mut self, index: u8) -> Result<Vec<u8>, Error> {
        let mut tx = new_frame_buf(&app::CMD_CALC_TOKEN, id::CALC_TOKEN)?;
        tx[2] = index;
        let rx = self.exchange_status(&app::CMD_CALC_TOKEN, &tx, &app::RSP_CALC_TOKEN, id::CALC_TOKEN)?;
        let len = usize::from(*rx.get(STATUS_OFFSET + 1).ok_or(Error::UnexpectedEof)?);
        let start = STATUS_OFFSET + 2;
        if start + len > rx.len() {
            return Err(Error::ResponseWrongLength {
                response: app::RSP_CALC_TOKEN.name(),
                expected: start + len,
                found: rx.len(),
            });
        }
        Ok(rx[start..start + len].to_vec())
    }

    /// Adds a single record
    pub fn add_token(&mut self, record: &Record) -> Result<(), Error> {
        let encoded = record.encode();
        let mut tx = new_frame_buf(&app::CMD_ADD_TOKEN, id::ADD_TOKEN)?;
        tx[2..2 + encoded.len()].copy_from_slice(&encoded);
        self.exchange_status(&app::CMD_ADD_TOKEN, &tx, &app::RSP_ADD_TOKEN, id::ADD_TOKEN)?;
        info!("added record {:?}", record.name());
        Ok(())
    }

    /// Deletes the record at `index`
    pub fn del_token(&mut self, index: u8) -> Result<(), Error> {
        let mut tx = new_frame_buf(&app::CMD_DEL_TOKEN, id::DEL_TOKEN)?;
        tx[2] = index;
        self.exchange_status(&app::CMD_DEL_TOKEN, &tx, &app::RSP_DEL_TOKEN, id::DEL_TOKEN)?;
        info!("deleted record {}", index);
        Ok(())
    }

    /// Clears every record stored in the app
    ///
    /// The one-byte response has no room for a status byte; the device
    /// signals failure through the frame header instead.
    pub fn reset_app(&mut self) -> Result<(), Error> {
        let tx = new_frame_buf(&app::CMD_RESET_APP, id::RESET_APP)?;
        self.exchange(&tx, &app::RSP_RESET_APP, id::RESET_APP)?;
        info!("reset app; all records cleared");
        Ok(())
    }

    /// Sends a whole record blob, split into [`PAYLOAD_MAX_BYTES`] chunks
    ///
    /// Returns the number of chunks sent. Stops at the first failure, which
    /// leaves the device holding a partial blob.
    pub fn upload_records(&mut self, data: &[u8]) -> Result<usize, Error> {
        let mut n = 0;
        for chunk in data.chunks(PAYLOAD_MAX_BYTES) {
            self.load_records(chunk)?;
            n += 1;
        }
        debug!("uploaded {} bytes in {} chunks", data.len(), n);
        Ok(n)
    }

    /// Fetches the whole encrypted record blob
    pub fn download_records(&mut self) -> Result<Vec<u8>, Error> {
        let mut transfer = Transfer::default();
        loop {
            let (bytes_left, chunk) = self.get_records()?;
            if transfer.accept(app::RSP_GET_RECORDS.name(), bytes_left, &chunk)? {
                return Ok(transfer.into_data());
            }
        }
    }

    /// Fetches the labels of all stored records
    pub fn list_records(&mut self) -> Result<RecordList, Error> {
        let mut transfer = Transfer::default();
        loop {
            let (bytes_left, chunk) = self.get_list()?;
            if transfer.accept(app::RSP_GET_LIST.name(), bytes_left, &chunk)? {
                return RecordList::decode(&transfer.into_data());
            }
        }
    }
}

/// Number of `load_records` calls needed to upload `len` bytes
pub fn chunk_count(len: usize) -> usize {
    (len + PAYLOAD_MAX_BYTES - 1) / PAYLOAD_MAX_BYTES
}
