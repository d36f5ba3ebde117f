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

//! # Test Devices
//!
//! Two stand-ins for a real TKey. [`ScriptedTransport`] replays canned
//! frames and records everything the client does; [`SimulatedTkey`] keeps
//! enough state to behave like the firmware and the TOTP app.
//!
//! Test support only: the helpers here panic on malformed input.
//!

#![allow(missing_docs)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};

use crate::catalog::{app, firmware, Command};
use crate::constants::frame::{status, CHUNK_OFFSET, MAX_FRAME_LEN};
use crate::constants::identity;
use crate::constants::load::{DIGEST_LEN, READY_DIGEST_OFFSET, USS_FLAG_OFFSET, USS_OFFSET};
use crate::constants::record::{ENCODED_LEN, MAX_RECORDS};
use crate::frame::{new_frame_buf, validate_response, CmdLen, Endpoint, FrameHeader};
use crate::record::{Record, RecordList};
use crate::transport::Transport;
use crate::{util, Error};

/// Build a response frame with `payload` written from offset 2
pub fn response(cmd: &Command, id: u8, payload: &[u8]) -> Vec<u8> {
    let mut ret = new_frame_buf(cmd, id).unwrap();
    ret[2..2 + payload.len()].copy_from_slice(payload);
    ret
}

/// Build the one-byte "not OK" frame a device sends for a request it refuses
pub fn not_ok(cmd: &Command, id: u8) -> Vec<u8> {
    let header = FrameHeader {
        id,
        endpoint: cmd.endpoint().bits(),
        cmd_len: CmdLen::Len1,
        response_not_ok: true,
    };
    vec![header.encode(), 0]
}

/// Build an OK GetRecords/GetList style response
pub fn chunk_response(cmd: &Command, id: u8, remaining: usize, chunk: &[u8]) -> Vec<u8> {
    let mut ret = response(cmd, id, &[status::OK]);
    LittleEndian::write_u16(&mut ret[3..CHUNK_OFFSET], remaining as u16);
    ret[CHUNK_OFFSET..CHUNK_OFFSET + chunk.len()].copy_from_slice(chunk);
    ret
}

/// Transport which replays scripted responses
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: VecDeque<Result<Vec<u8>, Error>>,
    /// Every frame written, in order
    pub written: Vec<Vec<u8>>,
    /// Every timeout change, in order
    pub timeouts: Vec<Option<Duration>>,
    /// The read bound currently in force
    pub current_timeout: Option<Duration>,
    /// Make the next write fail
    pub fail_next_write: bool,
    /// Whether `close` was called
    pub closed: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Default::default()
    }

    /// Queue a frame for the next read
    pub fn reply(&mut self, frame: Vec<u8>) {
        self.replies.push_back(Ok(frame));
    }

    /// Queue a failure for the next read
    pub fn fail_read(&mut self, err: Error) {
        self.replies.push_back(Err(err));
    }
}

impl Transport for ScriptedTransport {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        if self.fail_next_write {
            self.fail_next_write = false;
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged").into());
        }
        self.written.push(frame.to_vec());
        Ok(())
    }

    fn read_frame(&mut self, expected: &Command, id: u8) -> Result<(Vec<u8>, FrameHeader), Error> {
        match self.replies.pop_front() {
            Some(Ok(frame)) => {
                let header = validate_response(&frame, expected, id)?;
                Ok((frame, header))
            }
            Some(Err(e)) => Err(e),
            None => Err(Error::Timeout {
                response: expected.name(),
            }),
        }
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        self.timeouts.push(timeout);
        self.current_timeout = timeout;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.closed = true;
        Ok(())
    }
}

/// Size of the encrypted record blob:
/// `nbr_records, records[MAX_RECORDS], config, nonce[24], mac[16]`
pub const BLOB_LEN: usize = 1 + MAX_RECORDS * ENCODED_LEN + 1 + 24 + 16;

/// Largest chunk the app puts in one GetRecords/GetList response
const OUT_CHUNK: usize = MAX_FRAME_LEN - CHUNK_OFFSET;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Running {
    Firmware,
    App(&'static str),
}

/// A bulk transfer from device to host in progress
#[derive(Debug)]
struct Outgoing {
    code: u8,
    data: Vec<u8>,
    offset: usize,
}

#[derive(Debug)]
struct State {
    running: Running,
    records: Vec<Record>,
    pending: VecDeque<Vec<u8>>,
    timeout: Option<Duration>,
    frames: usize,
    closed: bool,
    outgoing: Option<Outgoing>,
    incoming: Vec<u8>,
    app_size: usize,
    app: Vec<u8>,
    uss: Option<[u8; DIGEST_LEN]>,
    loaded_app: Option<Vec<u8>>,
    loaded_uss: Option<[u8; DIGEST_LEN]>,
    corrupt_digest: bool,
    count_step: Option<usize>,
}

/// In-memory model of a TKey
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect the device through another.
#[derive(Clone, Debug)]
pub struct SimulatedTkey {
    state: Rc<RefCell<State>>,
}

impl SimulatedTkey {
    fn with_running(running: Running) -> Self {
        SimulatedTkey {
            state: Rc::new(RefCell::new(State {
                running,
                records: vec![],
                pending: VecDeque::new(),
                timeout: None,
                frames: 0,
                closed: false,
                outgoing: None,
                incoming: vec![],
                app_size: 0,
                app: vec![],
                uss: None,
                loaded_app: None,
                loaded_uss: None,
                corrupt_digest: false,
                count_step: None,
            })),
        }
    }

    /// A freshly plugged-in device waiting for an app
    pub fn firmware() -> Self {
        SimulatedTkey::with_running(Running::Firmware)
    }

    /// A device already running the TOTP app
    pub fn running_app() -> Self {
        SimulatedTkey::with_running(Running::App(identity::APP_NAME1))
    }

    /// A device running some unrelated app
    pub fn running_other_app() -> Self {
        SimulatedTkey::with_running(Running::App("sign"))
    }

    /// Store a record directly, bypassing the protocol
    pub fn add_record(&self, name: &str, secret: &[u8]) {
        let rec = Record::new(name.into(), secret.to_vec()).unwrap();
        self.state.borrow_mut().records.push(rec);
    }

    /// The blob GetRecords would currently return
    pub fn records_blob(&self) -> Vec<u8> {
        encode_blob(&self.state.borrow().records)
    }

    pub fn current_timeout(&self) -> Option<Duration> {
        self.state.borrow().timeout
    }

    /// Number of frames written to the device so far
    pub fn frames_received(&self) -> usize {
        self.state.borrow().frames
    }

    pub fn loaded_app(&self) -> Option<Vec<u8>> {
        self.state.borrow().loaded_app.clone()
    }

    pub fn loaded_uss(&self) -> Option<[u8; DIGEST_LEN]> {
        self.state.borrow().loaded_uss
    }

    /// Make the firmware report the wrong digest after loading
    pub fn corrupt_digest(&self) {
        self.state.borrow_mut().corrupt_digest = true;
    }

    /// Make the app lower its remaining count by `step` per chunk, whatever
    /// the frame actually carried
    pub fn count_step(&self, step: usize) {
        self.state.borrow_mut().count_step = Some(step);
    }

    pub fn closed(&self) -> bool {
        self.state.borrow().closed
    }
}

fn encode_blob(records: &[Record]) -> Vec<u8> {
    let mut ret = vec![0; BLOB_LEN];
    ret[0] = records.len() as u8;
    for (n, rec) in records.iter().enumerate() {
        let start = 1 + n * ENCODED_LEN;
        ret[start..start + ENCODED_LEN].copy_from_slice(&rec.encode());
    }
    ret
}

fn decode_blob(blob: &[u8]) -> Vec<Record> {
    let count = usize::from(blob[0]).min(MAX_RECORDS);
    (0..count)
        .map(|n| {
            let start = 1 + n * ENCODED_LEN;
            Record::decode(&blob[start..start + ENCODED_LEN]).unwrap()
        })
        .collect()
}

/// Stand-in for the device's token calculation; only the shape matters here
fn fake_token(rec: &Record) -> Vec<u8> {
    util::blake2s(rec.secret())
        .iter()
        .take(usize::from(rec.digits))
        .map(|b| b'0' + b % 10)
        .collect()
}

impl State {
    fn handle(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let header = FrameHeader::parse(frame[0]).unwrap();
        let id = header.id;
        let code = frame[1];
        let to_firmware = header.endpoint == Endpoint::Firmware.bits();
        let running = self.running;
        match running {
            Running::Firmware if to_firmware => Some(self.handle_firmware(id, code, frame)),
            // The firmware only listens on its own endpoint
            Running::Firmware => None,
            Running::App(_) if to_firmware => Some(not_ok(&firmware::RSP_GET_NAME_VERSION, id)),
            Running::App(name1) => Some(self.handle_app(name1, id, code, frame)),
        }
    }

    fn handle_firmware(&mut self, id: u8, code: u8, frame: &[u8]) -> Vec<u8> {
        match code {
            0x01 => {
                let mut payload = format!("{}{}", identity::TK1_NAME0, identity::FIRMWARE_NAME1).into_bytes();
                payload.extend(&[2, 0, 0, 0]);
                response(&firmware::RSP_GET_NAME_VERSION, id, &payload)
            }
            0x03 => {
                self.app_size = LittleEndian::read_u32(&frame[2..6]) as usize;
                self.app.clear();
                self.uss = if frame[USS_FLAG_OFFSET] == 1 {
                    let mut uss = [0; DIGEST_LEN];
                    uss.copy_from_slice(&frame[USS_OFFSET..USS_OFFSET + DIGEST_LEN]);
                    Some(uss)
                } else {
                    None
                };
                response(&firmware::RSP_LOAD_APP, id, &[status::OK])
            }
            0x05 => {
                let take = (self.app_size - self.app.len()).min(frame.len() - 2);
                self.app.extend_from_slice(&frame[2..2 + take]);
                if self.app.len() < self.app_size {
                    return response(&firmware::RSP_LOAD_APP_DATA, id, &[status::OK]);
                }
                let mut digest = util::blake2s(&self.app);
                if self.corrupt_digest {
                    digest[0] ^= 0xff;
                }
                let mut ret = response(&firmware::RSP_LOAD_APP_DATA_READY, id, &[status::OK]);
                ret[READY_DIGEST_OFFSET..READY_DIGEST_OFFSET + DIGEST_LEN].copy_from_slice(&digest);
                self.loaded_app = Some(self.app.clone());
                self.loaded_uss = self.uss;
                self.running = Running::App(identity::APP_NAME1);
                ret
            }
            _ => not_ok(&firmware::RSP_GET_NAME_VERSION, id),
        }
    }

    fn handle_app(&mut self, name1: &str, id: u8, code: u8, frame: &[u8]) -> Vec<u8> {
        let ok = |rsp: &Command, good: bool| {
            response(rsp, id, &[if good { status::OK } else { status::BAD }])
        };
        if ![0x05, 0x07].contains(&code) {
            self.outgoing = None;
        }
        match code {
            0x01 => {
                let mut payload = format!("{}{}", identity::TK1_NAME0, name1).into_bytes();
                payload.extend(&[1, 0, 0, 0]);
                response(&app::RSP_GET_NAME_VERSION, id, &payload)
            }
            0x03 => {
                let take = (BLOB_LEN - self.incoming.len()).min(frame.len() - 2);
                self.incoming.extend_from_slice(&frame[2..2 + take]);
                if self.incoming.len() == BLOB_LEN {
                    self.records = decode_blob(&self.incoming);
                    self.incoming.clear();
                }
                ok(&app::RSP_LOAD_RECORDS, true)
            }
            0x05 => {
                if self.records.is_empty() {
                    return ok(&app::RSP_GET_RECORDS, false);
                }
                let blob = encode_blob(&self.records);
                self.next_chunk(&app::RSP_GET_RECORDS, id, blob)
            }
            0x07 => {
                let list: RecordList = self.records.iter().map(Record::name).collect();
                self.next_chunk(&app::RSP_GET_LIST, id, list.encode())
            }
            0x09 => match self.records.get(usize::from(frame[2])) {
                Some(rec) => {
                    let token = fake_token(rec);
                    let mut payload = vec![status::OK, token.len() as u8];
                    payload.extend(token);
                    response(&app::RSP_CALC_TOKEN, id, &payload)
                }
                None => ok(&app::RSP_CALC_TOKEN, false),
            },
            0x0b => {
                if self.records.len() >= MAX_RECORDS {
                    return ok(&app::RSP_ADD_TOKEN, false);
                }
                let rec = Record::decode(&frame[2..2 + ENCODED_LEN]).unwrap();
                self.records.push(rec);
                ok(&app::RSP_ADD_TOKEN, true)
            }
            0x0d => {
                let index = usize::from(frame[2]);
                let good = index < self.records.len();
                if good {
                    self.records.remove(index);
                }
                ok(&app::RSP_DEL_TOKEN, good)
            }
            0x0f => {
                self.records.clear();
                self.incoming.clear();
                response(&app::RSP_RESET_APP, id, &[])
            }
            _ => response(&app::RSP_UNKNOWN_CMD, id, &[]),
        }
    }

    /// Hand out the next chunk of `data`, starting a new transfer if none of
    /// this kind is in progress
    fn next_chunk(&mut self, rsp: &Command, id: u8, data: Vec<u8>) -> Vec<u8> {
        let mut out = match self.outgoing.take() {
            Some(out) if out.code == rsp.code() => out,
            _ => Outgoing {
                code: rsp.code(),
                data,
                offset: 0,
            },
        };
        let end = (out.offset + OUT_CHUNK).min(out.data.len());
        let ret = chunk_response(rsp, id, out.data.len() - out.offset, &out.data[out.offset..end]);
        out.offset = match self.count_step {
            Some(step) => (out.offset + step).min(out.data.len()),
            None => end,
        };
        if out.offset < out.data.len() {
            self.outgoing = Some(out);
        }
        ret
    }
}

impl Transport for SimulatedTkey {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        state.frames += 1;
        if let Some(reply) = state.handle(frame) {
            state.pending.push_back(reply);
        }
        Ok(())
    }

    fn read_frame(&mut self, expected: &Command, id: u8) -> Result<(Vec<u8>, FrameHeader), Error> {
        let frame = self.state.borrow_mut().pending.pop_front();
        match frame {
            Some(frame) => {
                let header = validate_response(&frame, expected, id)?;
                Ok((frame, header))
            }
            None => Err(Error::Timeout {
                response: expected.name(),
            }),
        }
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        self.state.borrow_mut().timeout = timeout;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.state.borrow_mut().closed = true;
        Ok(())
    }
}
