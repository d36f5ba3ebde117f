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

//! # Firmware
//!
//! The TKey boots into a small firmware whose only job is to receive a device
//! app, measure it, and start it. Once an app is running the firmware is gone
//! until the next power cycle.
//!

use core::convert::TryFrom as _;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};

use crate::app::NameVersion;
use crate::catalog::{firmware, Command};
use crate::constants::load::{
    DIGEST_LEN, MAX_APP_SIZE, READY_DIGEST_OFFSET, SIZE_OFFSET, USS_FLAG_OFFSET, USS_OFFSET,
};
use crate::frame::new_frame_buf;
use crate::transport::{self, AppLoader, Transport};
use crate::{util, Error, ErrorKind};

const FRAME_ID: u8 = 2;

/// What the device is doing when we first talk to it
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// The firmware is waiting for an app
    Firmware,
    /// Some app is already running
    App,
}

/// Structure representing a connection to the firmware
pub struct Firmware<T> {
    transport: T,
    read_timeout: Duration,
}

impl<T: Transport> Firmware<T> {
    /// Wraps a connection; `read_timeout` bounds the mode probe
    pub fn new(transport: T, read_timeout: Duration) -> Self {
        Firmware {
            transport,
            read_timeout,
        }
    }

    /// Give up the firmware session, returning the connection
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn exchange(&mut self, tx: &[u8], expected: &Command, timeout: Option<Duration>) -> Result<Vec<u8>, Error> {
        transport::exchange(&mut self.transport, tx, expected, FRAME_ID, timeout)
    }

    /// Queries the firmware for its name and version
    pub fn get_name_version(&mut self) -> Result<NameVersion, Error> {
        let tx = new_frame_buf(&firmware::CMD_GET_NAME_VERSION, FRAME_ID)?;
        let timeout = Some(self.read_timeout);
        let rx = self.exchange(&tx, &firmware::RSP_GET_NAME_VERSION, timeout)?;
        NameVersion::unpack(&rx[2..])
    }

    /// Works out whether the firmware or an app is listening
    ///
    /// A running app answers firmware frames with a "not OK" frame, or not at
    /// all. Anything that garbles the exchange also counts as app mode; only
    /// lower-layer I/O failures are errors.
    pub fn probe_mode(&mut self) -> Result<Mode, Error> {
        match self.get_name_version() {
            Ok(nv) if nv.is_firmware() => {
                info!("device is in firmware mode ({})", nv);
                Ok(Mode::Firmware)
            }
            Ok(nv) => {
                warn!("unexpected firmware name {}", nv);
                Ok(Mode::App)
            }
            Err(e) => match e.kind() {
                ErrorKind::Timeout | ErrorKind::DeviceRejected => Ok(Mode::App),
                ErrorKind::Protocol => {
                    debug!("firmware probe got a garbled reply: {}", e);
                    Ok(Mode::App)
                }
                _ => Err(e),
            },
        }
    }
}

impl<T: Transport> AppLoader for Firmware<T> {
    fn load_app(&mut self, binary: &[u8], secret: Option<&[u8]>) -> Result<(), Error> {
        if binary.is_empty() {
            return Err(Error::NoAppBinary);
        }
        if binary.len() > MAX_APP_SIZE {
            return Err(Error::AppTooLarge {
                len: binary.len(),
                max: MAX_APP_SIZE,
            });
        }

        // Announce the size, and the hashed USS if there is one
        let mut tx = new_frame_buf(&firmware::CMD_LOAD_APP, FRAME_ID)?;
        let size = u32::try_from(binary.len()).map_err(|_| Error::AppTooLarge {
            len: binary.len(),
            max: MAX_APP_SIZE,
        })?;
        LittleEndian::write_u32(&mut tx[SIZE_OFFSET..SIZE_OFFSET + 4], size);
        if let Some(secret) = secret {
            tx[USS_FLAG_OFFSET] = 1;
            tx[USS_OFFSET..USS_OFFSET + DIGEST_LEN].copy_from_slice(&util::blake2s(secret));
        }
        let rx = self.exchange(&tx, &firmware::RSP_LOAD_APP, None)?;
        transport::check_status(&firmware::CMD_LOAD_APP, &rx)?;

        // Then the binary itself; the last chunk is answered with the digest
        let chunk_len = firmware::CMD_LOAD_APP_DATA.frame_len() - 1;
        let n_chunks = (binary.len() + chunk_len - 1) / chunk_len;
        let mut device_digest = [0; DIGEST_LEN];
        for (n, chunk) in binary.chunks(chunk_len).enumerate() {
            let mut tx = new_frame_buf(&firmware::CMD_LOAD_APP_DATA, FRAME_ID)?;
            tx[2..2 + chunk.len()].copy_from_slice(chunk);
            if n + 1 < n_chunks {
                let rx = self.exchange(&tx, &firmware::RSP_LOAD_APP_DATA, None)?;
                transport::check_status(&firmware::CMD_LOAD_APP_DATA, &rx)?;
            } else {
                let rx = self.exchange(&tx, &firmware::RSP_LOAD_APP_DATA_READY, None)?;
                transport::check_status(&firmware::CMD_LOAD_APP_DATA, &rx)?;
                device_digest
                    .copy_from_slice(&rx[READY_DIGEST_OFFSET..READY_DIGEST_OFFSET + DIGEST_LEN]);
            }
        }

        if device_digest != util::blake2s(binary) {
            return Err(Error::AppDigestMismatch);
        }
        info!(
            "loaded {} byte app in {} chunks{}",
            binary.len(),
            n_chunks,
            if secret.is_some() { " with USS" } else { "" },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::timeout::DEFAULT_READ_TIMEOUT;
    use crate::testing::SimulatedTkey;

    #[test]
    fn probe() {
        let device = SimulatedTkey::firmware();
        let mut fw = Firmware::new(device.clone(), DEFAULT_READ_TIMEOUT);
        assert_eq!(fw.probe_mode().unwrap(), Mode::Firmware);
        assert_eq!(device.current_timeout(), None);

        let device = SimulatedTkey::running_app();
        let mut fw = Firmware::new(device.clone(), DEFAULT_READ_TIMEOUT);
        assert_eq!(fw.probe_mode().unwrap(), Mode::App);
        assert_eq!(device.current_timeout(), None);
    }

    #[test]
    fn load() {
        let device = SimulatedTkey::firmware();
        let mut fw = Firmware::new(device.clone(), DEFAULT_READ_TIMEOUT);
        let binary: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        fw.load_app(&binary, Some(b"correct horse")).unwrap();
        assert_eq!(device.loaded_app(), Some(binary));
        assert_eq!(device.loaded_uss(), Some(util::blake2s(b"correct horse")));
        // 1000 bytes in 127-byte chunks, plus the LoadApp frame
        assert_eq!(device.frames_received(), 1 + 8);
        assert_eq!(fw.probe_mode().unwrap(), Mode::App);
    }

    #[test]
    fn load_without_uss() {
        let device = SimulatedTkey::firmware();
        let mut fw = Firmware::new(device.clone(), DEFAULT_READ_TIMEOUT);
        fw.load_app(&[0x13; 127], None).unwrap();
        assert_eq!(device.loaded_uss(), None);
        assert_eq!(device.loaded_app(), Some(vec![0x13; 127]));
    }

    #[test]
    fn digest_mismatch() {
        let device = SimulatedTkey::firmware();
        device.corrupt_digest();
        let mut fw = Firmware::new(device, DEFAULT_READ_TIMEOUT);
        assert!(matches!(fw.load_app(&[1, 2, 3], None), Err(Error::AppDigestMismatch)));
    }

    #[test]
    fn size_limits() {
        let mut fw = Firmware::new(SimulatedTkey::firmware(), DEFAULT_READ_TIMEOUT);
        assert!(matches!(fw.load_app(&[], None), Err(Error::NoAppBinary)));
        let huge = vec![0; MAX_APP_SIZE + 1];
        assert!(matches!(
            fw.load_app(&huge, None),
            Err(Error::AppTooLarge { len, max: MAX_APP_SIZE }) if len == MAX_APP_SIZE + 1
        ));
    }
}
