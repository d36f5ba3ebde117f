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

//! # Bootstrap
//!
//! Gets from "a serial port" to "a TOTP app session". A freshly plugged-in
//! TKey sits in firmware mode and needs the app loaded, together with the
//! USS if the user wants one; a TKey that already runs an app keeps it, and
//! any USS given is ignored, since the app's keys were derived when it was
//! loaded.
//!

use std::fs;
use std::path::PathBuf;

use log::{debug, info, warn};

use crate::app::{ClientConfig, NameVersion, TotpApp};
use crate::constants::serial::DEFAULT_SPEED;
use crate::firmware::{Firmware, Mode};
use crate::transport::{AppLoader, SerialTransport, Transport};
use crate::uss::UssSource;
use crate::{Error, ErrorKind};

/// Everything needed to establish a session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Serial device path. There is no auto-detection.
    pub port: Option<String>,
    /// Line speed in bits per second
    pub speed: u32,
    /// Where the USS comes from, if the app has to be loaded
    pub uss: UssSource,
    /// Device app binary, needed only in firmware mode
    pub app_binary: Option<PathBuf>,
    /// Settings for the resulting client
    pub client: ClientConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig {
            port: None,
            speed: DEFAULT_SPEED,
            uss: UssSource::None,
            app_binary: None,
            client: ClientConfig::default(),
        }
    }
}

/// How the session came about
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// We loaded the app
    Loaded,
    /// The app was already running
    AlreadyRunning {
        /// Whether a USS was asked for and had to be ignored
        uss_ignored: bool,
    },
}

/// A ready session with the TOTP app
pub struct Session<T> {
    /// The client
    pub app: TotpApp<T>,
    /// How we got here
    pub outcome: Outcome,
    /// What the app reported itself as
    pub name_version: NameVersion,
}

/// Opens the configured serial port and establishes a session on it
pub fn connect(config: &BootstrapConfig) -> Result<Session<SerialTransport>, Error> {
    let port = config.port.as_ref().ok_or(Error::NoPort)?;
    let transport = SerialTransport::open(port, config.speed)?;
    establish(transport, config)
}

/// Establishes a session on an already-open connection
///
/// On any failure the connection is closed before the error is returned.
pub fn establish<T: Transport>(transport: T, config: &BootstrapConfig) -> Result<Session<T>, Error> {
    let mut fw = Firmware::new(transport, config.client.read_timeout);
    let mode = match fw.probe_mode() {
        Ok(mode) => mode,
        Err(e) => return Err(close_after(fw.into_transport(), e)),
    };

    let outcome = match mode {
        Mode::Firmware => match load(&mut fw, config) {
            Ok(()) => Outcome::Loaded,
            Err(e) => return Err(close_after(fw.into_transport(), e)),
        },
        Mode::App => {
            let uss_ignored = config.uss.is_some();
            if uss_ignored {
                warn!("app already loaded, your USS won't be used");
            } else {
                info!("app already loaded");
            }
            Outcome::AlreadyRunning { uss_ignored }
        }
    };

    let mut app = TotpApp::with_config(fw.into_transport(), config.client.clone());
    let name_version = match app.get_app_name_version() {
        Ok(nv) if nv.is_totp_app() => nv,
        Ok(nv) => {
            let err = Error::WrongApp {
                found: nv.to_string(),
            };
            return Err(close_after(app.into_transport(), err));
        }
        Err(e) => {
            let err = match e.kind() {
                ErrorKind::Timeout | ErrorKind::Protocol | ErrorKind::DeviceRejected => {
                    debug!("app did not answer GetNameVersion: {}", e);
                    Error::WrongApp {
                        found: format!("no usable answer: {}", e),
                    }
                }
                _ => e,
            };
            return Err(close_after(app.into_transport(), err));
        }
    };
    info!("talking to {}", name_version);

    Ok(Session {
        app,
        outcome,
        name_version,
    })
}

fn load<L: AppLoader>(loader: &mut L, config: &BootstrapConfig) -> Result<(), Error> {
    let path = config.app_binary.as_ref().ok_or(Error::NoAppBinary)?;
    let binary = fs::read(path)?;
    let secret = config.uss.collect()?;
    loader.load_app(&binary, secret.as_deref())
}

fn close_after<T: Transport>(mut transport: T, err: Error) -> Error {
    if let Err(e) = transport.close() {
        warn!("failed to close connection after error: {}", e);
    }
    err
}
