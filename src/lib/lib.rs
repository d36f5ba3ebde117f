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

//! # TKey TOTP Library
//!
//! Host-side client for the TOTP app on a Tillitis TKey. The device holds the
//! TOTP secrets and computes the tokens; this library speaks the framed
//! command protocol used to manage the records and ask for tokens, and knows
//! how to get the app running on a freshly plugged-in key.
//!

// Coding conventions
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![deny(missing_docs)]

pub mod app;
pub mod bootstrap;
pub mod catalog;
pub mod constants;
mod error;
pub mod firmware;
pub mod frame;
mod record;
pub mod transport;
mod uss;
mod util;

/// Simulated devices, shared with the command-line tests
#[doc(hidden)]
pub mod testing;

pub use app::{chunk_count, ClientConfig, NameVersion, TotpApp};
pub use bootstrap::{connect, establish, BootstrapConfig, Outcome, Session};
pub use catalog::PAYLOAD_MAX_BYTES;
pub use error::{Error, ErrorKind};
pub use firmware::{Firmware, Mode};
pub use record::{Record, RecordList};
pub use transport::{AppLoader, SerialTransport, Transport};
pub use uss::UssSource;
pub use util::blake2s;
