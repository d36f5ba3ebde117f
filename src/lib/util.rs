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

//! # Miscellaneous Functions

use blake2::{Blake2s256, Digest};
use log::{debug, log_enabled, Level};

use crate::constants::load::DIGEST_LEN;

/// Compute the BLAKE2s-256 of some slice
///
/// This is the hash the firmware uses both for the app digest and for turning
/// a User Supplied Secret into the 32 bytes it mixes into key derivation.
pub fn blake2s(input: &[u8]) -> [u8; DIGEST_LEN] {
    let mut ret = [0; DIGEST_LEN];
    ret.copy_from_slice(&Blake2s256::digest(input));
    ret
}

/// Log a frame as hex at debug level
///
/// With `redact` only the header and code bytes are shown.
pub fn dump(label: &str, frame: &[u8], redact: bool) {
    if log_enabled!(Level::Debug) {
        debug!("{}", describe(label, frame, redact));
    }
}

fn describe(label: &str, frame: &[u8], redact: bool) -> String {
    if redact {
        let shown = &frame[..frame.len().min(2)];
        format!("{} ({} bytes): {} <payload redacted>", label, frame.len(), hex::encode(shown))
    } else {
        format!("{} ({} bytes): {}", label, frame.len(), hex::encode(frame))
    }
}
