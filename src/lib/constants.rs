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

//! # Constants
//!
//! Various constants
//!

/// Serial-port constants
pub mod serial {
    /// Default line speed of the TKey, in bits per second
    pub const DEFAULT_SPEED: u32 = 62500;
}

/// Framing constants
pub mod frame {
    /// Largest frame the device accepts, header byte included
    pub const MAX_FRAME_LEN: usize = 1 + 128;
    /// Offset of the status byte in a status-carrying response
    pub const STATUS_OFFSET: usize = 2;
    /// Offset of the little-endian remaining-byte count in chunked responses
    pub const REMAINING_OFFSET: usize = 3;
    /// Offset of chunk data in chunked responses
    pub const CHUNK_OFFSET: usize = 5;

    /// Status codes
    #[allow(missing_docs)]
    pub mod status {
        pub const OK: u8 = 0x00;
        pub const BAD: u8 = 0x01;
    }
}

/// Identity constants
pub mod identity {
    /// First name word reported by both the firmware and the TOTP app
    pub const TK1_NAME0: &str = "tk1 ";
    /// Second name word reported by the firmware (loader)
    pub const FIRMWARE_NAME1: &str = "mkdf";
    /// Second name word reported by the TOTP device app
    pub const APP_NAME1: &str = "totp";
}

/// App loading constants
pub mod load {
    /// Largest device app the firmware will accept
    pub const MAX_APP_SIZE: usize = 100 * 1024;
    /// Length of the BLAKE2s digest used for the USS and the app digest
    pub const DIGEST_LEN: usize = 32;
    /// Offset of the app size in the LoadApp frame
    pub const SIZE_OFFSET: usize = 2;
    /// Offset of the USS-present flag in the LoadApp frame
    pub const USS_FLAG_OFFSET: usize = 6;
    /// Offset of the hashed USS in the LoadApp frame
    pub const USS_OFFSET: usize = 7;
    /// Offset of the digest in the LoadAppDataReady frame
    pub const READY_DIGEST_OFFSET: usize = 3;
}

/// Device-side record layout (`record_t`)
pub mod record {
    /// Maximum length of a record name
    pub const MAX_NAME_BYTES: usize = 32;
    /// Maximum length of a record secret
    pub const MAX_SECRET_BYTES: usize = 32;
    /// Size of one encoded record:
    /// name[32] name_len secret[32] secret_len digits config
    pub const ENCODED_LEN: usize = MAX_NAME_BYTES + 1 + MAX_SECRET_BYTES + 1 + 1 + 1;
    /// Number of records the device app has room for
    pub const MAX_RECORDS: usize = 32;
    /// Number of digits used when the caller does not say
    pub const DEFAULT_DIGITS: u8 = 6;
}

/// Timeouts
pub mod timeout {
    use std::time::Duration;

    /// Bound on how long we wait for any single response
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
    /// Granularity of the serial read loop when no bound is set
    pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout_fits_one_frame() {
        assert_eq!(record::ENCODED_LEN, 68);
        assert!(record::ENCODED_LEN <= crate::catalog::PAYLOAD_MAX_BYTES);
    }
}
