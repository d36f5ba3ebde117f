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

//! `backup`
//!
//! Saves the encrypted record blob to a file. The blob can only be decrypted
//! by the same app loaded with the same USS on the same TKey.
//!

use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;
use tkey_totp::{TotpApp, Transport};

/// Backs up the records
pub struct Backup;

/// Backs up the records
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    /// File to write the blob to
    file: PathBuf,
}

impl super::Command for Backup {
    type Options = Options;

    fn execute<T: Transport>(options: Self::Options, app: &mut TotpApp<T>) -> anyhow::Result<()> {
        let blob = app.download_records().context("downloading records")?;
        super::write_atomically(&options.file, &blob)?;
        println!(
            "Wrote {} byte record blob to {}.",
            blob.len(),
            options.file.to_string_lossy(),
        );
        Ok(())
    }
}
