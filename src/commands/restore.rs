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

//! `restore`
//!
//! Sends a record blob written by `backup` back to the device
//!

use anyhow::Context;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tkey_totp::{chunk_count, TotpApp, Transport};

/// Restores the records
pub struct Restore;

/// Restores the records
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    /// File holding the blob
    file: PathBuf,
}

impl super::Command for Restore {
    type Options = Options;

    fn execute<T: Transport>(options: Self::Options, app: &mut TotpApp<T>) -> anyhow::Result<()> {
        let name = options.file.to_string_lossy().into_owned();
        let blob = fs::read(&options.file).with_context(|| format!("reading {}", name))?;
        if blob.is_empty() {
            return Err(anyhow::Error::msg(format!("{} is empty", name)));
        }
        println!(
            "Sending {} bytes in {} chunks. Do not unplug the TKey or interrupt.",
            blob.len(),
            chunk_count(blob.len()),
        );
        let n = app.upload_records(&blob).context("uploading records")?;
        let list = app.list_records().context("listing restored records")?;
        println!("Sent {} chunks; the device now holds {} records.", n, list.len());
        Ok(())
    }
}
