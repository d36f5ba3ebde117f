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

//! `add`
//!
//! Adds a new record
//!

use anyhow::Context;
use serde::Deserialize;
use tkey_totp::{constants::record::DEFAULT_DIGITS, Record, TotpApp, Transport};

/// Adds a record
pub struct Add;

fn default_digits() -> u8 {
    DEFAULT_DIGITS
}

/// Adds a record
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    /// Label of the new record
    name: String,
    /// The TOTP secret, hex-encoded
    secret: String,
    #[serde(default = "default_digits")]
    digits: u8,
    #[serde(default)]
    config: u8,
}

impl super::Command for Add {
    type Options = Options;

    fn execute<T: Transport>(options: Self::Options, app: &mut TotpApp<T>) -> anyhow::Result<()> {
        let secret = hex::decode(&options.secret).context("decoding secret as hex")?;
        let mut record = Record::new(options.name, secret).context("building record")?;
        record.digits = options.digits;
        record.config = options.config;

        let existing = app.list_records().context("listing records")?;
        if existing.find(record.name()).is_some() {
            println!("WARNING: a record named {:?} already exists.", record.name());
        }
        app.add_token(&record)
            .with_context(|| format!("adding record {:?}", record.name()))?;
        println!("Added record {:?}.", record.name());
        Ok(())
    }
}
