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

//! `del`
//!
//! Deletes one record
//!

use anyhow::Context;
use serde::Deserialize;
use tkey_totp::{TotpApp, Transport};

/// Deletes a record
pub struct Del;

/// Deletes a record
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    index: u8,
}

impl super::Command for Del {
    type Options = Options;

    fn execute<T: Transport>(options: Self::Options, app: &mut TotpApp<T>) -> anyhow::Result<()> {
        let list = app.list_records().context("listing records")?;
        let name = list.get(options.index).map(str::to_owned);
        app.del_token(options.index)
            .with_context(|| format!("deleting record {}", options.index))?;
        match name {
            Some(name) => println!("Deleted record {} ({:?}).", options.index, name),
            None => println!("Deleted record {}.", options.index),
        }
        Ok(())
    }
}
