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

//! `list`
//!
//! Lists the labels of all stored records
//!

use anyhow::Context;
use serde::Deserialize;
use tkey_totp::{TotpApp, Transport};

/// Lists all records
pub struct List;

/// Lists all records
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {}

impl super::Command for List {
    type Options = Options;

    fn execute<T: Transport>(_: Self::Options, app: &mut TotpApp<T>) -> anyhow::Result<()> {
        let list = app.list_records().context("listing records")?;
        if list.is_empty() {
            println!("No records stored.");
        }
        for (index, name) in list.iter() {
            println!("  {:3} {}", index, name);
        }
        Ok(())
    }
}
