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

//! `info`
//!
//! Reports what is running on the device and how many records it holds
//!

use anyhow::Context;
use serde::Deserialize;
use tkey_totp::{constants::record::MAX_RECORDS, TotpApp, Transport};

/// Gets information
pub struct Info;

/// Gets information
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {}

impl super::Command for Info {
    type Options = Options;

    fn execute<T: Transport>(_: Self::Options, app: &mut TotpApp<T>) -> anyhow::Result<()> {
        let nv = app.get_app_name_version().context("getting app name and version")?;
        let list = app.list_records().context("listing records")?;
        println!("App: {}", nv);
        println!("Records: {} of {}", list.len(), MAX_RECORDS);
        Ok(())
    }
}
