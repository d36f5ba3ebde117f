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

//! `reset`
//!
//! Clears every record in the app
//!

use anyhow::Context;
use serde::Deserialize;
use tkey_totp::{TotpApp, Transport};

/// Resets the app
pub struct Reset;

/// Resets the app
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {}

impl super::Command for Reset {
    type Options = Options;

    fn execute<T: Transport>(_: Self::Options, app: &mut TotpApp<T>) -> anyhow::Result<()> {
        app.reset_app().context("resetting app")?;
        println!("All records cleared.");
        Ok(())
    }
}
