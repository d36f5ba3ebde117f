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

//! `calc`
//!
//! Asks the device for the current token of one record
//!

use anyhow::Context;
use serde::Deserialize;
use tkey_totp::{TotpApp, Transport};

/// Calculates a token
pub struct Calc;

/// Calculates a token
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    /// Record index, as shown by `list`
    index: u8,
}

impl super::Command for Calc {
    type Options = Options;

    fn execute<T: Transport>(options: Self::Options, app: &mut TotpApp<T>) -> anyhow::Result<()> {
        let token = app
            .calc_token(options.index)
            .with_context(|| format!("calculating token for record {}", options.index))?;
        println!("{}", String::from_utf8_lossy(&token));
        Ok(())
    }
}
