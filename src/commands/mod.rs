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

//! Subcommands
//!
//! Different subcommands supported by the command-line utility
//!

mod add;
mod backup;
mod calc;
mod del;
mod info;
mod list;
mod reset;
mod restore;

use anyhow::{self, Context};
use serde::de::DeserializeOwned;
use std::{fs, path::Path};
use tkey_totp::{TotpApp, Transport};

pub trait Command {
    type Options: DeserializeOwned;

    fn execute<T: Transport>(options: Self::Options, app: &mut TotpApp<T>) -> anyhow::Result<()>;
}

macro_rules! register_commands {
    ($($cmd_name:ident, $type_name:ident, $help:expr;)*) => {
        $(use self::$cmd_name::$type_name;)*

        /// Prints the list of subcommands
        pub fn print_commands() {
            eprintln!("Commands:");
            $(eprintln!("    {:8} {}", stringify!($cmd_name), $help);)*
        }

        /// Whether `cmd` names a subcommand
        pub fn is_command(cmd: &str) -> bool {
            match cmd {
                $(stringify!($cmd_name) => true,)*
                _ => false,
            }
        }

        /// Run the subcommand `cmd` with JSON-encoded `options`
        pub fn execute<T: Transport>(
            cmd: &str,
            options: &str,
            app: &mut TotpApp<T>,
        ) -> anyhow::Result<()> {
            match cmd {
                $(stringify!($cmd_name) => {
                    let opts: <$type_name as Command>::Options = serde_json::from_str(options)
                        .with_context(|| format!(
                            "deserializing options for {}",
                             stringify!($cmd_name),
                        ))?;
                    $type_name::execute(opts, app)
                }),*
                _ => Err(anyhow::Error::msg(format!("unknown command {}", cmd))),
            }
        }
    }
}

register_commands! {
    info, Info, "";
    list, List, "";
    calc, Calc, "{ \"index\": int }";
    add, Add, "{ \"name\": string, \"secret\": hexstring, \"digits\": int (optional), \"config\": int (optional) }";
    del, Del, "{ \"index\": int }";
    reset, Reset, "";
    backup, Backup, "{ \"file\": string }";
    restore, Restore, "{ \"file\": string }";
}

/// Write `data` to `path` through a temporary file, so an interrupted
/// write never clobbers an existing backup
fn write_atomically<P: AsRef<Path>>(path: P, data: &[u8]) -> anyhow::Result<()> {
    let name = path.as_ref().to_string_lossy().into_owned();
    let tmp_name = format!("{}.tmp", name);
    fs::write(&tmp_name, data).with_context(|| format!("writing {}", tmp_name))?;
    fs::rename(&tmp_name, &path).with_context(|| format!("renaming {} to {}", tmp_name, name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tkey_totp::testing::SimulatedTkey;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tkey-totp-cmd-{}-{}", tag, std::process::id()))
    }

    fn names<T: Transport>(app: &mut TotpApp<T>) -> Vec<String> {
        let list = app.list_records().unwrap();
        let ret = list.iter().map(|(_, name)| name.to_owned()).collect();
        ret
    }

    #[test]
    fn registered() {
        for cmd in &["info", "list", "calc", "add", "del", "reset", "backup", "restore"] {
            assert!(is_command(cmd), "{}", cmd);
        }
        assert!(!is_command("getnewaddress"));
        assert!(!is_command(""));
    }

    #[test]
    fn atomic_write() {
        let path = std::env::temp_dir().join(format!("tkey-totp-backup-{}", std::process::id()));
        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(fs::metadata(format!("{}.tmp", path.to_string_lossy())).is_err());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn backup_reset_restore() {
        let device = SimulatedTkey::running_app();
        device.add_record("GitHub", b"JBSWY3DPEHPK3PXP");
        device.add_record("Mail", b"hunter2");
        let blob = device.records_blob();
        let mut app = TotpApp::new(device.clone());

        let path = temp_path("backup");
        let options = format!("{{\"file\": {:?}}}", path.to_string_lossy());
        execute("backup", &options, &mut app).unwrap();
        assert_eq!(fs::read(&path).unwrap(), blob);

        execute("reset", "{}", &mut app).unwrap();
        assert!(names(&mut app).is_empty());

        execute("restore", &options, &mut app).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(names(&mut app), vec!["GitHub", "Mail"]);
        assert_eq!(device.records_blob(), blob);
        assert_eq!(device.current_timeout(), None);
    }

    #[test]
    fn restore_refuses_empty_file() {
        let device = SimulatedTkey::running_app();
        let mut app = TotpApp::new(device.clone());
        let path = temp_path("empty");
        fs::write(&path, b"").unwrap();
        let options = format!("{{\"file\": {:?}}}", path.to_string_lossy());
        let err = execute("restore", &options, &mut app).unwrap_err();
        fs::remove_file(&path).unwrap();
        assert!(err.to_string().contains("is empty"));
        assert_eq!(device.frames_received(), 0);
    }

    #[test]
    fn add_duplicate_name() {
        let device = SimulatedTkey::running_app();
        let mut app = TotpApp::new(device);
        let options = r#"{"name": "GitHub", "secret": "48656c6c6f21deadbeef"}"#;
        execute("add", options, &mut app).unwrap();
        // Warned about, but still stored
        execute("add", options, &mut app).unwrap();
        assert_eq!(names(&mut app), vec!["GitHub", "GitHub"]);

        assert!(execute("add", r#"{"name": "x", "secret": "not hex"}"#, &mut app).is_err());
        assert!(execute("add", r#"{"name": "x"}"#, &mut app).is_err());
        assert_eq!(names(&mut app).len(), 2);
    }

    #[test]
    fn del_unknown_index() {
        let device = SimulatedTkey::running_app();
        device.add_record("a", b"1");
        device.add_record("b", b"2");
        let mut app = TotpApp::new(device);

        let err = execute("del", r#"{"index": 7}"#, &mut app).unwrap_err();
        assert!(err.to_string().contains("deleting record 7"));
        assert_eq!(names(&mut app), vec!["a", "b"]);

        execute("del", r#"{"index": 0}"#, &mut app).unwrap();
        assert_eq!(names(&mut app), vec!["b"]);
    }

    #[test]
    fn calc_and_info() {
        let device = SimulatedTkey::running_app();
        device.add_record("x", b"secret");
        let mut app = TotpApp::new(device.clone());

        execute("calc", r#"{"index": 0}"#, &mut app).unwrap();
        assert!(execute("calc", r#"{"index": 1}"#, &mut app).is_err());
        assert!(execute("calc", r#"{"index": 0, "extra": 1}"#, &mut app).is_err());
        execute("info", "{}", &mut app).unwrap();
        execute("list", "{}", &mut app).unwrap();
        assert!(execute("frobnicate", "{}", &mut app).is_err());
        assert_eq!(device.current_timeout(), None);
    }
}
