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

//! # User Supplied Secret
//!
//! Where the secret mixed into the app's key derivation comes from. The
//! bytes collected here are handed to the loader as-is; it is the loader
//! that hashes them down to the 32 bytes the firmware wants.
//!

use std::fs;
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::PathBuf;

use crate::Error;

/// Source of the User Supplied Secret
#[derive(Clone, PartialEq, Eq)]
pub enum UssSource {
    /// Load the app without a USS
    None,
    /// Ask for a phrase on the terminal, twice, without echo
    Prompt,
    /// Read the raw contents of a file; `-` means stdin
    File(PathBuf),
    /// Bytes already in hand
    Bytes(Vec<u8>),
}

impl Default for UssSource {
    fn default() -> Self {
        UssSource::None
    }
}

// Bytes may be a secret
impl std::fmt::Debug for UssSource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            UssSource::None => f.write_str("None"),
            UssSource::Prompt => f.write_str("Prompt"),
            UssSource::File(ref path) => f.debug_tuple("File").field(path).finish(),
            UssSource::Bytes(ref b) => write!(f, "Bytes(<{} bytes>)", b.len()),
        }
    }
}

impl UssSource {
    /// Whether a secret will be collected at all
    pub fn is_some(&self) -> bool {
        *self != UssSource::None
    }

    /// Collect the secret
    pub fn collect(&self) -> Result<Option<Vec<u8>>, Error> {
        match *self {
            UssSource::None => Ok(None),
            UssSource::Bytes(ref b) => Ok(Some(b.clone())),
            UssSource::File(ref path) if path.as_os_str() == "-" => {
                let mut ret = vec![];
                io::stdin().lock().read_to_end(&mut ret)?;
                Ok(Some(ret))
            }
            UssSource::File(ref path) => Ok(Some(fs::read(path)?)),
            UssSource::Prompt => {
                let stdin = io::stdin();
                let phrase = if stdin.is_terminal() {
                    confirm_phrase(|prompt| Ok(rpassword::prompt_password(format!("{}: ", prompt))?))?
                } else {
                    // Piped in; there is nothing on screen to hide
                    let mut lock = stdin.lock();
                    confirm_phrase(|prompt| prompt_line(&mut lock, prompt))?
                };
                Ok(Some(phrase))
            }
        }
    }
}

/// Ask for the phrase twice and insist both entries agree
fn confirm_phrase<F>(mut ask: F) -> Result<Vec<u8>, Error>
where
    F: FnMut(&str) -> Result<String, Error>,
{
    let first = ask("Enter phrase for the USS")?;
    let again = ask("Repeat the phrase to confirm")?;
    if first != again {
        return Err(Error::UssMismatch);
    }
    Ok(first.into_bytes())
}

/// Prompt on stderr and read one line, without its line ending
fn prompt_line<R: BufRead>(input: &mut R, prompt: &str) -> Result<String, Error> {
    eprint!("{}: ", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(Error::UnexpectedEof);
    }
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources() {
        assert_eq!(UssSource::None.collect().unwrap(), None);
        assert!(!UssSource::default().is_some());
        assert!(UssSource::Prompt.is_some());

        let bytes = UssSource::Bytes(b"hunter2".to_vec());
        assert_eq!(bytes.collect().unwrap(), Some(b"hunter2".to_vec()));
        assert_eq!(format!("{:?}", bytes), "Bytes(<7 bytes>)");
    }

    #[test]
    fn file_is_not_trimmed() {
        let path = std::env::temp_dir().join(format!("tkey-totp-uss-{}", std::process::id()));
        fs::write(&path, b"  phrase\n").unwrap();
        let got = UssSource::File(path.clone()).collect().unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(got, Some(b"  phrase\n".to_vec()));

        let missing = UssSource::File(path).collect().unwrap_err();
        assert_eq!(missing.kind(), crate::ErrorKind::Transport);
    }

    #[test]
    fn prompt_strips_line_ending() {
        let mut input = io::Cursor::new(b"correct horse\r\nbattery\n".to_vec());
        assert_eq!(prompt_line(&mut input, "a").unwrap(), "correct horse");
        assert_eq!(prompt_line(&mut input, "b").unwrap(), "battery");
        assert!(matches!(prompt_line(&mut input, "c"), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn phrase_confirmed() {
        let mut input = io::Cursor::new(b"correct horse\ncorrect horse\n".to_vec());
        let got = confirm_phrase(|prompt| prompt_line(&mut input, prompt)).unwrap();
        assert_eq!(got, b"correct horse".to_vec());

        let mut input = io::Cursor::new(b"correct horse\ncorrect hose\n".to_vec());
        let err = confirm_phrase(|prompt| prompt_line(&mut input, prompt)).unwrap_err();
        assert!(matches!(err, Error::UssMismatch));

        let mut asked = vec![];
        let _ = confirm_phrase(|prompt| {
            asked.push(prompt.to_owned());
            Ok("x".to_owned())
        });
        assert_eq!(asked.len(), 2);
    }
}
