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

//! # Records
//!
//! A record is one TOTP secret with its label. The host only ever builds one
//! to hand it to the device with AddToken; stored records come back either as
//! labels (GetList) or as an opaque encrypted blob (GetRecords).
//!

use core::fmt;
use std::collections::BTreeMap;

use crate::constants::record::{DEFAULT_DIGITS, ENCODED_LEN, MAX_NAME_BYTES, MAX_SECRET_BYTES};
use crate::Error;

/// A single TOTP secret entry
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    name: String,
    secret: Vec<u8>,
    /// Number of digits in a calculated token
    pub digits: u8,
    /// Device-defined configuration flags
    pub config: u8,
}

impl Record {
    /// Constructor, checking the name and secret fit the device layout
    pub fn new(name: String, secret: Vec<u8>) -> Result<Record, Error> {
        if name.len() > MAX_NAME_BYTES {
            return Err(Error::RecordFieldTooLong {
                field: "name",
                len: name.len(),
                max: MAX_NAME_BYTES,
            });
        }
        if secret.len() > MAX_SECRET_BYTES {
            return Err(Error::RecordFieldTooLong {
                field: "secret",
                len: secret.len(),
                max: MAX_SECRET_BYTES,
            });
        }
        Ok(Record {
            name,
            secret,
            digits: DEFAULT_DIGITS,
            config: 0,
        })
    }

    /// The record label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw secret
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Encode in the device's `record_t` layout
    pub fn encode(&self) -> [u8; ENCODED_LEN] {
        let mut ret = [0; ENCODED_LEN];
        let mut idx = 0;
        ret[idx..idx + self.name.len()].copy_from_slice(self.name.as_bytes());
        idx += MAX_NAME_BYTES;
        ret[idx] = self.name.len() as u8;
        idx += 1;
        ret[idx..idx + self.secret.len()].copy_from_slice(&self.secret);
        idx += MAX_SECRET_BYTES;
        ret[idx] = self.secret.len() as u8;
        idx += 1;
        ret[idx] = self.digits;
        ret[idx + 1] = self.config;
        ret
    }

    /// Decode from the device's `record_t` layout
    pub fn decode(data: &[u8]) -> Result<Record, Error> {
        if data.len() < ENCODED_LEN {
            return Err(Error::UnexpectedEof);
        }
        let name_len = usize::from(data[MAX_NAME_BYTES]);
        let secret_off = MAX_NAME_BYTES + 1;
        let secret_len = usize::from(data[secret_off + MAX_SECRET_BYTES]);
        let name = String::from_utf8(data[..name_len.min(MAX_NAME_BYTES)].to_vec())?;
        let secret = data[secret_off..secret_off + secret_len.min(MAX_SECRET_BYTES)].to_vec();
        let mut ret = Record::new(name, secret)?;
        ret.digits = data[ENCODED_LEN - 2];
        ret.config = data[ENCODED_LEN - 1];
        Ok(ret)
    }
}

// Never print the secret
impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Record")
            .field("name", &self.name)
            .field("secret", &format_args!("<{} bytes>", self.secret.len()))
            .field("digits", &self.digits)
            .field("config", &self.config)
            .finish()
    }
}

/// Labels of the records stored on the device, keyed by record index
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordList {
    entries: BTreeMap<u8, String>,
}

impl RecordList {
    /// Decode an assembled GetList payload
    ///
    /// The payload is a count byte followed by that many length-prefixed
    /// labels; a label's position is its record index.
    pub fn decode(data: &[u8]) -> Result<RecordList, Error> {
        let (&count, mut data) = data.split_first().ok_or(Error::UnexpectedEof)?;
        let mut entries = BTreeMap::new();
        for index in 0..count {
            let (&len, rest) = data.split_first().ok_or(Error::UnexpectedEof)?;
            let len = usize::from(len);
            if rest.len() < len {
                return Err(Error::UnexpectedEof);
            }
            entries.insert(index, String::from_utf8(rest[..len].to_vec())?);
            data = &rest[len..];
        }
        Ok(RecordList { entries })
    }

    /// Encode as a GetList payload
    pub fn encode(&self) -> Vec<u8> {
        let mut ret = vec![self.entries.len() as u8];
        for name in self.entries.values() {
            ret.push(name.len() as u8);
            ret.extend(name.as_bytes());
        }
        ret
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the device holds no records
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Label of the record at `index`
    pub fn get(&self, index: u8) -> Option<&str> {
        self.entries.get(&index).map(String::as_str)
    }

    /// Iterate over (index, label) pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.entries.iter().map(|(&idx, name)| (idx, name.as_str()))
    }

    /// Find the index of the first record with the given label
    pub fn find(&self, name: &str) -> Option<u8> {
        self.iter().find(|&(_, n)| n == name).map(|(idx, _)| idx)
    }
}

impl<'a> core::iter::FromIterator<&'a str> for RecordList {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        RecordList {
            entries: (0..).zip(iter.into_iter().map(String::from)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let mut rec = Record::new("Test".into(), b"1234".to_vec()).unwrap();
        rec.digits = 8;
        rec.config = 2;
        let enc = rec.encode();
        assert_eq!(&enc[..4], b"Test");
        assert!(enc[4..32].iter().all(|&b| b == 0));
        assert_eq!(enc[32], 4);
        assert_eq!(&enc[33..37], b"1234");
        assert_eq!(enc[65], 4);
        assert_eq!(enc[66], 8);
        assert_eq!(enc[67], 2);
        assert_eq!(Record::decode(&enc).unwrap(), rec);
    }

    #[test]
    fn field_limits() {
        let long_name = "x".repeat(MAX_NAME_BYTES + 1);
        match Record::new(long_name, vec![]) {
            Err(Error::RecordFieldTooLong { field: "name", len: 33, max: 32 }) => {}
            x => panic!("unexpected {:?}", x),
        }
        match Record::new("a".into(), vec![0; MAX_SECRET_BYTES + 1]) {
            Err(Error::RecordFieldTooLong { field: "secret", .. }) => {}
            x => panic!("unexpected {:?}", x),
        }
        // Full-size fields are fine
        let rec = Record::new("y".repeat(32), vec![0xaa; 32]).unwrap();
        assert_eq!(Record::decode(&rec.encode()).unwrap(), rec);
    }

    #[test]
    fn debug_hides_secret() {
        let rec = Record::new("GitHub".into(), b"JBSWY3DPEHPK3PXP".to_vec()).unwrap();
        let s = format!("{:?}", rec);
        assert!(s.contains("GitHub"));
        assert!(!s.contains("JBSW"));
    }

    #[test]
    fn list() {
        let data = [3, 6, b'G', b'i', b't', b'H', b'u', b'b', 0, 2, b'A', b'B'];
        let list = RecordList::decode(&data).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(0), Some("GitHub"));
        assert_eq!(list.get(1), Some(""));
        assert_eq!(list.get(2), Some("AB"));
        assert_eq!(list.find("AB"), Some(2));
        assert_eq!(list.encode(), data.to_vec());

        let empty = RecordList::decode(&[0]).unwrap();
        assert!(empty.is_empty());
        // Trailing padding from the last chunk is ignored
        assert!(RecordList::decode(&[0, 0, 0, 0]).unwrap().is_empty());
    }

    #[test]
    fn list_truncated() {
        assert!(matches!(RecordList::decode(&[]), Err(Error::UnexpectedEof)));
        assert!(matches!(RecordList::decode(&[2, 1, b'a']), Err(Error::UnexpectedEof)));
        assert!(matches!(RecordList::decode(&[1, 5, b'a']), Err(Error::UnexpectedEof)));
    }
}
