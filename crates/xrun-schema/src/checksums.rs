//! Checksum manifests in the `sha256sum` text format.
//!
//! Each line is `<hex digest><sep><filename>` where a `*` before the filename
//! marks binary mode. Spaces and tabs both separate.

use thiserror::Error;

const SEPARATORS: &[char] = &[' ', '\t'];

/// A manifest parse that yielded no new entries.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("no properly formatted checksum lines found")]
pub struct ChecksumsError;

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Decoded digest bytes.
    pub digest: Vec<u8>,
    /// Whether the filename was prefixed with `*`.
    pub binary_mode: bool,
    /// Filename, trailing whitespace preserved.
    pub filename: String,
}

/// Accumulated manifest entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checksums {
    /// Entries in input order.
    pub entries: Vec<Entry>,
    /// Count of lines that could not be parsed.
    pub invalid_lines: u32,
}

impl Checksums {
    /// Parse `text`, appending to the existing entries.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumsError`] when `text` contributed no entry. Entries
    /// and the invalid line count are updated either way.
    pub fn parse_into(&mut self, text: &str) -> Result<(), ChecksumsError> {
        let before = self.entries.len();
        for line in text.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Some(entry) => self.entries.push(entry),
                None => self.invalid_lines += 1,
            }
        }
        if self.entries.len() == before {
            return Err(ChecksumsError);
        }
        Ok(())
    }

    /// Serialize back to manifest text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&hex::encode(&entry.digest));
            out.push_str(if entry.binary_mode { " *" } else { "  " });
            out.push_str(&entry.filename);
            out.push('\n');
        }
        out
    }

    /// Entries for exactly `filename`.
    pub fn get<'a>(&'a self, filename: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries.iter().filter(move |e| e.filename == filename)
    }
}

fn parse_line(line: &str) -> Option<Entry> {
    let line = line.trim_start_matches(SEPARATORS);
    let ix = line.find(SEPARATORS)?;
    if ix % 2 == 1 {
        return None;
    }
    let digest = hex::decode(&line[..ix]).ok()?;
    let rest = line[ix..].trim_start_matches(SEPARATORS);
    let (binary_mode, filename) = match rest.strip_prefix('*') {
        Some(name) => (true, name),
        None => (false, rest),
    };
    if filename.is_empty() {
        return None;
    }
    Some(Entry {
        digest,
        binary_mode,
        filename: filename.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(digest: &[u8], binary_mode: bool, filename: &str) -> Entry {
        Entry {
            digest: digest.to_vec(),
            binary_mode,
            filename: filename.to_string(),
        }
    }

    #[test]
    fn test_parse_various() {
        let mut cs = Checksums::default();
        cs.parse_into("ff01  filename.txt\nff02 *binfile.bin\n\nff03 one space\n# This is a comment\n")
            .unwrap();
        cs.parse_into(
            "This is an invalid line\nff04 \t various spaces, trailing preserved \nAnother invalid line",
        )
        .unwrap();

        assert_eq!(cs.invalid_lines, 2);
        assert_eq!(
            cs.entries,
            vec![
                entry(&[0xff, 0x01], false, "filename.txt"),
                entry(&[0xff, 0x02], true, "binfile.bin"),
                entry(&[0xff, 0x03], false, "one space"),
                entry(&[0xff, 0x04], false, "various spaces, trailing preserved "),
            ]
        );
    }

    #[test]
    fn test_parse_nothing_is_error() {
        for (input, invalid) in [("", 0), ("deadbeef", 1), ("deadbeef ", 1), ("abc file", 1)] {
            let mut cs = Checksums::default();
            assert_eq!(cs.parse_into(input), Err(ChecksumsError), "{input:?}");
            assert!(cs.entries.is_empty());
            assert_eq!(cs.invalid_lines, invalid, "{input:?}");
        }
    }

    #[test]
    fn test_to_text_preserves_entries() {
        let text = "00ff  a.tar.gz\nabcd *b.zip\n";
        let mut cs = Checksums::default();
        cs.parse_into(&format!("{text}garbage\n")).unwrap();
        assert_eq!(cs.invalid_lines, 1);
        assert_eq!(cs.to_text(), text);
    }

    #[test]
    fn test_get() {
        let mut cs = Checksums::default();
        cs.parse_into("01  a\n02  b\n03 *a\n").unwrap();
        let got: Vec<_> = cs.get("a").map(|e| e.digest.clone()).collect();
        assert_eq!(got, vec![vec![0x01], vec![0x03]]);
        assert_eq!(cs.get("c").count(), 0);
    }
}
