//! Minimal INI reader for provisioning files.
//!
//! `[section]` headers, `key = value` pairs, `#` and `;` comment lines.
//! Section and key lookups are case-insensitive. A value wrapped in double
//! quotes may use `\n`, `\r` and `\t` escapes; anything after the closing
//! quote is dropped.

use crate::error::{Error, Result};
use std::path::Path;

/// One `[name]` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    /// Section name as written.
    pub name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    /// Value of `key` (case-insensitive). The last occurrence wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All pairs in file order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

/// Parsed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ini {
    sections: Vec<Section>,
}

impl Ini {
    /// Read and parse a file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::provision(format!("cannot read {}: {}", path.display(), e)))?;
        Ok(Self::parse(&text))
    }

    /// Parse INI text. Malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut sections: Vec<Section> = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                if let Some(end) = rest.find(']') {
                    sections.push(Section {
                        name: rest[..end].trim().to_string(),
                        entries: Vec::new(),
                    });
                }
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = parse_value(value.trim());
            if key.is_empty() || value.is_empty() {
                continue;
            }
            // Pairs before the first header have nowhere to go.
            if let Some(section) = sections.last_mut() {
                section.entries.push((key.to_string(), value));
            }
        }

        Self { sections }
    }

    /// Sections in file order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Section `name` (case-insensitive).
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

fn parse_value(raw: &str) -> String {
    let Some(quoted) = raw.strip_prefix('"') else {
        return raw.to_string();
    };

    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => break,
            },
            c => out.push(c),
        }
    }
    out
}
