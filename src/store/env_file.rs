//! Line-preserving `KEY=VALUE` env file model.
//!
//! Reading keeps every line (blank, comment, malformed) so that a rewrite only
//! touches the entries it changes.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

#[allow(clippy::expect_used)]
fn key_pattern() -> &'static Regex {
    static KEY: OnceLock<Regex> = OnceLock::new();
    KEY.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid env key pattern"))
}

/// One physical line of an env file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvLine {
    Blank(String),
    Comment(String),
    Entry {
        key: String,
        value: String,
        raw: String,
    },
    Malformed(String),
}

impl EnvLine {
    fn raw(&self) -> &str {
        match self {
            EnvLine::Blank(raw)
            | EnvLine::Comment(raw)
            | EnvLine::Malformed(raw)
            | EnvLine::Entry { raw, .. } => raw,
        }
    }

    fn entry(key: &str, value: &str) -> Self {
        EnvLine::Entry {
            key: key.to_string(),
            value: value.to_string(),
            raw: format!("{key}={value}"),
        }
    }
}

/// An env file as an ordered list of lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    lines: Vec<EnvLine>,
}

impl EnvFile {
    pub fn parse(contents: &str) -> Self {
        let lines = contents.lines().map(parse_line).collect();
        Self { lines }
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Value of the last entry for `key`, as written (quotes included).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            EnvLine::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Value of `key` with one layer of matching quotes removed.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(unquote)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Malformed lines with their 1-based line numbers.
    pub fn malformed(&self) -> Vec<(usize, &str)> {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| match line {
                EnvLine::Malformed(raw) => Some((i + 1, raw.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Rewrite every entry for `key` in place. Returns whether anything changed.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let mut changed = false;
        for line in &mut self.lines {
            if let EnvLine::Entry { key: k, value: v, .. } = line {
                if k == key && v != value {
                    *line = EnvLine::entry(key, value);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Set `key` in place if present, otherwise append it.
    pub fn upsert(&mut self, key: &str, value: &str) -> bool {
        if self.contains(key) {
            self.set(key, value)
        } else {
            self.lines.push(EnvLine::entry(key, value));
            true
        }
    }

    /// Append entries under a comment header, separated from existing content
    /// by a blank line.
    pub fn append_block(&mut self, header: &str, entries: &[(String, String)]) {
        if entries.is_empty() {
            return;
        }
        if !self.lines.is_empty() {
            self.lines.push(EnvLine::Blank(String::new()));
        }
        self.lines.push(EnvLine::Comment(format!("# {header}")));
        for (k, v) in entries {
            self.lines.push(EnvLine::entry(k, v));
        }
    }

    /// Comment out malformed lines and strip unmatched leading quotes.
    /// Returns the number of lines rewritten.
    pub fn repair_syntax(&mut self) -> usize {
        let mut repaired = 0;
        for line in &mut self.lines {
            let EnvLine::Malformed(raw) = line else {
                continue;
            };
            let trimmed = raw.trim();
            let fixed = match trimmed.split_once('=') {
                Some((k, v)) if key_pattern().is_match(k.trim()) => {
                    EnvLine::entry(k.trim(), strip_unmatched_quote(v.trim()))
                }
                _ => EnvLine::Comment(format!("# {trimmed}")),
            };
            *line = fixed;
            repaired += 1;
        }
        repaired
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line.raw());
            out.push('\n');
        }
        out
    }
}

/// Blank means empty, whitespace only, or an empty quoted string.
pub fn is_blank_value(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v == "\"\"" || v == "''"
}

/// Strip one layer of matching surrounding quotes.
pub fn unquote(value: &str) -> &str {
    let v = value.trim();
    for q in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

fn parse_line(raw: &str) -> EnvLine {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return EnvLine::Blank(raw.to_string());
    }
    if trimmed.starts_with('#') {
        return EnvLine::Comment(raw.to_string());
    }
    match trimmed.split_once('=') {
        Some((k, v)) => {
            let key = k.trim();
            let value = v.trim();
            if key_pattern().is_match(key) && !has_unmatched_quote(value) {
                EnvLine::Entry {
                    key: key.to_string(),
                    value: value.to_string(),
                    raw: raw.to_string(),
                }
            } else {
                EnvLine::Malformed(raw.to_string())
            }
        }
        None => EnvLine::Malformed(raw.to_string()),
    }
}

fn has_unmatched_quote(value: &str) -> bool {
    ['"', '\''].iter().any(|q| {
        value.starts_with(*q) && (value.len() == 1 || !value.ends_with(*q))
    })
}

fn strip_unmatched_quote(value: &str) -> &str {
    if has_unmatched_quote(value) {
        &value[1..]
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# header comment\n\nDATABASE_HOST=db\nREDIS_PASSWORD=\nSECRET_KEY=abc=def\n";

    #[test]
    fn parse_and_render_is_lossless() {
        let env = EnvFile::parse(SAMPLE);
        assert_eq!(env.render(), SAMPLE);
        assert_eq!(env.get("SECRET_KEY"), Some("abc=def"));
        assert_eq!(env.get("REDIS_PASSWORD"), Some(""));
        assert!(env.malformed().is_empty());
    }

    #[test]
    fn set_rewrites_only_the_target_line() {
        let mut env = EnvFile::parse(SAMPLE);
        assert!(env.set("REDIS_PASSWORD", "s3cret"));
        assert!(!env.set("REDIS_PASSWORD", "s3cret"));
        let out = env.render();
        assert!(out.starts_with("# header comment\n\nDATABASE_HOST=db\n"));
        assert!(out.contains("REDIS_PASSWORD=s3cret\n"));
    }

    #[test]
    fn append_block_keeps_existing_content() {
        let mut env = EnvFile::parse("A=1");
        env.append_block(
            "Added by auto-repair",
            &[("B".to_string(), "2".to_string())],
        );
        assert_eq!(env.render(), "A=1\n\n# Added by auto-repair\nB=2\n");
    }

    #[test]
    fn malformed_lines_are_detected_and_repaired() {
        let mut env = EnvFile::parse("GOOD=1\njust some words\nQUOTED=\"open\nbad key=1\n");
        let bad: Vec<usize> = env.malformed().iter().map(|(n, _)| *n).collect();
        assert_eq!(bad, vec![2, 3, 4]);

        assert_eq!(env.repair_syntax(), 3);
        assert!(env.malformed().is_empty());
        assert_eq!(env.get("QUOTED"), Some("open"));
        assert_eq!(
            env.render(),
            "GOOD=1\n# just some words\nQUOTED=open\n# bad key=1\n"
        );
    }

    #[test]
    fn blank_values() {
        assert!(is_blank_value(""));
        assert!(is_blank_value("   "));
        assert!(is_blank_value("\"\""));
        assert!(is_blank_value("''"));
        assert!(!is_blank_value("x"));
    }

    #[test]
    fn value_strips_matching_quotes() {
        let env = EnvFile::parse("A=\"quoted\"\nB='single'\nC=plain\n");
        assert_eq!(env.value("A"), Some("quoted"));
        assert_eq!(env.value("B"), Some("single"));
        assert_eq!(env.value("C"), Some("plain"));
        assert_eq!(env.get("A"), Some("\"quoted\""));
    }
}
