//! Per-server `server.properties` files.
//!
//! The file is a flat list of `key=value` assignments. Comment lines (`#`
//! or `!`), blank lines and key order survive a rewrite; only the assignment
//! being changed is touched.

use crate::error::{Error, Result};
use crate::state::write_atomic;
use std::path::Path;

/// File name of the per-server configuration.
pub const PROPERTIES_FILE: &str = "server.properties";

/// Key holding the port a server listens on.
pub const SERVER_PORT_KEY: &str = "server-port";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry { key: String, value: String },
    Other(String),
}

/// Parsed properties file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    lines: Vec<Line>,
}

impl Properties {
    pub fn parse(content: &str) -> Self {
        let lines = content
            .lines()
            .map(|raw| {
                let trimmed = raw.trim();
                if trimmed.starts_with('#') || trimmed.starts_with('!') {
                    return Line::Other(raw.to_string());
                }
                match trimmed.split_once('=') {
                    Some((key, value)) => Line::Entry {
                        key: key.trim().to_string(),
                        value: value.to_string(),
                    },
                    None => Line::Other(raw.to_string()),
                }
            })
            .collect();

        Self { lines }
    }

    /// Load from `path`, failing with `FileMissing` if it doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::FileMissing(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Effective value of `key`; the last assignment wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set `key` to `value`.
    ///
    /// The first assignment of `key` is rewritten in place and any later
    /// duplicates are dropped; an absent key is appended. Fails with
    /// `InvalidArgument` for input that would not read back as this one
    /// assignment.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_assignment(key, value)?;

        let mut seen = false;
        self.lines.retain_mut(|line| match line {
            Line::Entry { key: k, value: v } if k == key => {
                if seen {
                    return false;
                }
                seen = true;
                *v = value.to_string();
                true
            }
            _ => true,
        });

        if !seen {
            self.lines.push(Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    /// Keys in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, .. } => Some(key.as_str()),
            Line::Other(_) => None,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
                Line::Other(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }

    /// Atomically write to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.render().as_bytes())?;
        Ok(())
    }
}

fn validate_assignment(key: &str, value: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Error::InvalidArgument(format!("Property key '{}' {}", key.escape_debug(), reason))
    };

    if key.is_empty() || key.trim() != key {
        return Err(invalid("must be non-empty without surrounding whitespace"));
    }
    if key.starts_with('#') || key.starts_with('!') {
        return Err(invalid("must not start a comment"));
    }
    if key.contains(['=', '\r', '\n']) {
        return Err(invalid("must not contain '=' or line breaks"));
    }
    if value.contains(['\r', '\n']) {
        return Err(invalid("has a value with line breaks"));
    }
    Ok(())
}

/// Rewrite one key of an existing properties file.
pub fn update_property(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut properties = Properties::load(path)?;
    properties.set(key, value)?;
    properties.save(path)
}

/// Like [`update_property`], but creates the file when it is missing.
pub fn set_property(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut properties = match Properties::load(path) {
        Ok(properties) => properties,
        Err(Error::FileMissing(_)) => Properties::default(),
        Err(e) => return Err(e),
    };
    properties.set(key, value)?;
    properties.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#Minecraft server properties
motd=A Minecraft Server
server-port=25565

max-players=20
";

    #[test]
    fn test_update_existing_key_only_changes_value() {
        let mut props = Properties::parse(SAMPLE);
        props.set("server-port", "25570").unwrap();

        assert_eq!(
            props.render(),
            "#Minecraft server properties\nmotd=A Minecraft Server\nserver-port=25570\n\nmax-players=20\n"
        );
    }

    #[test]
    fn test_new_key_is_appended() {
        let mut props = Properties::parse(SAMPLE);
        props.set("difficulty", "hard").unwrap();

        assert_eq!(
            props.keys().collect::<Vec<_>>(),
            vec!["motd", "server-port", "max-players", "difficulty"]
        );
        assert_eq!(props.get("motd"), Some("A Minecraft Server"));
        assert_eq!(props.get("difficulty"), Some("hard"));
    }

    #[test]
    fn test_duplicates_collapse_into_first_position() {
        let mut props = Properties::parse("a=1\nb=2\na=3\n");
        assert_eq!(props.get("a"), Some("3"));

        props.set("a", "4").unwrap();
        assert_eq!(props.render(), "a=4\nb=2\n");
    }

    #[test]
    fn test_value_may_contain_equals() {
        let props = Properties::parse("motd=a=b\n");
        assert_eq!(props.get("motd"), Some("a=b"));
    }

    #[test]
    fn test_set_rejects_injected_lines() {
        let mut props = Properties::parse(SAMPLE);

        for (key, value) in [
            ("motd", "hi\nserver-port=1"),
            ("motd", "hi\r"),
            ("x\nserver-port", "1"),
            ("a=b", "1"),
            ("", "1"),
            (" motd", "1"),
            ("#motd", "1"),
        ] {
            let err = props.set(key, value).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{:?}={:?}", key, value);
        }
        assert_eq!(props.render(), SAMPLE);

        // '=' is fine inside a value
        props.set("motd", "a=b").unwrap();
        assert_eq!(props.get("motd"), Some("a=b"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROPERTIES_FILE);

        let err = update_property(&path, "motd", "x").unwrap_err();
        assert!(matches!(err, Error::FileMissing(_)));

        set_property(&path, SERVER_PORT_KEY, "25566").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "server-port=25566\n");
    }
}
