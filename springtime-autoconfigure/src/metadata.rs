//! Pre-extracted auto-configuration metadata.
//!
//! Metadata allows evaluating conditions of candidates without loading them. Every archive can
//! provide a [METADATA_PATH] properties resource with entries in the form of
//! `<candidate>.<key>=<value>`, e.g.:
//!
//! ```properties
//! com.example.WebConfiguration=
//! com.example.WebConfiguration.ConditionalOnWebApplication=SERVLET
//! ```

use crate::error::AutoConfigurationMetadataError;
use fxhash::{FxHashMap, FxHashSet};
#[cfg(test)]
use mockall::automock;
use springtime_loader::class_loader::ClassLoader;
use tracing::debug;

/// Location of metadata resources in archives.
pub const METADATA_PATH: &str = "META-INF/spring-autoconfigure-metadata.properties";

/// Metadata of auto-configuration candidates.
#[cfg_attr(test, automock)]
pub trait AutoConfigurationMetadata {
    /// Checks if metadata has been extracted for given candidate.
    fn was_processed(&self, class_name: &str) -> bool;

    /// Returns a metadata value for given candidate.
    fn get(&self, class_name: &str, key: &str) -> Option<String>;

    /// Returns a metadata value parsed as an integer. Unparsable values are treated as missing.
    fn get_integer(&self, class_name: &str, key: &str) -> Option<i32> {
        self.get(class_name, key)
            .and_then(|value| value.trim().parse().ok())
    }

    /// Returns a comma-separated metadata value as a set of trimmed, non-empty items.
    fn get_set(&self, class_name: &str, key: &str) -> Option<FxHashSet<String>> {
        self.get(class_name, key).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

/// Metadata backed by properties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertiesAutoConfigurationMetadata {
    properties: FxHashMap<String, String>,
}

impl PropertiesAutoConfigurationMetadata {
    /// Loads and merges all metadata resources visible to given class loader. Later resources
    /// override entries of earlier ones.
    pub fn load(class_loader: &dyn ClassLoader) -> Result<Self, AutoConfigurationMetadataError> {
        let mut properties = FxHashMap::default();
        for resource in class_loader.resources(METADATA_PATH) {
            debug!(%resource, "Loading auto-configuration metadata");

            let content = resource
                .read()
                .map_err(|source| AutoConfigurationMetadataError::Read {
                    resource: resource.to_string(),
                    source,
                })?;

            properties.extend(parse_properties(&decode(&content)));
        }

        Ok(Self { properties })
    }

    /// Creates metadata from properties text.
    pub fn from_properties(text: &str) -> Self {
        Self {
            properties: parse_properties(text).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl AutoConfigurationMetadata for PropertiesAutoConfigurationMetadata {
    fn was_processed(&self, class_name: &str) -> bool {
        self.properties.contains_key(class_name)
    }

    fn get(&self, class_name: &str, key: &str) -> Option<String> {
        self.properties.get(&format!("{class_name}.{key}")).cloned()
    }
}

// properties files are ISO 8859-1 encoded
fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| char::from(*byte)).collect()
}

fn parse_properties(text: &str) -> impl Iterator<Item = (String, String)> + '_ {
    LogicalLines {
        lines: text.lines(),
    }
    .map(|line| split_entry(&line))
}

struct LogicalLines<'a> {
    lines: std::str::Lines<'a>,
}

impl Iterator for LogicalLines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?.trim_start();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let mut result = String::new();
            let mut line = line;
            loop {
                if !ends_with_continuation(line) {
                    result.push_str(line);
                    return Some(result);
                }

                result.push_str(&line[..line.len() - 1]);
                match self.lines.next() {
                    Some(next) => line = next.trim_start(),
                    None => return Some(result),
                }
            }
        }
    }
}

fn ends_with_continuation(line: &str) -> bool {
    line.bytes().rev().take_while(|byte| *byte == b'\\').count() % 2 == 1
}

fn is_separator(c: char) -> bool {
    c == '=' || c == ':'
}

fn is_whitespace(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\x0c'
}

fn split_entry(line: &str) -> (String, String) {
    let mut escaped = false;
    let mut key_end = line.len();

    for (index, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if is_separator(c) || is_whitespace(c) {
            key_end = index;
            break;
        }
    }

    let rest = line[key_end..].trim_start_matches(is_whitespace);
    let rest = rest
        .strip_prefix(is_separator)
        .unwrap_or(rest)
        .trim_start_matches(is_whitespace);

    (unescape(&line[..key_end]), unescape(rest))
}

fn unescape(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }

        match chars.next() {
            Some('t') => result.push('\t'),
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('f') => result.push('\x0c'),
            Some('u') => {
                let code = chars.by_ref().take(4).collect::<String>();
                match u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                    Some(c) => result.push(c),
                    None => {
                        result.push_str("\\u");
                        result.push_str(&code);
                    }
                }
            }
            Some(c) => result.push(c),
            None => {}
        }
    }

    result
}
