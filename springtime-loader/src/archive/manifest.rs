//! `META-INF/MANIFEST.MF` support.
//!
//! A manifest consists of a main section followed by optional per-entry sections, separated by
//! blank lines. Each line holds a `Name: value` attribute, and lines starting with a single space
//! continue the value of the previous attribute. Attribute names are case-insensitive.

use fxhash::FxHashMap;

/// Name of the manifest entry.
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

const SECTION_NAME: &str = "Name";

/// An ordered set of manifest attributes with case-insensitive names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    values: Vec<(String, String)>,
}

impl Attributes {
    /// Returns the value of given attribute.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Sets the value of given attribute, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .values
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn append_to_last(&mut self, continuation: &str) {
        if let Some((_, value)) = self.values.last_mut() {
            value.push_str(continuation);
        }
    }
}

/// Parsed manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    main: Attributes,
    sections: FxHashMap<String, Attributes>,
}

impl Manifest {
    /// Parses manifest content. Lines which are not valid attributes are skipped.
    pub fn parse(content: &[u8]) -> Self {
        let content = String::from_utf8_lossy(content);
        let mut manifest = Self::default();

        // None while parsing the main section
        let mut section: Option<(Option<String>, Attributes)> = None;

        for line in content.lines() {
            if let Some(continuation) = line.strip_prefix(' ') {
                match &mut section {
                    Some((_, attributes)) => attributes.append_to_last(continuation),
                    None => manifest.main.append_to_last(continuation),
                }
                continue;
            }

            if line.is_empty() {
                manifest.finish_section(section.take());
                section = Some((None, Attributes::default()));
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                continue;
            };

            let name = name.trim();
            let value = value.trim_start();

            match &mut section {
                None => manifest.main.insert(name, value),
                Some((section_name @ None, attributes))
                    if attributes.is_empty() && name.eq_ignore_ascii_case(SECTION_NAME) =>
                {
                    *section_name = Some(value.to_string())
                }
                Some((_, attributes)) => attributes.insert(name, value),
            }
        }

        manifest.finish_section(section);
        manifest
    }

    #[inline]
    pub fn main_attributes(&self) -> &Attributes {
        &self.main
    }

    /// Returns attributes of a named per-entry section.
    pub fn attributes(&self, section: &str) -> Option<&Attributes> {
        self.sections.get(section)
    }

    /// Returns the value of an attribute from given section, falling back to the main section.
    pub fn value(&self, section: &str, name: &str) -> Option<&str> {
        self.attributes(section)
            .and_then(|attributes| attributes.value(name))
            .or_else(|| self.main.value(name))
    }

    fn finish_section(&mut self, section: Option<(Option<String>, Attributes)>) {
        if let Some((Some(name), attributes)) = section {
            self.sections.insert(name, attributes);
        }
    }
}

impl FromIterator<(String, String)> for Manifest {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut manifest = Self::default();
        for (name, value) in iter {
            manifest.main.insert(name, value);
        }

        manifest
    }
}

#[cfg(test)]
mod tests {
    use crate::archive::manifest::Manifest;

    #[test]
    fn should_parse_main_attributes() {
        let manifest = Manifest::parse(
            b"Manifest-Version: 1.0\r\nStart-Class: com.example.App\r\nMain-Class: org.example.Launcher\r\n",
        );

        assert_eq!(
            manifest.main_attributes().value("start-class"),
            Some("com.example.App")
        );
        assert_eq!(
            manifest.main_attributes().value("Main-Class"),
            Some("org.example.Launcher")
        );
        assert_eq!(manifest.main_attributes().value("Missing"), None);
    }

    #[test]
    fn should_join_continuation_lines() {
        let manifest = Manifest::parse(b"Start-Class: com.example.very.long.packa\n ge.App\n");

        assert_eq!(
            manifest.main_attributes().value("Start-Class"),
            Some("com.example.very.long.package.App")
        );
    }

    #[test]
    fn should_parse_entry_sections() {
        let manifest = Manifest::parse(
            b"Implementation-Title: main\nImplementation-Vendor: acme\n\nName: com/example/\nImplementation-Title: section\n",
        );

        assert_eq!(
            manifest.value("com/example/", "Implementation-Title"),
            Some("section")
        );
        assert_eq!(
            manifest.value("com/example/", "Implementation-Vendor"),
            Some("acme")
        );
        assert_eq!(
            manifest.value("com/other/", "Implementation-Title"),
            Some("main")
        );
    }

    #[test]
    fn should_skip_malformed_lines() {
        let manifest = Manifest::parse(b"garbage\nStart-Class: com.example.App\n");

        assert_eq!(
            manifest.main_attributes().value("Start-Class"),
            Some("com.example.App")
        );
    }
}
