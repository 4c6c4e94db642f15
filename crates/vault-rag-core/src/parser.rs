//! Frontmatter, wikilink, tag, and title extraction for a single note.
//!
//! Everything here is a pure text-to-data function. Malformed input never
//! fails: unparseable frontmatter degrades to [`Frontmatter::default`] and a
//! missing closing delimiter means "no frontmatter".

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::Value as Yaml;
use tracing::debug;

static WIKILINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\]|#]+)(?:#[^\]|]*)?(?:\|[^\]]+)?\]\]").expect("valid wikilink regex")
});

// `#` must sit at the start of the text or right after whitespace, so
// URL fragments and `foo#bar` never count as tags.
static INLINE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)#([A-Za-z][A-Za-z0-9_/\-]*)").expect("valid tag regex")
});

const DELIMITER: &str = "---";

/// Parsed frontmatter with the recognized keys pulled out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    /// `title`, if present and non-empty.
    pub title: Option<String>,
    pub tags: TagField,
    /// Every other key, converted to JSON values.
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The `tags` key accepts either a YAML list or a comma-separated string.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TagField {
    #[default]
    Absent,
    List(Vec<String>),
    CommaSeparated(String),
}

impl Frontmatter {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.tags == TagField::Absent && self.extra.is_empty()
    }

    fn from_yaml(value: Yaml) -> Self {
        let Yaml::Mapping(mapping) = value else {
            return Self::default();
        };

        let mut fm = Self::default();
        for (key, value) in mapping {
            let Some(key) = scalar_to_string(&key) else {
                continue;
            };
            match key.as_str() {
                "title" => fm.title = truthy_string(&value),
                "tags" => {
                    fm.tags = match value {
                        Yaml::Sequence(items) => {
                            TagField::List(items.iter().filter_map(list_entry).collect())
                        }
                        Yaml::String(s) => TagField::CommaSeparated(s),
                        _ => TagField::Absent,
                    }
                }
                _ => {
                    if let Ok(json) = serde_json::to_value(&value) {
                        fm.extra.insert(key, json);
                    }
                }
            }
        }
        fm
    }
}

/// Split a note into its frontmatter and body.
///
/// The note must start with a line that is exactly `---`; the block ends at
/// the next line that is `---` once trailing whitespace is trimmed. Without
/// a closing delimiter the input is returned untouched with empty
/// frontmatter. A delimited block that is not a valid YAML mapping still
/// has its body (trimmed) returned, with empty frontmatter.
pub fn parse_frontmatter(raw: &str) -> (Frontmatter, String) {
    let lines: Vec<&str> = raw.split('\n').collect();
    if lines.first().map(|l| l.trim_end()) != Some(DELIMITER) {
        return (Frontmatter::default(), raw.to_string());
    }

    let Some(end) = lines
        .iter()
        .skip(1)
        .position(|l| l.trim_end() == DELIMITER)
        .map(|i| i + 1)
    else {
        return (Frontmatter::default(), raw.to_string());
    };

    let yaml_text = lines[1..end].join("\n");
    let body = lines[end + 1..].join("\n").trim().to_string();

    let frontmatter = match serde_yaml::from_str::<Yaml>(&yaml_text) {
        Ok(value) => Frontmatter::from_yaml(value),
        Err(e) => {
            debug!(error = %e, "unparseable frontmatter, ignoring");
            Frontmatter::default()
        }
    };

    (frontmatter, body)
}

/// Collect the targets of `[[target]]`, `[[target|alias]]`,
/// `[[target#heading]]` and `[[target#heading|alias]]` links.
pub fn extract_wikilinks(text: &str) -> BTreeSet<String> {
    WIKILINK_RE
        .captures_iter(text)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Collect inline `#tag` and `#nested/tag` tokens.
pub fn extract_tags(text: &str) -> BTreeSet<String> {
    INLINE_TAG_RE
        .captures_iter(text)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Tags declared in frontmatter, in declaration order, empties dropped.
pub fn extract_tags_from_frontmatter(frontmatter: &Frontmatter) -> Vec<String> {
    match &frontmatter.tags {
        TagField::Absent => Vec::new(),
        TagField::List(items) => items.iter().filter(|t| !t.is_empty()).cloned().collect(),
        TagField::CommaSeparated(s) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
    }
}

/// Document title: frontmatter `title`, else the first `# ` line, else empty.
pub fn get_title_from_content(body: &str, frontmatter: &Frontmatter) -> String {
    if let Some(title) = &frontmatter.title {
        return title.clone();
    }

    body.split('\n')
        .find_map(|line| line.strip_prefix("# "))
        .map(|rest| rest.trim().to_string())
        .unwrap_or_default()
}

fn scalar_to_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn truthy_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) if !s.is_empty() => Some(s.clone()),
        Yaml::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Yaml::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

fn list_entry(value: &Yaml) -> Option<String> {
    match value {
        Yaml::Null => None,
        Yaml::Sequence(_) | Yaml::Mapping(_) | Yaml::Tagged(_) => {
            serde_json::to_string(value).ok()
        }
        other => scalar_to_string(other).filter(|s| !s.is_empty()),
    }
}
