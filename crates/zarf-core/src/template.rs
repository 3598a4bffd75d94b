//! `###ZARF_…###` token substitution
//!
//! Two-phase templating: `###ZARF_PKG_TMPL_<K>###` tokens are resolved at
//! create time and baked into the archive; variable, constant and well-known
//! tokens resolve at deploy time. Tokens with no mapping are left verbatim
//! for the caller to detect.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::Result;

/// Prefix shared by every token
pub const TOKEN_PREFIX: &str = "###ZARF_";

/// Prefix of create-time package template tokens
pub const PKG_TMPL_PREFIX: &str = "###ZARF_PKG_TMPL_";

/// Marker appended to data-injection targets so pods can detect completion
pub const DATA_INJECTION_MARKER: &str = "###ZARF_DATA_INJECTION_MARKER###";

/// File name the marker token resolves to, written after an injection lands
pub const DATA_INJECTION_MARKER_FILE: &str = ".zarf-injection-complete";

/// A value bound to a token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateValue {
    pub value: String,
    /// Mask in logs and prompts
    pub sensitive: bool,
    /// Indent continuation lines of multi-line values to the token's column
    pub auto_indent: bool,
}

impl TemplateValue {
    pub fn plain(value: impl Into<String>) -> Self {
        TemplateValue {
            value: value.into(),
            ..Default::default()
        }
    }
}

/// Map from complete token (`###ZARF_VAR_FOO###`) to its value
#[derive(Debug, Clone, Default)]
pub struct TemplateMap(pub BTreeMap<String, TemplateValue>);

impl TemplateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a full token to a plain value
    pub fn insert(&mut self, token: impl Into<String>, value: TemplateValue) {
        self.0.insert(token.into(), value);
    }

    /// Bind `###ZARF_VAR_<name>###`
    pub fn insert_variable(&mut self, name: &str, value: TemplateValue) {
        self.0.insert(format!("###ZARF_VAR_{name}###"), value);
    }

    /// Bind `###ZARF_CONST_<name>###`
    pub fn insert_constant(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .insert(format!("###ZARF_CONST_{name}###"), TemplateValue::plain(value));
    }

    /// Bind `###ZARF_PKG_TMPL_<name>###`
    pub fn insert_package_template(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(
            format!("{PKG_TMPL_PREFIX}{name}###"),
            TemplateValue::plain(value),
        );
    }

    /// Substitute every bound token in a string
    pub fn apply(&self, input: &str) -> String {
        let mut out = input.to_string();
        for (token, value) in &self.0 {
            out = out.replace(token, &value.value);
        }
        out
    }

    /// Substitute tokens line by line, honoring auto-indent for
    /// multi-line values
    pub fn apply_lines(&self, input: &str) -> String {
        let mut lines: Vec<String> = Vec::new();
        for line in input.lines() {
            let mut rendered = line.to_string();
            for (token, value) in &self.0 {
                if !rendered.contains(token.as_str()) {
                    continue;
                }
                let replacement = if value.auto_indent && value.value.contains('\n') {
                    let indent: String = rendered
                        .chars()
                        .take_while(|c| c.is_whitespace())
                        .collect();
                    value.value.replace('\n', &format!("\n{indent}"))
                } else {
                    value.value.clone()
                };
                rendered = rendered.replace(token.as_str(), &replacement);
            }
            lines.push(rendered);
        }
        let mut out = lines.join("\n");
        if input.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    /// Substitute tokens in every string scalar of a YAML tree
    pub fn apply_yaml(&self, value: &mut serde_yaml::Value) {
        match value {
            serde_yaml::Value::String(s) => {
                if s.contains(TOKEN_PREFIX) {
                    *s = self.apply(s);
                }
            }
            serde_yaml::Value::Sequence(seq) => {
                for item in seq {
                    self.apply_yaml(item);
                }
            }
            serde_yaml::Value::Mapping(map) => {
                for (_, v) in map.iter_mut() {
                    self.apply_yaml(v);
                }
            }
            _ => {}
        }
    }

    /// Rewrite a file on disk in place
    pub fn apply_to_file(&self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let rendered = self.apply_lines(&content);
        if rendered != content {
            std::fs::write(path, rendered)?;
        }
        Ok(())
    }
}

/// Scan text for `###ZARF_PKG_TMPL_<K>###` tokens and return the key names
pub fn find_package_templates(input: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut rest = input;
    while let Some(start) = rest.find(PKG_TMPL_PREFIX) {
        let tail = &rest[start + PKG_TMPL_PREFIX.len()..];
        match tail.find("###") {
            Some(end) => {
                let key = &tail[..end];
                if !key.is_empty() && is_token_key(key) {
                    found.insert(key.to_string());
                }
                rest = &tail[end + 3..];
            }
            None => break,
        }
    }
    found
}

fn is_token_key(key: &str) -> bool {
    key.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_variable_and_constant_tokens() {
        let mut map = TemplateMap::new();
        map.insert_variable("DOMAIN", TemplateValue::plain("example.com"));
        map.insert_constant("PORT", "8080");

        let out = map.apply("host: ###ZARF_VAR_DOMAIN###:###ZARF_CONST_PORT###");
        assert_eq!(out, "host: example.com:8080");
    }

    #[test]
    fn unresolved_tokens_are_left_verbatim() {
        let map = TemplateMap::new();
        let input = "value: ###ZARF_VAR_MISSING###";
        assert_eq!(map.apply(input), input);
    }

    #[test]
    fn auto_indent_preserves_column() {
        let mut map = TemplateMap::new();
        map.insert_variable(
            "CERT",
            TemplateValue {
                value: "line1\nline2".to_string(),
                auto_indent: true,
                ..Default::default()
            },
        );

        let out = map.apply_lines("  cert: ###ZARF_VAR_CERT###\n");
        assert_eq!(out, "  cert: line1\n  line2\n");
    }

    #[test]
    fn applies_across_yaml_tree() {
        let mut map = TemplateMap::new();
        map.insert_package_template("IMAGE", "alpine:3");

        let mut value: serde_yaml::Value =
            serde_yaml::from_str("images:\n  - '###ZARF_PKG_TMPL_IMAGE###'\n").unwrap();
        map.apply_yaml(&mut value);

        let out = serde_yaml::to_string(&value).unwrap();
        assert!(out.contains("alpine:3"));
        assert!(!out.contains("###ZARF_"));
    }

    #[test]
    fn finds_package_template_keys() {
        let text = "a: ###ZARF_PKG_TMPL_FOO###\nb: ###ZARF_PKG_TMPL_BAR_2###\nc: ###ZARF_VAR_SKIP###";
        let keys = find_package_templates(text);
        assert_eq!(
            keys.into_iter().collect::<Vec<_>>(),
            vec!["BAR_2".to_string(), "FOO".to_string()]
        );
    }
}
