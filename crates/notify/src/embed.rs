//! Discord embed model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Zero-width space, used where Discord requires a non-empty string.
pub const BLANK: &str = "\u{200b}";

/// Palette used by relay embeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedColor {
    /// New activity and neutral states
    Blue,
    /// Approvals, creations, healthy summaries
    Green,
    /// Closures, deletions, requested changes
    Red,
    /// Merged pull requests
    Purple,
    /// Reopened items and review requests
    Orange,
}

impl EmbedColor {
    /// Get the Discord integer value for this colour.
    #[must_use]
    pub const fn value(self) -> u32 {
        match self {
            Self::Blue => 0x0003_66d6,
            Self::Green => 0x0028_a745,
            Self::Red => 0x00d7_3a49,
            Self::Purple => 0x006f_42c1,
            Self::Orange => 0x00fb_8500,
        }
    }
}

/// A rich Discord message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

/// Embed footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Embed name/value field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    /// Create a field. Empty names or values are replaced by a zero-width
    /// space because Discord rejects empty strings.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: non_empty(name.into()),
            value: non_empty(value.into()),
            inline,
        }
    }
}

fn non_empty(s: String) -> String {
    if s.is_empty() {
        BLANK.to_string()
    } else {
        s
    }
}

impl Embed {
    /// Start an embed with a title and colour.
    #[must_use]
    pub fn new(title: impl Into<String>, color: EmbedColor) -> Self {
        Self {
            title: title.into(),
            description: None,
            url: None,
            color: color.value(),
            timestamp: None,
            footer: None,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at.to_rfc3339());
        self
    }

    #[must_use]
    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    /// Append an inline field.
    #[must_use]
    pub fn inline_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField::new(name, value, true));
        self
    }

    /// Append a full-width field.
    #[must_use]
    pub fn block_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField::new(name, value, false));
        self
    }

    /// Value of the first field with the given name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Footer text, if any.
    #[must_use]
    pub fn footer_text(&self) -> Option<&str> {
        self.footer.as_ref().map(|f| f.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colors() {
        assert_eq!(EmbedColor::Blue.value(), 0x0366d6);
        assert_eq!(EmbedColor::Green.value(), 0x28a745);
        assert_eq!(EmbedColor::Red.value(), 0xd73a49);
        assert_eq!(EmbedColor::Purple.value(), 0x6f42c1);
        assert_eq!(EmbedColor::Orange.value(), 0xfb8500);
    }

    #[test]
    fn test_empty_field_value_replaced() {
        let field = EmbedField::new("Comment", "", false);
        assert_eq!(field.value, BLANK);
    }

    #[test]
    fn test_serialization_skips_unset_parts() {
        let embed = Embed::new("Branch Deleted", EmbedColor::Red).inline_field("By", "octocat");
        let json = serde_json::to_value(&embed).unwrap();

        assert_eq!(json["title"], "Branch Deleted");
        assert_eq!(json["color"], 0xd73a49);
        assert!(json.get("description").is_none());
        assert!(json.get("footer").is_none());
        assert_eq!(json["fields"][0]["inline"], true);
    }

    #[test]
    fn test_field_lookup() {
        let embed = Embed::new("t", EmbedColor::Blue)
            .inline_field("Author", "alice")
            .block_field("Branch", "`main`")
            .footer("repo");

        assert_eq!(embed.field("Author"), Some("alice"));
        assert_eq!(embed.field("Branch"), Some("`main`"));
        assert_eq!(embed.field("Missing"), None);
        assert_eq!(embed.footer_text(), Some("repo"));
    }
}
