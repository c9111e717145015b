use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where the text of a chunk came from.
///
/// # Examples
///
/// ```
/// use strata_core::SourceKind;
///
/// let kind: SourceKind = "commit_message".parse().unwrap();
/// assert_eq!(kind, SourceKind::CommitMessage);
/// assert_eq!(kind.as_str(), "commit_message");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// File content at the latest commit touching the path.
    Content,
    /// A commit message of a commit that touched the path.
    CommitMessage,
}

impl SourceKind {
    /// Stable identifier used in storage and chunk identity.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Content => "content",
            SourceKind::CommitMessage => "commit_message",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(SourceKind::Content),
            "commit_message" => Ok(SourceKind::CommitMessage),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

/// Inclusive, 1-indexed range of lines a chunk was derived from.
///
/// # Examples
///
/// ```
/// use strata_core::LineRange;
///
/// let range = LineRange::new(3, 7);
/// assert!(range.contains(5));
/// assert!(!range.contains(8));
/// assert_eq!(range.len(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRange {
    /// First line (1-indexed).
    pub start: u32,
    /// Last line (1-indexed, inclusive).
    pub end: u32,
}

impl LineRange {
    /// Create a range; `end` is clamped so it is never before `start`.
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Whether `line` falls inside the range.
    pub fn contains(&self, line: u32) -> bool {
        (self.start..=self.end).contains(&line)
    }

    /// Number of lines covered.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Output format for CLI rendering.
///
/// # Examples
///
/// ```
/// use strata_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable listing.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_round_trips_through_str() {
        for kind in [SourceKind::Content, SourceKind::CommitMessage] {
            assert_eq!(kind.as_str().parse::<SourceKind>().unwrap(), kind);
        }
        assert!("diff".parse::<SourceKind>().is_err());
    }

    #[test]
    fn source_kind_serializes_snake_case() {
        let json = serde_json::to_string(&SourceKind::CommitMessage).unwrap();
        assert_eq!(json, "\"commit_message\"");
    }

    #[test]
    fn line_range_clamps_inverted_bounds() {
        let range = LineRange::new(9, 4);
        assert_eq!(range.start, 9);
        assert_eq!(range.end, 9);
        assert_eq!(range.len(), 1);
    }

    #[test]
    fn line_range_display() {
        assert_eq!(LineRange::new(4, 4).to_string(), "4");
        assert_eq!(LineRange::new(2, 6).to_string(), "2-6");
    }

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "markdown".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
        assert!("sarif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn output_format_default_is_text() {
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
    }
}
