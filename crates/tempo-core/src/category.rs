//! Activity categories as the single source of truth for category strings.
//!
//! The category set is closed: classifier output naming any other
//! category is normalized to [`Category::Other`] rather than rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical activity categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Coding,
    Research,
    Communication,
    Design,
    Writing,
    Other,
}

impl Category {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coding => "coding",
            Self::Research => "research",
            Self::Communication => "communication",
            Self::Design => "design",
            Self::Writing => "writing",
            Self::Other => "other",
        }
    }

    /// Parses a category string, mapping unrecognized values to `Other`.
    #[must_use]
    pub fn normalize(s: &str) -> Self {
        s.parse().unwrap_or(Self::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coding" => Ok(Self::Coding),
            "research" => Ok(Self::Research),
            "communication" => Ok(Self::Communication),
            "design" => Ok(Self::Design),
            "writing" => Ok(Self::Writing),
            "other" => Ok(Self::Other),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

impl Serialize for Category {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // Lenient on the wire: unrecognized categories become Other
        Ok(Self::normalize(&s))
    }
}

/// Error type for unknown category strings.
#[derive(Debug, Clone)]
pub struct UnknownCategory(String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

/// Coarse application kind used to pick a fallback category when the
/// classifier is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppCategory {
    Browser,
    Editor,
    Terminal,
    Communication,
    Design,
    Other,
}

impl AppCategory {
    /// Static fallback mapping used when classification fails.
    #[must_use]
    pub const fn fallback_category(self) -> Category {
        match self {
            Self::Browser => Category::Research,
            Self::Editor | Self::Terminal => Category::Coding,
            Self::Communication => Category::Communication,
            Self::Design => Category::Design,
            Self::Other => Category::Other,
        }
    }

    /// Guesses the app kind from its name using substring heuristics.
    #[must_use]
    pub fn guess(app_name: &str) -> Self {
        let app = app_name.to_ascii_lowercase();
        if is_browser_app(&app) {
            Self::Browser
        } else if is_terminal_app(&app) {
            Self::Terminal
        } else if is_editor_app(&app) {
            Self::Editor
        } else if is_communication_app(&app) {
            Self::Communication
        } else if is_design_app(&app) {
            Self::Design
        } else {
            Self::Other
        }
    }
}

fn is_browser_app(app: &str) -> bool {
    app.contains("chrome")
        || app.contains("firefox")
        || app.contains("safari")
        || app.contains("edge")
        || app.contains("brave")
        || app.contains("arc")
}

fn is_terminal_app(app: &str) -> bool {
    app.contains("terminal")
        || app.contains("iterm")
        || app.contains("alacritty")
        || app.contains("wezterm")
        || app.contains("kitty")
        || app.contains("ghostty")
}

fn is_editor_app(app: &str) -> bool {
    app.contains("code")
        || app.contains("vim")
        || app.contains("zed")
        || app.contains("intellij")
        || app.contains("xcode")
        || app.contains("sublime")
        || app.contains("emacs")
}

fn is_communication_app(app: &str) -> bool {
    app.contains("slack")
        || app.contains("discord")
        || app.contains("zoom")
        || app.contains("mail")
        || app.contains("messages")
        || app.contains("teams")
}

fn is_design_app(app: &str) -> bool {
    app.contains("figma")
        || app.contains("sketch")
        || app.contains("photoshop")
        || app.contains("illustrator")
        || app.contains("blender")
}
