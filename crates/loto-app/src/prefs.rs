//! User preferences.

use serde::{Deserialize, Serialize};

/// Colour theme, stored by display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ThemeName {
    #[default]
    #[serde(rename = "Default Blue")]
    DefaultBlue,
    #[serde(rename = "Midnight Dark")]
    MidnightDark,
    #[serde(rename = "Forest Green")]
    ForestGreen,
    #[serde(rename = "Sunset Orange")]
    SunsetOrange,
}

/// Text scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}
