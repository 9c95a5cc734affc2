//! Per-principal theme preferences
//!
//! Stored as `theme-<principal>.json` in the client's config directory.
//! A missing or unreadable file yields the defaults.

use crate::error::Result;
use crate::identity::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

/// OKLCH colour triples ("lightness chroma hue")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub primary: &'static str,
    pub secondary: &'static str,
    pub accent: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTheme {
    Warm,
    Cool,
    Forest,
    #[default]
    Coral,
    Lavender,
    Midnight,
    Sunset,
    Mint,
    Cherry,
    Amber,
}

impl ColorTheme {
    pub const ALL: [ColorTheme; 10] = [
        ColorTheme::Warm,
        ColorTheme::Cool,
        ColorTheme::Forest,
        ColorTheme::Coral,
        ColorTheme::Lavender,
        ColorTheme::Midnight,
        ColorTheme::Sunset,
        ColorTheme::Mint,
        ColorTheme::Cherry,
        ColorTheme::Amber,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ColorTheme::Warm => "warm",
            ColorTheme::Cool => "cool",
            ColorTheme::Forest => "forest",
            ColorTheme::Coral => "coral",
            ColorTheme::Lavender => "lavender",
            ColorTheme::Midnight => "midnight",
            ColorTheme::Sunset => "sunset",
            ColorTheme::Mint => "mint",
            ColorTheme::Cherry => "cherry",
            ColorTheme::Amber => "amber",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ColorTheme::Warm => "Warm Sunset",
            ColorTheme::Cool => "Ocean Breeze",
            ColorTheme::Forest => "Forest Green",
            ColorTheme::Coral => "Coral Reef",
            ColorTheme::Lavender => "Lavender Dream",
            ColorTheme::Midnight => "Midnight Blue",
            ColorTheme::Sunset => "Desert Sunset",
            ColorTheme::Mint => "Fresh Mint",
            ColorTheme::Cherry => "Cherry Blossom",
            ColorTheme::Amber => "Amber Glow",
        }
    }

    pub fn palette(&self) -> Palette {
        let (primary, secondary, accent) = match self {
            ColorTheme::Warm => ("0.65 0.18 35", "0.75 0.15 55", "0.70 0.20 25"),
            ColorTheme::Cool => ("0.60 0.15 220", "0.70 0.12 200", "0.65 0.18 240"),
            ColorTheme::Forest => ("0.55 0.16 150", "0.65 0.14 130", "0.60 0.18 170"),
            ColorTheme::Coral => ("0.68 0.20 15", "0.72 0.16 35", "0.70 0.22 5"),
            ColorTheme::Lavender => ("0.65 0.18 290", "0.72 0.14 310", "0.68 0.20 270"),
            ColorTheme::Midnight => ("0.50 0.20 250", "0.60 0.16 230", "0.55 0.22 270"),
            ColorTheme::Sunset => ("0.70 0.22 30", "0.75 0.18 50", "0.72 0.24 10"),
            ColorTheme::Mint => ("0.68 0.16 165", "0.75 0.12 180", "0.70 0.18 150"),
            ColorTheme::Cherry => ("0.72 0.20 350", "0.78 0.16 10", "0.74 0.22 340"),
            ColorTheme::Amber => ("0.62 0.24 45", "0.70 0.20 60", "0.65 0.26 35"),
        };
        Palette {
            primary,
            secondary,
            accent,
        }
    }
}

impl FromStr for ColorTheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ColorTheme::ALL
            .into_iter()
            .find(|theme| theme.key() == wanted)
            .ok_or_else(|| format!("unknown theme: {}", s))
    }
}

impl FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            "system" => Ok(ThemeMode::System),
            other => Err(format!("unknown theme mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThemePreference {
    #[serde(default)]
    pub mode: ThemeMode,
    #[serde(default)]
    pub color_theme: ColorTheme,
}

pub struct PreferenceStore {
    dir: PathBuf,
}

impl PreferenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, principal: &ParticipantId) -> PathBuf {
        self.dir.join(format!("theme-{}.json", principal))
    }

    pub fn load(&self, principal: &ParticipantId) -> ThemePreference {
        let path = self.path_for(principal);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(_) => return ThemePreference::default(),
        };
        match serde_json::from_str(&contents) {
            Ok(preference) => preference,
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable theme preference {}: {}",
                    path.display(),
                    e
                );
                ThemePreference::default()
            }
        }
    }

    pub fn save(&self, principal: &ParticipantId, preference: &ThemePreference) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(preference)?;
        fs::write(self.path_for(principal), json)?;
        log::debug!("Saved theme preference for {}", principal);
        Ok(())
    }
}
