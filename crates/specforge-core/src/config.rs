use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// FallbackPolicy
// ---------------------------------------------------------------------------

/// When agent-driven complexity assessment may fall back to the heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Any failure, including transport errors, falls back.
    #[default]
    AnyError,
    /// Only a missing or malformed assessment falls back; gateway errors
    /// propagate and fail the phase.
    MalformedOutput,
}

impl std::str::FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "any_error" => Ok(FallbackPolicy::AnyError),
            "malformed_output" => Ok(FallbackPolicy::MalformedOutput),
            other => Err(format!(
                "unknown fallback policy '{other}': expected any_error or malformed_output"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// IdeationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeationSettings {
    #[serde(default = "default_max_ideas")]
    pub max_ideas_per_type: u32,
    #[serde(default = "default_true")]
    pub include_roadmap_context: bool,
    #[serde(default = "default_true")]
    pub include_kanban_context: bool,
}

fn default_max_ideas() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for IdeationSettings {
    fn default() -> Self {
        Self {
            max_ideas_per_type: default_max_ideas(),
            include_roadmap_context: true,
            include_kanban_context: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ForgeConfig
// ---------------------------------------------------------------------------

/// `.specforge/config.yaml`. Every field has a default, so a missing file
/// and an empty file behave the same.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_script_timeout")]
    pub script_timeout_secs: u64,
    #[serde(default)]
    pub fallback_policy: FallbackPolicy,
    /// Directory of `<template>.md` prompt files. Built-in prompts are used
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts_dir: Option<PathBuf>,
    /// Directory holding `analyzer.py`, `context.py` and `planner.py`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts_dir: Option<PathBuf>,
    #[serde(default)]
    pub ideation: IdeationSettings,
}

fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_script_timeout() -> u64 {
    300
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_attempts: default_max_attempts(),
            script_timeout_secs: default_script_timeout(),
            fallback_policy: FallbackPolicy::default(),
            prompts_dir: None,
            scripts_dir: None,
            ideation: IdeationSettings::default(),
        }
    }
}

impl ForgeConfig {
    /// Load the project config, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut cfg: ForgeConfig = serde_yaml::from_str(&data)?;
        cfg.resolve_relative(root);
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Relative directories in the config are relative to the project root.
    fn resolve_relative(&mut self, root: &Path) {
        for dir in [&mut self.prompts_dir, &mut self.scripts_dir].into_iter().flatten() {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
    }

    /// Scripts directory: configured, else `.specforge/scripts`.
    pub fn scripts_dir(&self, root: &Path) -> PathBuf {
        self.scripts_dir
            .clone()
            .unwrap_or_else(|| root.join(paths::SCRIPTS_DIR))
    }

    /// Prompt directory: configured, else `.specforge/prompts` when present.
    pub fn prompts_dir(&self, root: &Path) -> Option<PathBuf> {
        self.prompts_dir.clone().or_else(|| {
            let default = root.join(paths::PROMPTS_DIR);
            default.is_dir().then_some(default)
        })
    }
}
