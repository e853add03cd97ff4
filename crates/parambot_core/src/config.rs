use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::audit::run_log_path;
use crate::input::{CellTransform, Columns};

pub const DEFAULT_TEMPLATE: &str = "Ship infobox";
pub const DEFAULT_SUMMARY: &str = "Ship pages data cleanup: ship infobox 'crew' param";
pub const DEFAULT_RULE: &str = "crew-split";

/// Immutable configuration of one bot run. Constructed once at startup and
/// passed by reference; nothing mutates it afterwards.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct BotConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub rule: RuleSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RunSection {
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_summary")]
    pub summary: String,
    #[serde(default)]
    pub dry_run: bool,
    /// `None` processes every listed page.
    #[serde(default)]
    pub page_limit: Option<usize>,
    /// Blocking pause between pages, respected even when a page changes
    /// nothing.
    #[serde(default)]
    pub delay_seconds: u64,
    #[serde(default = "default_rule")]
    pub rule: String,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            template: default_template(),
            summary: default_summary(),
            dry_run: false,
            page_limit: None,
            delay_seconds: 0,
            rule: default_rule(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct InputSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_input_path")]
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub skip_header: bool,
    #[serde(default = "default_unescape_columns")]
    pub unescape_html_columns: Vec<usize>,
    #[serde(default = "default_true")]
    pub trim_all: bool,
    /// Source the page list from the input data instead of scanning the
    /// content mirror. Requires `enabled`.
    #[serde(default)]
    pub source_pages: bool,
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_input_path(),
            skip_header: true,
            unescape_html_columns: default_unescape_columns(),
            trim_all: true,
            source_pages: false,
        }
    }
}

impl InputSection {
    pub fn transforms(&self) -> Vec<CellTransform> {
        let mut transforms = Vec::new();
        if !self.unescape_html_columns.is_empty() {
            transforms.push(CellTransform::UnescapeHtml(Columns::Indices(
                self.unescape_html_columns.clone(),
            )));
        }
        if self.trim_all {
            transforms.push(CellTransform::TrimWhitespace(Columns::All));
        }
        transforms
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PathsSection {
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
    #[serde(default = "default_cumulative_log")]
    pub cumulative_log: PathBuf,
    #[serde(default = "default_run_log_dir")]
    pub run_log_dir: PathBuf,
    #[serde(default = "default_input_copy_dir")]
    pub input_copy_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            cumulative_log: default_cumulative_log(),
            run_log_dir: default_run_log_dir(),
            input_copy_dir: default_input_copy_dir(),
        }
    }
}

/// Parameter names the shipped rules operate on.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RuleSection {
    #[serde(default = "default_source_param")]
    pub source_param: String,
    #[serde(default = "default_target_param")]
    pub target_param: String,
    #[serde(default = "default_lookup_param")]
    pub lookup_param: String,
    /// Column of the matching input row the replacement value comes from.
    #[serde(default = "default_lookup_column")]
    pub lookup_column: usize,
}

impl Default for RuleSection {
    fn default() -> Self {
        Self {
            source_param: default_source_param(),
            target_param: default_target_param(),
            lookup_param: default_lookup_param(),
            lookup_column: default_lookup_column(),
        }
    }
}

impl BotConfig {
    /// Resolve the content mirror directory: env PARAMBOT_CONTENT_DIR >
    /// config > default.
    pub fn content_dir(&self) -> PathBuf {
        if let Ok(value) = env::var("PARAMBOT_CONTENT_DIR") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return PathBuf::from(trimmed);
            }
        }
        self.paths.content_dir.clone()
    }

    /// Resolve the dry-run flag: env PARAMBOT_DRY_RUN > config.
    pub fn dry_run(&self) -> bool {
        if let Ok(value) = env::var("PARAMBOT_DRY_RUN") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed == "1" || trimmed.eq_ignore_ascii_case("true");
            }
        }
        self.run.dry_run
    }

    /// Both sinks of a run: the persistent cumulative file and the
    /// timestamped per-run file.
    pub fn audit_sinks(&self, timestamp: &str) -> Vec<PathBuf> {
        vec![
            self.paths.cumulative_log.clone(),
            run_log_path(&self.paths.run_log_dir, timestamp),
        ]
    }

    /// Reject configuration contradictions before anything runs.
    pub fn validate(&self) -> Result<()> {
        if self.run.template.trim().is_empty() {
            bail!("run.template cannot be empty");
        }
        if self.input.source_pages && !self.input.enabled {
            bail!(
                "failed to extract page titles from input data: input data is not used (set input.enabled)"
            );
        }
        Ok(())
    }
}

/// Load and parse a BotConfig from a TOML file. Returns defaults if the
/// file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<BotConfig> {
    if !config_path.exists() {
        return Ok(BotConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: BotConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_summary() -> String {
    DEFAULT_SUMMARY.to_string()
}

fn default_rule() -> String {
    DEFAULT_RULE.to_string()
}

fn default_input_path() -> PathBuf {
    PathBuf::from("input.csv")
}

fn default_true() -> bool {
    true
}

fn default_unescape_columns() -> Vec<usize> {
    vec![0]
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("wiki_content")
}

fn default_cumulative_log() -> PathBuf {
    PathBuf::from("logfile.csv")
}

fn default_run_log_dir() -> PathBuf {
    PathBuf::from("logfiles")
}

fn default_input_copy_dir() -> PathBuf {
    PathBuf::from("input copies")
}

fn default_source_param() -> String {
    "crew".to_string()
}

fn default_target_param() -> String {
    "suggested_crew".to_string()
}

fn default_lookup_param() -> String {
    "hyperdrive_efficiency_percentage".to_string()
}

fn default_lookup_column() -> usize {
    1
}
