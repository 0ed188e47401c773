//! Configuration for gatekeeper, read from `.gatekeeper/gatekeeper.toml`.
//!
//! Layering is file → environment → CLI. A missing file means defaults, and a
//! missing `[review]` section means the project has no review configuration,
//! so the built-in reviewer defaults apply.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! id = "my-project"     # defaults to the directory name
//! name = "My Project"
//!
//! [review]
//! enabled = true
//! command = "claude"
//! max_revisions = 3
//! model = "sonnet"
//! base_branch = "main"
//! staged_only = false
//! test_timeout_secs = 120
//! lint_timeout_secs = 60
//!
//! [review.context]
//! include_task = true
//! include_diff = true
//! include_tests = true
//! include_lint = true
//! ```

use crate::errors::ConfigError;
use gatekeeper_common::{ContextConfig, DEFAULT_REVIEW_COMMAND, Project, ReviewConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory under the project holding gatekeeper's files.
pub const CONFIG_DIR: &str = ".gatekeeper";

pub const CONFIG_FILE: &str = "gatekeeper.toml";

pub const PLAN_FILE: &str = "plan.json";

/// Reviewer command used when the file does not name one.
pub const REVIEW_CMD_ENV: &str = "GATEKEEPER_REVIEW_CMD";

/// Project identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Defaults to the project directory name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The `[review]` table. Same fields as [`ReviewConfig`], except that the
/// command may be left unset for the environment to fill in. Anything the
/// table omits takes its value from `ReviewConfig::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSection {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub max_revisions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    pub staged_only: bool,
    pub test_timeout_secs: u64,
    pub lint_timeout_secs: u64,
    pub context: ContextConfig,
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            command: None,
            ..ReviewConfig::default().into()
        }
    }
}

impl From<ReviewConfig> for ReviewSection {
    fn from(config: ReviewConfig) -> Self {
        Self {
            enabled: config.enabled,
            command: Some(config.command),
            max_revisions: config.max_revisions,
            model: config.model,
            base_branch: config.base_branch,
            staged_only: config.staged_only,
            test_timeout_secs: config.test_timeout_secs,
            lint_timeout_secs: config.lint_timeout_secs,
            context: config.context,
        }
    }
}

impl ReviewSection {
    fn to_review_config(&self, command: String) -> ReviewConfig {
        ReviewConfig {
            enabled: self.enabled,
            command,
            max_revisions: self.max_revisions,
            model: self.model.clone(),
            base_branch: self.base_branch.clone(),
            staged_only: self.staged_only,
            test_timeout_secs: self.test_timeout_secs,
            lint_timeout_secs: self.lint_timeout_secs,
            context: self.context,
        }
    }
}

/// The complete gatekeeper.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewSection>,
}

impl GatekeeperToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `gatekeeper.toml` from `config_dir`, or defaults if it is missing.
    pub fn load_or_default(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save to `path`, creating its directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)
    }

    /// Starter configuration written by `gatekeeper config init`.
    pub fn starter(project_id: &str) -> Self {
        Self {
            project: ProjectSection {
                id: Some(project_id.to_string()),
                name: Some(project_id.to_string()),
            },
            review: Some(ReviewConfig::default().into()),
        }
    }

    /// Reviewer command named by the file, else by the environment.
    pub fn review_command(&self) -> Option<String> {
        self.review
            .as_ref()
            .and_then(|review| review.command.clone())
            .or_else(|| std::env::var(REVIEW_CMD_ENV).ok())
            .filter(|command| !command.trim().is_empty())
    }

    /// Effective review configuration. `None` when neither the file nor the
    /// environment configures reviews.
    pub fn review_config(&self) -> Option<ReviewConfig> {
        let command = self.review_command();
        match (&self.review, command) {
            (Some(section), command) => Some(
                section.to_review_config(
                    command.unwrap_or_else(|| DEFAULT_REVIEW_COMMAND.to_string()),
                ),
            ),
            (None, Some(command)) => Some(ReviewConfig::default().with_command(&command)),
            (None, None) => None,
        }
    }

    /// The project this configuration describes, rooted at `project_dir`.
    pub fn project(&self, project_dir: &Path) -> Project {
        let dir_name = project_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        let id = self.project.id.clone().unwrap_or(dir_name);
        let name = self.project.name.clone().unwrap_or_else(|| id.clone());

        let project = Project::new(&id, &name, project_dir);
        match self.review_config() {
            Some(review) => project.with_review(review),
            None => project,
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(id) = &self.project.id
            && id.trim().is_empty()
        {
            warnings.push("Project id is empty".to_string());
        }

        let Some(review) = &self.review else {
            return warnings;
        };

        if review.max_revisions == 0 {
            warnings.push(
                "max_revisions is 0: every needs-revision result escalates immediately".to_string(),
            );
        }
        if let Some(command) = &review.command
            && command.trim().is_empty()
        {
            warnings.push(format!(
                "Review command is empty; falling back to '{}'",
                DEFAULT_REVIEW_COMMAND
            ));
        }
        if review.test_timeout_secs == 0 {
            warnings.push("test_timeout_secs is 0: test runs will always time out".to_string());
        }
        if review.lint_timeout_secs == 0 {
            warnings.push("lint_timeout_secs is 0: lint runs will always time out".to_string());
        }
        if review.staged_only && review.base_branch.is_some() {
            warnings.push("staged_only is set, so base_branch is ignored".to_string());
        }

        warnings
    }
}

/// Configuration resolved against a project directory.
#[derive(Debug, Clone)]
pub struct GatekeeperConfig {
    pub project_dir: PathBuf,
    /// `<project_dir>/.gatekeeper`
    pub config_dir: PathBuf,
    pub toml: GatekeeperToml,
}

impl GatekeeperConfig {
    pub fn new(project_dir: &Path) -> Result<Self, ConfigError> {
        let project_dir = project_dir
            .canonicalize()
            .map_err(|source| ConfigError::ProjectDir {
                path: project_dir.to_path_buf(),
                source,
            })?;
        let config_dir = project_dir.join(CONFIG_DIR);
        let toml = GatekeeperToml::load_or_default(&config_dir)?;

        Ok(Self {
            project_dir,
            config_dir,
            toml,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn plan_file(&self) -> PathBuf {
        self.config_dir.join(PLAN_FILE)
    }

    pub fn project(&self) -> Project {
        self.toml.project(&self.project_dir)
    }
}
