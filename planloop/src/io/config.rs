//! Agent configuration stored in `planloop.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, resolved relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "planloop.toml";

/// Agent configuration (TOML).
///
/// Missing fields default to values that reproduce the stock agent: the
/// OpenAI chat completions endpoint and unbounded retries on malformed output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Abort the run once more than this many malformed model responses have
    /// been seen. `None` retries forever.
    pub max_malformed_responses: Option<u32>,

    pub llm: LlmConfig,

    /// Command-backed tasks added to the catalog after the built-in tasks.
    pub tasks: Vec<CommandTaskConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions URL.
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// A task whose handler runs an external command.
///
/// The JSON payload is written to stdin; stdout becomes the task result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandTaskConfig {
    pub name: String,
    pub description: String,
    /// Program followed by its arguments (e.g. `["jq", "."]`).
    pub command: Vec<String>,
    /// Kill the command after this many seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    #[serde(default = "default_output_limit_bytes")]
    pub output_limit_bytes: usize,
}

fn default_command_timeout_secs() -> u64 {
    5 * 60
}

fn default_output_limit_bytes() -> usize {
    100_000
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.llm.endpoint.trim().is_empty() {
            return Err(anyhow!("llm.endpoint must be non-empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.model must be non-empty"));
        }
        if self.llm.api_key_env.trim().is_empty() {
            return Err(anyhow!("llm.api_key_env must be non-empty"));
        }
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                return Err(anyhow!("tasks[].name must be non-empty"));
            }
            if task.command.is_empty() || task.command[0].trim().is_empty() {
                return Err(anyhow!(
                    "tasks.{}.command must be a non-empty array",
                    task.name
                ));
            }
            if task.timeout_secs == 0 {
                return Err(anyhow!("tasks.{}.timeout_secs must be > 0", task.name));
            }
            if task.output_limit_bytes == 0 {
                return Err(anyhow!(
                    "tasks.{}.output_limit_bytes must be > 0",
                    task.name
                ));
            }
        }
        Ok(())
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.llm.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
        assert_eq!(cfg.max_malformed_responses, None);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("planloop.toml");
        let cfg = AgentConfig {
            max_malformed_responses: Some(5),
            tasks: vec![CommandTaskConfig {
                name: "lookup".to_string(),
                description: "Look something up.".to_string(),
                command: vec!["cat".to_string()],
                timeout_secs: 10,
                output_limit_bytes: 1024,
            }],
            ..AgentConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("planloop.toml");
        fs::write(
            &path,
            "[llm]\nmodel = \"gpt-4o-mini\"\n\n[[tasks]]\nname = \"echo\"\ndescription = \"Echo.\"\ncommand = [\"cat\"]\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(cfg.tasks[0].timeout_secs, 300);
        assert_eq!(cfg.tasks[0].output_limit_bytes, 100_000);
    }

    #[test]
    fn rejects_empty_task_command() {
        let cfg = AgentConfig {
            tasks: vec![CommandTaskConfig {
                name: "broken".to_string(),
                description: String::new(),
                command: Vec::new(),
                timeout_secs: 1,
                output_limit_bytes: 1,
            }],
            ..AgentConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("tasks.broken.command"));
    }
}
