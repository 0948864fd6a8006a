use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::CliArgs;
use crate::k8s::ConnectOptions;
use crate::orchestrator::RunOptions;
use crate::session::{DEFAULT_PROMPT_TEMPLATE, DEFAULT_SHELL};

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub namespace: Option<String>,
    pub shell: Option<String>,
    pub prompt: Option<bool>,
    #[serde(alias = "ps1")]
    pub prompt_template: Option<String>,
    pub log_filter: Option<String>,
}

/// Effective settings after layering command-line flags over the config file
/// over built-in defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: Option<String>,
    pub connect: ConnectOptions,
    pub run: RunOptions,
    pub log_filter: String,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    pub fn load(args: &CliArgs) -> Result<Self> {
        let (source, file) = match discover_config_path() {
            Some(path) => {
                let file = load_file(&path)?;
                (Some(path.display().to_string()), file)
            }
            None => (None, FileConfig::default()),
        };
        Ok(Self::merge(args, file, source))
    }

    pub fn merge(args: &CliArgs, file: FileConfig, source: Option<String>) -> Self {
        let prompt = !args.no_prompt && file.prompt.unwrap_or(true);
        let prompt_template = prompt.then(|| {
            file.prompt_template
                .clone()
                .unwrap_or_else(|| DEFAULT_PROMPT_TEMPLATE.to_string())
        });

        Self {
            source,
            connect: ConnectOptions {
                kubeconfig: args.kubeconfig.clone().or(file.kubeconfig),
                context: args.context.clone().or(file.context),
                namespace: args.namespace.clone().or(file.namespace),
            },
            run: RunOptions {
                filter: args.filter.clone(),
                shell: args
                    .shell
                    .clone()
                    .or(file.shell)
                    .unwrap_or_else(|| DEFAULT_SHELL.to_string()),
                prompt_template,
                container: args.container.clone(),
            },
            log_filter: args
                .log_filter
                .clone()
                .or(file.log_filter)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            log_file: args.log_file.clone(),
        }
    }
}

pub fn parse_config(raw: &str) -> Result<FileConfig> {
    if raw.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(raw).context("invalid config yaml")
}

fn load_file(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("PODSH_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("podsh.yaml"),
        PathBuf::from("podsh.yml"),
        PathBuf::from(".podsh.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/podsh/config.yaml"),
            PathBuf::from(&home).join(".config/podsh/config.yml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}
