use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "podsh",
    version,
    about = "Pick a pod with a fuzzy finder and open a shell in it."
)]
pub struct CliArgs {
    /// Only offer pods whose name contains this text (case-sensitive)
    pub filter: Option<String>,

    /// Path to a kubeconfig file
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Only list pods in this namespace (all namespaces by default)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Container to exec into (the pod's default container otherwise)
    #[arg(short, long)]
    pub container: Option<String>,

    /// Shell to start in the pod
    #[arg(long)]
    pub shell: Option<String>,

    /// Start the shell without setting PS1
    #[arg(long)]
    pub no_prompt: bool,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long)]
    pub log_filter: Option<String>,

    /// Write logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
