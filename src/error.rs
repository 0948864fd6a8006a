/// Stage failures for one run. Every variant ends the run; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to build Kubernetes client: {0:#}")]
    Config(anyhow::Error),

    #[error("failed to list pods: {0:#}")]
    Inventory(anyhow::Error),

    #[error("no pods found{}", scope_suffix(.filter))]
    EmptyInventory { filter: Option<String> },

    #[error("pod picker failed: {0:#}")]
    Selector(anyhow::Error),

    #[error("pod selection cancelled")]
    SelectionCancelled,

    #[error("failed to start shell in {target}: {cause:#}")]
    ExecNegotiation {
        target: String,
        cause: anyhow::Error,
    },

    #[error("session with {target} interrupted: {reason}")]
    SessionInterrupted { target: String, reason: String },

    #[error("{}", remote_failure_message(.target, .code, .message))]
    RemoteCommandFailed {
        target: String,
        code: Option<i32>,
        message: String,
    },
}

impl RunError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Inventory(_) | Self::EmptyInventory { .. } => "inventory",
            Self::Selector(_) | Self::SelectionCancelled => "select",
            Self::ExecNegotiation { .. } => "exec",
            Self::SessionInterrupted { .. } | Self::RemoteCommandFailed { .. } => "session",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Selector(_) => 1,
            Self::Config(_) => 2,
            Self::Inventory(_) => 3,
            Self::EmptyInventory { .. } => 4,
            Self::SelectionCancelled => 130,
            Self::ExecNegotiation { .. } => 5,
            Self::SessionInterrupted { .. } => 6,
            Self::RemoteCommandFailed { code, .. } => match code {
                Some(code) if (1..=255).contains(code) => *code,
                _ => 1,
            },
        }
    }
}

fn scope_suffix(filter: &Option<String>) -> String {
    match filter {
        Some(filter) => format!(" matching '{filter}'"),
        None => String::new(),
    }
}

fn remote_failure_message(target: &str, code: &Option<i32>, message: &str) -> String {
    match code {
        Some(code) => format!("shell in {target} exited with code {code}"),
        None if message.is_empty() => format!("shell in {target} failed"),
        None => format!("shell in {target} failed: {message}"),
    }
}
