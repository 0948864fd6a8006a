use chrono::{DateTime, Local};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl Phase {
    pub fn from_pod_phase(phase: Option<&str>) -> Self {
        match phase.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("Pending") => Self::Pending,
            Some(value) if value.eq_ignore_ascii_case("Running") => Self::Running,
            Some(value) if value.eq_ignore_ascii_case("Succeeded") => Self::Succeeded,
            Some(value) if value.eq_ignore_ascii_case("Failed") => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }

    /// Pods in a terminal phase have no container left to exec into.
    pub fn is_terminated(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Instance {
    pub name: String,
    pub namespace: String,
    pub phase: Phase,
    pub containers: Vec<String>,
    pub node: String,
    pub age: String,
}

impl Instance {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            phase: Phase::Unknown,
            containers: Vec::new(),
            node: "-".to_string(),
            age: "-".to_string(),
        }
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Text the selector matches against.
    pub fn label(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    instances: Vec<Instance>,
    captured_at: DateTime<Local>,
}

impl Snapshot {
    pub fn new(instances: Vec<Instance>, captured_at: DateTime<Local>) -> Self {
        Self {
            instances,
            captured_at,
        }
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instance> {
        self.instances.get(index)
    }

    /// Narrows the snapshot with [`filter_instances`], keeping the capture time.
    pub fn filtered(&self, substring: &str) -> Self {
        Self {
            instances: filter_instances(&self.instances, substring),
            captured_at: self.captured_at,
        }
    }
}

/// Keeps instances whose name contains `substring` literally (case-sensitive),
/// in their original order. An empty substring keeps everything.
pub fn filter_instances(instances: &[Instance], substring: &str) -> Vec<Instance> {
    if substring.is_empty() {
        return instances.to_vec();
    }

    instances
        .iter()
        .filter(|instance| instance.name.contains(substring))
        .cloned()
        .collect()
}
