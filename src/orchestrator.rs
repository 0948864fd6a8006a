use tracing::{debug, info};

use crate::app::PickerRow;
use crate::error::RunError;
use crate::k8s::{InventoryClient, SessionExecutor};
use crate::model::Instance;
use crate::selector::{Selection, Selector};
use crate::session::{self, ExecRequest, LocalTerminal};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Case-sensitive substring applied to pod names before the picker opens.
    pub filter: Option<String>,
    pub shell: String,
    /// PS1 template; `None` starts the shell as-is.
    pub prompt_template: Option<String>,
    pub container: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub target: Instance,
}

/// One end-to-end run: list, filter, pick, exec. Each stage failure maps to
/// exactly one [`RunError`] variant and stops the run.
pub async fn run<I, S, E>(
    inventory: &I,
    selector: &mut S,
    executor: &E,
    options: &RunOptions,
    local: LocalTerminal,
) -> Result<SessionReport, RunError>
where
    I: InventoryClient,
    S: Selector,
    E: SessionExecutor,
{
    let snapshot = inventory
        .list_instances()
        .await
        .map_err(RunError::Inventory)?;
    debug!(
        "inventory holds {} pods (captured {})",
        snapshot.len(),
        snapshot.captured_at().format("%H:%M:%S")
    );

    let candidates = match options.filter.as_deref() {
        Some(filter) => snapshot.filtered(filter),
        None => snapshot,
    };
    if candidates.is_empty() {
        return Err(RunError::EmptyInventory {
            filter: options.filter.clone(),
        });
    }
    info!("{} candidate pods", candidates.len());

    let rows = candidates
        .instances()
        .iter()
        .map(PickerRow::from)
        .collect::<Vec<_>>();
    let selection = selector
        .select(rows, candidates.captured_at())
        .await
        .map_err(RunError::Selector)?;
    let index = match selection {
        Selection::Chosen(index) => index,
        Selection::Cancelled => return Err(RunError::SelectionCancelled),
        Selection::NoCandidates => {
            return Err(RunError::EmptyInventory {
                filter: options.filter.clone(),
            });
        }
    };
    let target = candidates.get(index).cloned().ok_or_else(|| {
        RunError::Selector(anyhow::anyhow!("picker returned index {index} out of range"))
    })?;
    info!("selected {}", target.qualified_name());

    eprintln!("Logging into pod {}...", target.qualified_name());
    let request = ExecRequest::shell(
        &target.name,
        &options.shell,
        options.prompt_template.as_deref(),
        options.container.clone(),
        local.tty,
    );
    session::run_session(executor, &target, &request, local).await?;

    Ok(SessionReport { target })
}
