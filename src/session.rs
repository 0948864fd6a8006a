//! Interactive exec sessions.
//!
//! A [`RemoteSession`] is the set of channels the cluster hands back after a
//! successful exec upgrade. [`pump`] wires those channels to a
//! [`LocalTerminal`] with one task per direction, waits for the remote side to
//! report how the command ended and classifies the result.

use anyhow::{Context, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::TerminalSize;
use std::io::IsTerminal;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use crate::error::RunError;
use crate::k8s::SessionExecutor;
use crate::model::Instance;

pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;
pub type ByteWriter = Box<dyn AsyncWrite + Send + Unpin>;

const PUMP_BUFFER_BYTES: usize = 8 * 1024;
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_PROMPT_TEMPLATE: &str = r"[Pod: {pod}] \u@\h:\w\$ ";

/// What to run in the target pod and how to attach to it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExecRequest {
    pub container: Option<String>,
    pub command: Vec<String>,
    pub tty: bool,
}

impl ExecRequest {
    /// Interactive shell in `pod`. With a prompt template the shell is started
    /// through `sh -c` so `PS1` names the pod; `{pod}` in the template is
    /// replaced with the pod name.
    pub fn shell(
        pod: &str,
        shell: &str,
        prompt_template: Option<&str>,
        container: Option<String>,
        tty: bool,
    ) -> Self {
        let command = match prompt_template {
            Some(template) => {
                let prompt = template.replace("{pod}", pod);
                vec![
                    shell.to_string(),
                    "-c".to_string(),
                    format!("export PS1={}; exec {shell}", single_quote(&prompt)),
                ]
            }
            None => vec![shell.to_string()],
        };

        Self {
            container,
            command,
            tty,
        }
    }
}

fn single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// How the remote side finished: the status from the exec error channel, if
/// one arrived, and the transport's own error, if it failed.
#[derive(Debug, Clone, Default)]
pub struct RemoteCompletion {
    pub status: Option<Status>,
    pub transport_error: Option<String>,
}

/// Channels of a negotiated exec session. `stderr` is absent when the
/// session runs with a tty; `resize` is absent without one.
pub struct RemoteSession {
    pub stdin: Option<ByteWriter>,
    pub stdout: Option<ByteReader>,
    pub stderr: Option<ByteReader>,
    pub resize: Option<mpsc::Sender<TerminalSize>>,
    pub completion: BoxFuture<'static, RemoteCompletion>,
}

pub struct LocalTerminal {
    pub input: ByteReader,
    pub output: ByteWriter,
    pub errors: ByteWriter,
    pub resizes: BoxStream<'static, TerminalSize>,
    pub tty: bool,
}

impl LocalTerminal {
    /// The process's own stdio. Raw mode and resize tracking only apply when
    /// stdin is a terminal.
    pub fn stdio() -> Self {
        let tty = std::io::stdin().is_terminal();
        let resizes = if tty {
            resize_events()
        } else {
            futures::stream::empty().boxed()
        };

        Self {
            input: Box::new(tokio::io::stdin()),
            output: Box::new(tokio::io::stdout()),
            errors: Box::new(tokio::io::stderr()),
            resizes,
            tty,
        }
    }
}

fn current_size() -> Option<TerminalSize> {
    crossterm::terminal::size()
        .ok()
        .map(|(width, height)| TerminalSize { width, height })
}

#[cfg(unix)]
fn resize_events() -> BoxStream<'static, TerminalSize> {
    use tokio::signal::unix::{SignalKind, signal};

    let initial = futures::stream::iter(current_size());
    let winch = match signal(SignalKind::window_change()) {
        Ok(winch) => winch,
        Err(error) => {
            warn!("terminal resize tracking unavailable: {error}");
            return initial.boxed();
        }
    };
    let changes = futures::stream::unfold(winch, |mut winch| async move {
        winch.recv().await?;
        Some((current_size(), winch))
    })
    .filter_map(|size| async move { size });

    initial.chain(changes).boxed()
}

#[cfg(not(unix))]
fn resize_events() -> BoxStream<'static, TerminalSize> {
    futures::stream::iter(current_size()).boxed()
}

/// Puts the local terminal in raw mode for the lifetime of the guard.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(error) = disable_raw_mode() {
            warn!("failed to restore terminal mode: {error}");
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionEnd {
    Completed,
    CommandFailed { code: Option<i32>, message: String },
    Interrupted(String),
}

/// Maps the remote completion to a session result. A status means the
/// command ran to the end; no status means the transport went away first.
pub fn classify(completion: RemoteCompletion) -> SessionEnd {
    let Some(status) = completion.status else {
        return SessionEnd::Interrupted(completion.transport_error.unwrap_or_else(|| {
            "connection closed before the remote shell reported an exit status".to_string()
        }));
    };

    if status.status.as_deref() == Some("Success") {
        return SessionEnd::Completed;
    }

    let code = if status.reason.as_deref() == Some("NonZeroExitCode") {
        status
            .details
            .as_ref()
            .and_then(|details| details.causes.as_ref())
            .into_iter()
            .flatten()
            .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
            .and_then(|cause| cause.message.as_deref())
            .and_then(|message| message.trim().parse::<i32>().ok())
    } else {
        None
    };

    SessionEnd::CommandFailed {
        code,
        message: status.message.unwrap_or_default(),
    }
}

/// Runs the byte pump until the remote side reports completion, then tears
/// the loops down and classifies the outcome.
pub async fn pump(remote: RemoteSession, local: LocalTerminal) -> SessionEnd {
    let RemoteSession {
        stdin,
        stdout,
        stderr,
        resize,
        completion,
    } = remote;
    let LocalTerminal {
        input,
        output,
        errors,
        resizes,
        ..
    } = local;

    let input_task = stdin.map(|stdin| tokio::spawn(forward_input(input, stdin)));
    let output_task = stdout.map(|stdout| tokio::spawn(forward_output(stdout, output, "stdout")));
    let errors_task = stderr.map(|stderr| tokio::spawn(forward_output(stderr, errors, "stderr")));
    let resize_task = resize.map(|sender| tokio::spawn(forward_resizes(resizes, sender)));

    let completion = completion.await;
    debug!("remote completion: {completion:?}");

    if let Some(task) = input_task {
        task.abort();
    }
    if let Some(task) = resize_task {
        task.abort();
    }
    for task in [output_task, errors_task].into_iter().flatten() {
        match timeout(OUTPUT_DRAIN_TIMEOUT, task).await {
            Ok(Ok(Ok(bytes))) => debug!("output drained after {bytes} bytes"),
            Ok(Ok(Err(error))) => warn!("output forwarding failed: {error}"),
            Ok(Err(error)) => warn!("output task failed: {error}"),
            Err(_) => warn!("output did not drain in time"),
        }
    }

    classify(completion)
}

async fn forward_input(mut input: ByteReader, mut remote: ByteWriter) -> std::io::Result<u64> {
    let mut buffer = vec![0u8; PUMP_BUFFER_BYTES];
    let mut total = 0u64;
    loop {
        let read = input.read(&mut buffer).await?;
        if read == 0 {
            debug!("local input closed after {total} bytes");
            remote.shutdown().await?;
            return Ok(total);
        }
        remote.write_all(&buffer[..read]).await?;
        remote.flush().await?;
        total += read as u64;
    }
}

async fn forward_output(
    mut remote: ByteReader,
    mut local: ByteWriter,
    channel: &'static str,
) -> std::io::Result<u64> {
    let mut buffer = vec![0u8; PUMP_BUFFER_BYTES];
    let mut total = 0u64;
    loop {
        let read = remote.read(&mut buffer).await?;
        if read == 0 {
            debug!("remote {channel} closed after {total} bytes");
            local.flush().await?;
            return Ok(total);
        }
        local.write_all(&buffer[..read]).await?;
        local.flush().await?;
        total += read as u64;
    }
}

async fn forward_resizes(
    mut resizes: BoxStream<'static, TerminalSize>,
    mut sender: mpsc::Sender<TerminalSize>,
) {
    while let Some(size) = resizes.next().await {
        debug!("terminal resized to {}x{}", size.width, size.height);
        if sender.send(size).await.is_err() {
            break;
        }
    }
}

/// Opens an exec session on `target` and pumps it to completion.
///
/// Pods already in a terminal phase are rejected before any request is made.
/// Raw mode is only entered once the session is negotiated and is restored
/// before this returns.
pub async fn run_session<E>(
    executor: &E,
    target: &Instance,
    request: &ExecRequest,
    local: LocalTerminal,
) -> Result<(), RunError>
where
    E: SessionExecutor,
{
    let name = target.qualified_name();
    if target.phase.is_terminated() {
        return Err(RunError::ExecNegotiation {
            target: name,
            cause: anyhow::anyhow!("pod has terminated (phase {})", target.phase),
        });
    }

    let remote = executor
        .open_session(target, request)
        .await
        .map_err(|cause| RunError::ExecNegotiation {
            target: name.clone(),
            cause,
        })?;
    info!("exec session open for {name} (tty={})", request.tty);

    let end = {
        let _raw_mode = if local.tty && request.tty {
            Some(
                RawModeGuard::enable().map_err(|error| RunError::SessionInterrupted {
                    target: name.clone(),
                    reason: format!("{error:#}"),
                })?,
            )
        } else {
            None
        };
        pump(remote, local).await
    };
    info!("exec session for {name} ended: {end:?}");

    match end {
        SessionEnd::Completed => Ok(()),
        SessionEnd::CommandFailed { code, message } => Err(RunError::RemoteCommandFailed {
            target: name,
            code,
            message,
        }),
        SessionEnd::Interrupted(reason) => Err(RunError::SessionInterrupted {
            target: name,
            reason,
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{
        exit_status, scripted_local, scripted_remote, success_status, watched_local,
    };
    use super::{
        DEFAULT_PROMPT_TEMPLATE, ExecRequest, RemoteCompletion, RemoteSession, SessionEnd,
        classify, pump, run_session,
    };
    use crate::error::RunError;
    use crate::k8s::SessionExecutor;
    use crate::model::{Instance, Phase};
    use anyhow::Result;
    use futures::StreamExt;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
    use kube::api::TerminalSize;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct OneShotExecutor {
        session: Mutex<Option<Result<RemoteSession>>>,
        calls: Mutex<Vec<(String, ExecRequest)>>,
    }

    impl OneShotExecutor {
        fn new(session: Result<RemoteSession>) -> Self {
            Self {
                session: Mutex::new(Some(session)),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl SessionExecutor for OneShotExecutor {
        async fn open_session(
            &self,
            target: &Instance,
            request: &ExecRequest,
        ) -> Result<RemoteSession> {
            self.calls
                .lock()
                .unwrap()
                .push((target.qualified_name(), request.clone()));
            self.session
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(anyhow::anyhow!("session already opened")))
        }
    }

    fn web_1() -> Instance {
        Instance::new("web-1", "prod").with_phase(Phase::Running)
    }

    fn request() -> ExecRequest {
        ExecRequest::shell("web-1", "/bin/sh", None, None, true)
    }

    #[test]
    fn shell_request_without_prompt_runs_shell_directly() {
        let request = ExecRequest::shell("web-1", "/bin/bash", None, None, true);
        assert_eq!(request.command, vec!["/bin/bash"]);
        assert!(request.tty);
        assert_eq!(request.container, None);
    }

    #[test]
    fn shell_request_with_prompt_exports_ps1() {
        let request =
            ExecRequest::shell("web-1", "/bin/sh", Some(DEFAULT_PROMPT_TEMPLATE), None, true);
        assert_eq!(
            request.command,
            vec![
                "/bin/sh",
                "-c",
                r"export PS1='[Pod: web-1] \u@\h:\w\$ '; exec /bin/sh"
            ]
        );
    }

    #[test]
    fn prompt_quotes_are_escaped() {
        let request = ExecRequest::shell("web-1", "/bin/sh", Some("it's {pod}> "), None, false);
        assert_eq!(request.command[2], r"export PS1='it'\''s web-1> '; exec /bin/sh");
    }

    #[test]
    fn success_status_completes() {
        let completion = RemoteCompletion {
            status: Some(success_status()),
            transport_error: None,
        };
        assert_eq!(classify(completion), SessionEnd::Completed);
    }

    #[test]
    fn non_zero_exit_status_carries_code() {
        let completion = RemoteCompletion {
            status: Some(exit_status(7)),
            transport_error: None,
        };
        let SessionEnd::CommandFailed { code, message } = classify(completion) else {
            panic!("expected a command failure");
        };
        assert_eq!(code, Some(7));
        assert!(message.contains("exit code 7"));
    }

    #[test]
    fn failure_without_exit_code_keeps_message() {
        let completion = RemoteCompletion {
            status: Some(Status {
                status: Some("Failure".to_string()),
                reason: Some("InternalError".to_string()),
                message: Some("executable file not found in $PATH".to_string()),
                ..Status::default()
            }),
            transport_error: None,
        };
        assert_eq!(
            classify(completion),
            SessionEnd::CommandFailed {
                code: None,
                message: "executable file not found in $PATH".to_string(),
            }
        );
    }

    #[test]
    fn missing_status_is_an_interruption() {
        let completion = RemoteCompletion {
            status: None,
            transport_error: Some("connection reset by peer".to_string()),
        };
        assert_eq!(
            classify(completion),
            SessionEnd::Interrupted("connection reset by peer".to_string())
        );
        assert!(matches!(
            classify(RemoteCompletion::default()),
            SessionEnd::Interrupted(_)
        ));
    }

    #[tokio::test]
    async fn clean_exit_yields_ok() {
        let (remote, remote_end) = scripted_remote();
        let (local, _local_end) = scripted_local();
        let executor = OneShotExecutor::new(Ok(remote));
        let target = web_1();
        let request = request();

        let (result, ()) = tokio::join!(
            run_session(&executor, &target, &request, local),
            async move { remote_end.finish(Some(success_status())) }
        );

        assert!(result.is_ok(), "{result:?}");
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "prod/web-1");
    }

    #[tokio::test]
    async fn exit_code_seven_is_a_remote_command_failure() {
        let (remote, remote_end) = scripted_remote();
        let (local, _local_end) = scripted_local();
        let executor = OneShotExecutor::new(Ok(remote));
        let target = web_1();
        let request = request();

        let (result, ()) = tokio::join!(
            run_session(&executor, &target, &request, local),
            async move { remote_end.finish(Some(exit_status(7))) }
        );

        match result {
            Err(RunError::RemoteCommandFailed { target, code, .. }) => {
                assert_eq!(target, "prod/web-1");
                assert_eq!(code, Some(7));
            }
            other => panic!("expected RemoteCommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_upgrade_never_starts_the_pump() {
        let executor = OneShotExecutor::new(Err(anyhow::anyhow!(
            "upgrade rejected: 400 Bad Request"
        )));
        let (local, touched) = watched_local();

        let result = run_session(&executor, &web_1(), &request(), local).await;

        match result {
            Err(RunError::ExecNegotiation { target, cause }) => {
                assert_eq!(target, "prod/web-1");
                assert!(format!("{cause:#}").contains("upgrade rejected"));
            }
            other => panic!("expected ExecNegotiation, got {other:?}"),
        }
        assert!(!touched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn terminated_pod_is_rejected_before_exec() {
        let (remote, _remote_end) = scripted_remote();
        let executor = OneShotExecutor::new(Ok(remote));
        let (local, touched) = watched_local();
        let target = Instance::new("job-1", "batch").with_phase(Phase::Succeeded);

        let result = run_session(&executor, &target, &request(), local).await;

        assert!(matches!(result, Err(RunError::ExecNegotiation { .. })));
        assert!(executor.calls.lock().unwrap().is_empty());
        assert!(!touched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropped_transport_is_an_interrupted_session() {
        let (remote, remote_end) = scripted_remote();
        let (local, _local_end) = scripted_local();
        let executor = OneShotExecutor::new(Ok(remote));
        let target = web_1();
        let request = request();

        let (result, ()) = tokio::join!(
            run_session(&executor, &target, &request, local),
            async move { remote_end.drop_transport("websocket closed: connection reset") }
        );

        match result {
            Err(RunError::SessionInterrupted { reason, .. }) => {
                assert!(reason.contains("connection reset"));
            }
            other => panic!("expected SessionInterrupted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resize_events_interleave_with_data_without_corruption() {
        let (remote, mut remote_end) = scripted_remote();
        let (local, mut local_end) = scripted_local();

        let driver = async move {
            local_end.input.write_all(b"ls -la\n").await.unwrap();
            local_end
                .resizes
                .unbounded_send(TerminalSize {
                    width: 120,
                    height: 40,
                })
                .unwrap();
            local_end.input.write_all(b"exit\n").await.unwrap();
            local_end
                .resizes
                .unbounded_send(TerminalSize {
                    width: 100,
                    height: 30,
                })
                .unwrap();

            let mut typed = vec![0u8; 12];
            remote_end.stdin.read_exact(&mut typed).await.unwrap();
            assert_eq!(typed, b"ls -la\nexit\n");

            let first = remote_end.resizes.next().await.unwrap();
            let second = remote_end.resizes.next().await.unwrap();
            assert_eq!((first.width, first.height), (120, 40));
            assert_eq!((second.width, second.height), (100, 30));

            remote_end.stdout.write_all(b"total 0\r\n").await.unwrap();
            let mut shown = vec![0u8; 9];
            local_end.output.read_exact(&mut shown).await.unwrap();
            assert_eq!(shown, b"total 0\r\n");

            remote_end.finish(Some(success_status()));
        };

        let (end, ()) = tokio::join!(pump(remote, local), driver);
        assert_eq!(end, SessionEnd::Completed);
    }
}
