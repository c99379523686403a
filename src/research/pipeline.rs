//! Research pipeline execution.
//!
//! [`ResearchPipeline`] is the seam between the server and whatever actually
//! performs the search and synthesis work. [`ProcessPipeline`] runs it as an
//! external process, passing the query as one discrete argument.

use crate::research::ResearchQuery;
use crate::utils::toml_config::PipelineConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default wall-clock limit for one pipeline run (in seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default ceiling on captured standard output
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

const READ_CHUNK: usize = 8192;

/// How long pipes may stay open after the process has exited
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Raw result of a successful pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    /// Report payload, not yet parsed
    pub stdout: Vec<u8>,
    /// Diagnostic text; informational only
    pub stderr: String,
}

/// Ways a pipeline run can fail before producing a payload.
#[derive(Debug, thiserror::Error)]
pub enum ProcessFailure {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while reading process output: {0}")]
    Io(#[from] io::Error),

    #[error("process exited with status {code}")]
    Exited { code: i32, stderr: String },

    #[error("process was terminated by a signal")]
    Killed { signal: Option<i32>, stderr: String },

    #[error("process timed out after {0:?}")]
    TimedOut(Duration),

    #[error("process output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },
}

impl ProcessFailure {
    /// Diagnostic text captured before the failure, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ProcessFailure::Exited { stderr, .. } | ProcessFailure::Killed { stderr, .. } => {
                Some(stderr.as_str())
            }
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessFailure::Exited { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessFailure::TimedOut(_))
    }
}

/// Something that can run research for a query.
#[async_trait]
pub trait ResearchPipeline: Send + Sync {
    /// Run to completion and return the raw payload.
    async fn execute(&self, query: &ResearchQuery) -> Result<PipelineOutput, ProcessFailure>;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Runs the research collaborator as a child process.
///
/// The command line is `program [args...] <query>`. There is no shell
/// involved, so the query reaches the child byte for byte.
#[derive(Debug, Clone)]
pub struct ProcessPipeline {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ProcessPipeline {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            env: config.env.clone(),
            timeout: config.timeout(),
            max_output_bytes: config.max_output_bytes,
        }
    }

    /// Arguments placed before the query
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, query: &ResearchQuery) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(query.as_str())
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        // Own process group, so helpers the pipeline starts can be killed with it
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

#[async_trait]
impl ResearchPipeline for ProcessPipeline {
    async fn execute(&self, query: &ResearchQuery) -> Result<PipelineOutput, ProcessFailure> {
        let child = self
            .command(query)
            .spawn()
            .map_err(|source| ProcessFailure::Spawn {
                program: self.program.clone(),
                source,
            })?;

        debug!(
            program = %self.program,
            pid = child.id(),
            timeout_secs = self.timeout.as_secs(),
            "research process started"
        );

        // Dropping the child kills it (kill_on_drop); dropping the group
        // kills anything it started
        let mut group = ProcessGroup::of(&child);
        let run = wait_for_output(child, &mut group, self.max_output_bytes);
        match timeout(self.timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    program = %self.program,
                    timeout = ?self.timeout,
                    "research process timed out, killing it"
                );
                Err(ProcessFailure::TimedOut(self.timeout))
            }
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}

async fn wait_for_output(
    mut child: Child,
    group: &mut ProcessGroup,
    limit: usize,
) -> Result<PipelineOutput, ProcessFailure> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr was not captured"))?;

    // Both pipes are drained concurrently so the child never stalls on a full pipe
    let drain = async { tokio::try_join!(read_capped(stdout, limit), read_capped(stderr, limit)) };
    tokio::pin!(drain);

    let first = tokio::select! {
        captured = &mut drain => First::Drained(captured),
        status = child.wait() => First::Exited(status),
    };

    let (status, (stdout, stderr)) = match first {
        First::Drained(captured) => {
            let captured = captured?;
            (child.wait().await?, captured)
        }
        First::Exited(status) => {
            let status = status?;
            // Leftover background processes may still hold the pipes open
            group.kill();
            let captured = timeout(DRAIN_GRACE, &mut drain)
                .await
                .map_err(|_| io::Error::other("output pipes stayed open after the process exited"))??;
            (status, captured)
        }
    };
    group.kill();

    let diagnostics = String::from_utf8_lossy(&stderr.bytes).into_owned();
    if stderr.truncated {
        debug!(limit, "research process diagnostics truncated");
    }

    if !status.success() {
        return Err(match status.code() {
            Some(code) => ProcessFailure::Exited {
                code,
                stderr: diagnostics,
            },
            None => ProcessFailure::Killed {
                signal: exit_signal(&status),
                stderr: diagnostics,
            },
        });
    }

    if stdout.truncated {
        return Err(ProcessFailure::OutputTooLarge { limit });
    }

    Ok(PipelineOutput {
        stdout: stdout.bytes,
        stderr: diagnostics,
    })
}

enum First {
    Drained(io::Result<(Captured, Captured)>),
    Exited(io::Result<ExitStatus>),
}

/// The child's process group. Killed on [`ProcessGroup::kill`] or on drop.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // ESRCH just means every member has already exited
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        debug!(pgid, "research process group killed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Read to EOF, keeping at most `limit` bytes.
async fn read_capped<R>(mut reader: R, limit: usize) -> io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(bytes.len());
        if n > room {
            truncated = true;
        }
        bytes.extend_from_slice(&chunk[..n.min(room)]);
    }

    Ok(Captured { bytes, truncated })
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
