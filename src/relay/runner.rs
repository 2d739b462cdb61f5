//! Runs the external emulator as a subprocess.
//!
//! Provides:
//! - stdin feeding concurrent with stdout/stderr collection
//! - a per-stream byte/line ceiling; the first stream to reach it stops
//!   the other readers and kills the child
//! - wall-clock timeout enforcement
//! - kill-on-drop so a cancelled handler never leaves an orphan

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{EmulatorConfig, OutputLimit};
use crate::error::{PipeStage, ProcessError};
use crate::logging::targets;
use crate::relay::extract::RunParameters;

/// Something that turns run parameters into raw emulator output.
#[async_trait]
pub trait Emulator: Send + Sync {
    /// Run once and return stdout, a newline, then stderr.
    async fn run(&self, params: &RunParameters) -> Result<Vec<u8>, ProcessError>;
}

/// Launches the `bobbin` emulator binary.
#[derive(Debug, Clone)]
pub struct BobbinRunner {
    config: EmulatorConfig,
}

impl BobbinRunner {
    pub fn new(config: EmulatorConfig) -> Self {
        Self { config }
    }

    /// Command-line arguments for one run.
    pub fn args(&self, machine: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "--bot-mode".to_string(),
            "--max-frames".to_string(),
            self.config.max_frames.to_string(),
        ];
        if let Some(machine) = machine.filter(|m| !m.is_empty()) {
            args.push("-m".to_string());
            args.push(machine.to_string());
        }
        args
    }

    fn command(&self, machine: Option<&str>) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(self.args(machine))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Emulator for BobbinRunner {
    async fn run(&self, params: &RunParameters) -> Result<Vec<u8>, ProcessError> {
        let mut child = self
            .command(params.machine())
            .spawn()
            .map_err(|source| ProcessError::Launch {
                program: self.config.program.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.config.output_limit;
        let timeout = self.config.timeout;

        let result = tokio::time::timeout(timeout, async {
            let (stop, _) = watch::channel(false);
            let ((), out, err) = tokio::try_join!(
                feed_stdin(stdin, params.payload(), &stop),
                read_bounded(stdout, limit, PipeStage::Stdout, &stop),
                read_bounded(stderr, limit, PipeStage::Stderr, &stop),
            )?;

            if *stop.borrow() {
                info!(
                    target: targets::BOBBIN,
                    stdout_bytes = out.len(),
                    stderr_bytes = err.len(),
                    "Emulator output hit the safety ceiling, stopping child"
                );
                let _ = child.start_kill();
            }

            let status = child.wait().await.map_err(|source| ProcessError::Io {
                stage: PipeStage::Wait,
                source,
            })?;
            debug!(target: targets::BOBBIN, %status, "Emulator exited");

            Ok::<_, ProcessError>((out, err))
        })
        .await;

        match result {
            Ok(Ok((out, err))) => Ok(combine(out, err)),
            Ok(Err(e)) => {
                let _ = child.kill().await;
                Err(e)
            }
            Err(_) => {
                let _ = child.kill().await;
                Err(ProcessError::Timeout { timeout })
            }
        }
    }
}

/// Resolves once any stream has hit the output ceiling.
async fn stopped(stop: &watch::Sender<bool>) {
    let mut rx = stop.subscribe();
    let _ = rx.wait_for(|hit| *hit).await;
}

/// Write the whole payload, then close stdin to signal end of input.
///
/// A child that exits (or is stopped) before reading everything closes the
/// pipe early; that broken pipe is expected. Writing is abandoned once the
/// output ceiling is hit.
async fn feed_stdin(
    stdin: Option<ChildStdin>,
    payload: &[u8],
    stop: &watch::Sender<bool>,
) -> Result<(), ProcessError> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };

    let written = tokio::select! {
        _ = stopped(stop) => return Ok(()),
        written = stdin.write_all(payload) => written,
    };

    match written {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(source) => Err(ProcessError::Io {
            stage: PipeStage::Stdin,
            source,
        }),
    }
}

/// Read until EOF, until `limit` is reached, or until the other stream hits
/// its limit. Reaching the limit raises `stop` for everyone.
async fn read_bounded<R>(
    reader: Option<R>,
    limit: OutputLimit,
    stage: PipeStage,
    stop: &watch::Sender<bool>,
) -> Result<Vec<u8>, ProcessError>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Vec::new();
    let Some(mut reader) = reader else {
        return Ok(captured);
    };

    let mut buf = [0u8; 4096];
    let mut lines = 0usize;
    loop {
        let n = tokio::select! {
            _ = stopped(stop) => return Ok(captured),
            n = reader.read(&mut buf) => n.map_err(|source| ProcessError::Io { stage, source })?,
        };
        if n == 0 {
            return Ok(captured);
        }

        for &byte in &buf[..n] {
            captured.push(byte);
            if byte == b'\n' {
                lines += 1;
            }
            if captured.len() >= limit.max_bytes || lines >= limit.max_lines {
                stop.send_replace(true);
                return Ok(captured);
            }
        }
    }
}

fn combine(mut stdout: Vec<u8>, stderr: Vec<u8>) -> Vec<u8> {
    stdout.reserve(stderr.len() + 1);
    stdout.push(b'\n');
    stdout.extend_from_slice(&stderr);
    stdout
}
