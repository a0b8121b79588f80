use crate::config::CompilerCommand;
use crate::error::CompilerError;
use livepad_core::{ComponentCompiler, ComponentOptions, ComponentOutput};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs an external component compiler once per build.
///
/// Protocol: one JSON request `{"source", "options"}` on stdin, one JSON reply
/// on stdout, either `{"js", "css"}` or `{"error": {"message"}}`. A compiler
/// that outlives its timeout is killed.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command: CompilerCommand,
}

#[derive(Serialize)]
struct Request<'a> {
    source: &'a str,
    options: &'a ComponentOptions,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Reply {
    Failed { error: ReplyError },
    Compiled(ComponentOutput),
}

#[derive(Deserialize)]
struct ReplyError {
    message: String,
}

impl CommandCompiler {
    pub fn new(command: CompilerCommand) -> Self {
        Self { command }
    }

    fn run(&self, source: &str, options: &ComponentOptions) -> Result<Reply, CompilerError> {
        let request = serde_json::to_vec(&Request { source, options })?;
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CompilerError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;

        // One thread per pipe: the child may exit before reading stdin, or fill
        // stdout before it has read all of it.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || match stdin.write_all(&request) {
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            })
        });
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = self.wait(&mut child)?;
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if !status.success() {
            return Err(CompilerError::Exit {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        if let Some(writer) = writer {
            match writer.join() {
                Ok(result) => result?,
                Err(_) => warn!("component compiler stdin writer panicked"),
            }
        }
        debug!(
            program = %self.command.program,
            bytes = stdout.len(),
            "component compiler replied"
        );
        Ok(serde_json::from_slice(&stdout)?)
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, CompilerError> {
        let deadline = self.command.timeout().map(|limit| Instant::now() + limit);
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                let _ = child.kill();
                let _ = child.wait();
                warn!(
                    program = %self.command.program,
                    timeout_ms = self.command.timeout_ms,
                    "component compiler killed after timeout"
                );
                return Err(CompilerError::Timeout {
                    program: self.command.program.clone(),
                    timeout_ms: self.command.timeout_ms,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

impl ComponentCompiler for CommandCompiler {
    fn compile(&self, source: &str, options: &ComponentOptions) -> Result<ComponentOutput, String> {
        match self.run(source, options) {
            Ok(Reply::Compiled(output)) => Ok(output),
            Ok(Reply::Failed { error }) => Err(error.message),
            Err(CompilerError::Exit { stderr, status }) if stderr.is_empty() => {
                Err(format!("component compiler exited with {status}"))
            }
            Err(CompilerError::Exit { stderr, .. }) => Err(stderr),
            Err(err) => Err(err.to_string()),
        }
    }
}

/// Stand-in used when no external compiler is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredCompiler;

impl ComponentCompiler for UnconfiguredCompiler {
    fn compile(
        &self,
        _source: &str,
        _options: &ComponentOptions,
    ) -> Result<ComponentOutput, String> {
        Err(concat!(
            "no component compiler configured; add ",
            "\"compiler\": { \"program\": ..., \"args\": [...] } to livepad.json"
        )
        .to_string())
    }
}

pub fn compiler_from_config(command: Option<&CompilerCommand>) -> Arc<dyn ComponentCompiler> {
    match command {
        Some(command) => Arc::new(CommandCompiler::new(command.clone())),
        None => Arc::new(UnconfiguredCompiler),
    }
}
