//! Captured-output command execution.
//!
//! Build and test commands are long-running subprocesses whose combined
//! output we need for log excerpts. A non-zero exit is an expected signal
//! (build broken, test failed) and is distinguished from "the command could
//! not be run at all", which callers treat as fatal.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use wait_timeout::ChildExt;

/// Why a command did not produce a successful exit.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command ran and exited non-zero. Expected for broken builds and
    /// failing tests; `output` carries everything the process printed.
    #[error("command `{command}` exited with status {status}")]
    Failed {
        command: String,
        status: i32,
        output: String,
    },

    /// The command exceeded the configured time bound and was killed.
    #[error("command `{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    /// The command could not be launched or its output could not be read.
    #[error("failed to run `{command}`")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// The captured output, when the process ran at all.
    pub fn output(&self) -> Option<&str> {
        match self {
            CommandError::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// A command to run with captured output.
pub struct CapturedCommand {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl CapturedCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Run in `dir`, returning combined stdout+stderr on success.
    pub fn run(self, dir: &Path) -> Result<String, CommandError> {
        let command = self.display();
        tracing::debug!(%command, dir = %dir.display(), "Running command");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Io {
                command: command.clone(),
                source,
            })?;

        // Drain both pipes on background threads so a chatty process can
        // never fill a pipe buffer and deadlock against our wait.
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout) {
                Ok(Some(status)) => status,
                Ok(None) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CommandError::TimedOut { command, timeout });
                }
                Err(source) => return Err(CommandError::Io { command, source }),
            },
            None => child.wait().map_err(|source| CommandError::Io {
                command: command.clone(),
                source,
            })?,
        };

        let mut output = join_reader(stdout);
        output.push_str(&join_reader(stderr));

        if status.success() {
            Ok(output)
        } else {
            Err(CommandError::Failed {
                command,
                status: status.code().unwrap_or(-1),
                output,
            })
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = source.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
