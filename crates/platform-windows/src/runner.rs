//! External command execution with a hard deadline.

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// How long pipes may stay open after the child exits. Descendants that
/// inherited them can keep them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Best human-readable failure detail: stderr when present, else stdout.
    pub fn failure_detail(&self) -> String {
        let detail = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        match self.exit_code {
            Some(code) if detail.is_empty() => format!("exit code {}", code),
            Some(code) => format!("exit code {}: {}", code, detail),
            None if detail.is_empty() => "terminated without exit code".to_string(),
            None => detail.to_string(),
        }
    }
}

/// Seam between the readers/procedures and the operating system.
///
/// Implementations must honour `timeout` and report expiry as
/// [`io::ErrorKind::TimedOut`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], timeout: Duration) -> io::Result<CommandOutput>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String], timeout: Duration) -> io::Result<CommandOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().map(Drain::spawn);
        let stderr = child.stderr.take().map(Drain::spawn);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                // Drain threads are detached; they end when the last pipe holder exits.
                drop(stdout);
                drop(stderr);
                tracing::warn!(program, timeout_ms = timeout.as_millis() as u64, "external command timed out");
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} exceeded {}s", program, timeout.as_secs_f32()),
                ));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let drain_deadline = Instant::now() + DRAIN_GRACE;
        Ok(CommandOutput {
            exit_code: status.code(),
            stdout: stdout.map(|d| d.collect(drain_deadline)).unwrap_or_default(),
            stderr: stderr.map(|d| d.collect(drain_deadline)).unwrap_or_default(),
        })
    }
}

/// Pipe reader on a helper thread, accumulating into a shared buffer so a
/// partial read can be taken without waiting for EOF.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<()>,
}

impl Drain {
    fn spawn<R: Read + Send + 'static>(mut pipe: R) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let (tx, done) = mpsc::channel();
        thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            let _ = tx.send(());
        });
        Self { buf, done }
    }

    /// Wait for EOF until `deadline`, then take whatever has been read.
    fn collect(self, deadline: Instant) -> String {
        let grace = deadline.saturating_duration_since(Instant::now());
        if self.done.recv_timeout(grace).is_err() {
            tracing::debug!("output pipe still open after exit; keeping partial output");
        }
        let bytes = std::mem::take(&mut *self.buf.lock().unwrap_or_else(PoisonError::into_inner));
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
