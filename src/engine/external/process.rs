use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};

use crate::core::config::ProcessConfig;
use crate::core::domain::ChargeState;
use crate::engine::objective::ReportSource;

/// Builds the stdin text for one sub-evaluation at a trial value.
pub trait InputBuilder: Send + Sync {
    fn build_input(&self, state: ChargeState, w: f64) -> Result<String>;
}

impl<F> InputBuilder for F
where
    F: Fn(ChargeState, f64) -> Result<String> + Send + Sync,
{
    fn build_input(&self, state: ChargeState, w: f64) -> Result<String> {
        self(state, w)
    }
}

/// Runs an external program once per sub-evaluation.
/// Streams input/output via pipes; the program's stdout is the report.
pub struct ProcessReportSource<B> {
    config: ProcessConfig,
    builder: B,
}

impl<B: InputBuilder> ProcessReportSource<B> {
    pub fn new(config: ProcessConfig, builder: B) -> Self {
        Self { config, builder }
    }

    /// Executes the program with `input_data` on stdin.
    fn run_process(&self, input_data: &str) -> Result<String> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.config.workdir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.config.program.display()))?;

        // Feed stdin from its own thread while stdout/stderr drain here.
        let stdin = child.stdin.take();
        let (output, written) = thread::scope(|scope| {
            let writer = scope.spawn(move || -> std::io::Result<()> {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(input_data.as_bytes())?;
                }
                Ok(())
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .map_err(|_| anyhow!("stdin writer thread panicked"));
            (output, written)
        });
        let output = output.context("Failed to read child output")?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", self.config.program.display(), output.status, err_msg.trim());
        }

        written?.context("Failed to write to child stdin")?;

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl<B: InputBuilder> ReportSource for ProcessReportSource<B> {
    fn report(&self, state: ChargeState, w: f64) -> Result<String> {
        let input = self.builder.build_input(state, w)?;
        let attempts = self.config.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            debug!(
                "Running {} for {} state (attempt {}/{})",
                self.config.program.display(),
                state,
                attempt,
                attempts
            );
            match self.run_process(&input) {
                Ok(report) => return Ok(report),
                Err(e) if attempt < attempts => {
                    warn!("{} state job failed, retrying: {:#}", state, e);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!("{} state job failed after {} attempt(s)", state, attempts)))
                }
            }
        }
    }
}
