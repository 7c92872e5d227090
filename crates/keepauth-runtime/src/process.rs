//! Gateway process control: start, find and kill by command-line match.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("gateway process io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gateway directory is not configured; set KEEPAUTH_GATEWAY_DIR")]
    MissingGatewayDir,
}

/// Process operations the maintenance cycle and the strategy layer need.
/// Enables mock injection for testing.
pub trait ProcessControl: Send {
    /// Ensure the gateway process is running, spawning it if configured
    /// to do so. Returns the matching pids.
    fn ensure_running(&self) -> Result<Vec<u32>, ProcessError>;

    /// Terminate the gateway process. Returns whether no matching
    /// process remains afterwards.
    fn kill_gateway(&self) -> Result<bool, ProcessError>;
}

impl<T: ProcessControl + ?Sized + Sync> ProcessControl for &T {
    fn ensure_running(&self) -> Result<Vec<u32>, ProcessError> {
        (**self).ensure_running()
    }

    fn kill_gateway(&self) -> Result<bool, ProcessError> {
        (**self).kill_gateway()
    }
}

/// Real process control over the system process table.
pub struct GatewayProcess {
    gateway_dir: Option<PathBuf>,
    process_match: String,
    startup_grace: Duration,
    spawn_new_processes: bool,
}

impl GatewayProcess {
    #[must_use]
    pub fn new(
        gateway_dir: Option<PathBuf>,
        process_match: impl Into<String>,
        startup_grace: Duration,
        spawn_new_processes: bool,
    ) -> Self {
        Self {
            gateway_dir,
            process_match: process_match.into(),
            startup_grace,
            spawn_new_processes,
        }
    }

    /// Pids whose command line matches the configured pattern.
    fn find(&self) -> Result<Vec<u32>, ProcessError> {
        let output = std::process::Command::new("pgrep")
            .args(["-f", &self.process_match])
            .output()?;
        // pgrep exits 1 when nothing matches; that is not an error here
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .collect())
    }

    fn start(&self) -> Result<(), ProcessError> {
        let dir = self
            .gateway_dir
            .as_ref()
            .ok_or(ProcessError::MissingGatewayDir)?;

        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = std::process::Command::new("cmd");
            cmd.args(["/k", r"bin\run.bat", r"root\conf.yaml"]);
            cmd
        };

        #[cfg(not(windows))]
        let mut cmd = {
            let mut cmd = std::process::Command::new("bash");
            cmd.args(["bin/run.sh", "root/conf.yaml"]);
            cmd
        };

        tracing::debug!("starting gateway process in {}", dir.display());
        cmd.current_dir(dir)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        Ok(())
    }
}

impl ProcessControl for GatewayProcess {
    fn ensure_running(&self) -> Result<Vec<u32>, ProcessError> {
        let pids = self.find()?;
        if !pids.is_empty() {
            return Ok(pids);
        }

        if !self.spawn_new_processes {
            tracing::info!("gateway not found and spawning new processes is disabled");
            return Ok(Vec::new());
        }

        tracing::info!("gateway not found, starting a new one...");
        self.start()?;
        std::thread::sleep(self.startup_grace);

        let pids = self.find()?;
        if pids.is_empty() {
            tracing::error!(
                "gateway did not appear within the startup grace period of {:?}. Consider increasing KEEPAUTH_GATEWAY_STARTUP.",
                self.startup_grace
            );
        } else {
            tracing::info!("gateway started with pids: {pids:?}");
        }
        Ok(pids)
    }

    fn kill_gateway(&self) -> Result<bool, ProcessError> {
        let pids = self.find()?;
        if pids.is_empty() {
            return Ok(true);
        }

        tracing::info!("terminating gateway pids: {pids:?}");
        std::process::Command::new("pkill")
            .args(["-f", &self.process_match])
            .status()?;

        std::thread::sleep(Duration::from_secs(1));

        Ok(self.find()?.is_empty())
    }
}
