//! Simulator process lifecycle
//!
//! The evaluator restarts the simulator between mission batches and after a
//! timed-out mission. [`CommandSimulator`] owns the child process;
//! [`NoopSimulator`] is used when the simulator is managed externally.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::SimulatorConfig;
use crate::shutdown::Shutdown;
use sdk::errors::EngineError;

/// Lifecycle control over a simulator instance
#[async_trait]
pub trait SimulatorProcess: Send {
    /// Stop any running instance and start a fresh one
    async fn restart(&mut self) -> Result<(), EngineError>;

    /// Stop the running instance
    async fn stop(&mut self) -> Result<(), EngineError>;
}

/// Simulator started from a local executable
pub struct CommandSimulator {
    executable: PathBuf,
    log_file: PathBuf,
    display: u32,
    startup_delay: Duration,
    shutdown: Shutdown,
    child: Option<Child>,
}

impl CommandSimulator {
    pub fn new(executable: PathBuf, config: &SimulatorConfig, shutdown: Shutdown) -> Self {
        Self {
            executable,
            log_file: config.log_file.clone(),
            display: config.display,
            startup_delay: Duration::from_secs(config.startup_delay_secs),
            shutdown,
            child: None,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .env("DISPLAY", format!(":{}", self.display))
            .arg("-logfile")
            .arg(&self.log_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl SimulatorProcess for CommandSimulator {
    async fn restart(&mut self) -> Result<(), EngineError> {
        self.stop().await?;

        if let Some(parent) = self.log_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let child = self.command().spawn().map_err(|e| {
            EngineError::MissionLaunchFailure(format!(
                "Failed to start simulator {}: {}",
                self.executable.display(),
                e
            ))
        })?;
        info!(
            "Started simulator (pid {:?}) on display :{}",
            child.id(),
            self.display
        );
        self.child = Some(child);

        tokio::select! {
            _ = tokio::time::sleep(self.startup_delay) => Ok(()),
            _ = self.shutdown.cancelled() => Err(EngineError::Cancelled),
        }
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill simulator process: {}", e);
            } else {
                info!("Stopped simulator process");
            }
        }
        Ok(())
    }
}

/// Simulator whose lifecycle is handled outside the harness
#[derive(Debug, Default)]
pub struct NoopSimulator;

#[async_trait]
impl SimulatorProcess for NoopSimulator {
    async fn restart(&mut self) -> Result<(), EngineError> {
        info!("Simulator is managed externally, skipping restart");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Pick the process handler for `config`
pub fn from_config(config: &SimulatorConfig, shutdown: Shutdown) -> Box<dyn SimulatorProcess> {
    match &config.executable {
        Some(executable) => Box::new(CommandSimulator::new(executable.clone(), config, shutdown)),
        None => Box::new(NoopSimulator),
    }
}
