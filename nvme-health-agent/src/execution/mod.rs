//! Bounded execution of the `nvme` command-line tool
//!
//! Handles:
//! - `nvme list`, `nvme smart-log <dev>`, `nvme id-ctrl <dev>`
//! - Timeout on every invocation (the child is killed when it expires)
//! - Non-zero exit status surfaced as an error instead of text

use crate::config::NvmeConfig;
use crate::error::{HealthError, Result};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Attribution used for errors raised while enumerating devices
pub const ENUMERATION: &str = "nvme list";

/// Source of raw text for the poll cycle
#[allow(async_fn_in_trait)]
pub trait NvmeTool {
    /// Device listing, one line per namespace
    async fn list(&self) -> Result<String>;

    /// SMART / health information log of one device
    async fn smart_log(&self, device: &str) -> Result<String>;

    /// Controller identification of one device
    async fn id_ctrl(&self, device: &str) -> Result<String>;
}

/// `nvme` binary invoked as a child process
#[derive(Debug, Clone)]
pub struct NvmeCli {
    binary: String,
    timeout: Duration,
}

impl NvmeCli {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &NvmeConfig) -> Self {
        Self::new(config.binary.clone(), Duration::from_secs(config.timeout_secs))
    }
}

impl NvmeTool for NvmeCli {
    async fn list(&self) -> Result<String> {
        run_tool(&self.binary, &["list"], self.timeout, ENUMERATION).await
    }

    async fn smart_log(&self, device: &str) -> Result<String> {
        run_tool(&self.binary, &["smart-log", device], self.timeout, device).await
    }

    async fn id_ctrl(&self, device: &str) -> Result<String> {
        run_tool(&self.binary, &["id-ctrl", device], self.timeout, device).await
    }
}

/// Run `binary args...` and return its stdout, bounded by `timeout`
pub async fn run_tool(binary: &str, args: &[&str], timeout: Duration, device: &str) -> Result<String> {
    let start_time = Instant::now();
    debug!("Executing {} {} (timeout: {:?})", binary, args.join(" "), timeout);

    let output = tokio::time::timeout(
        timeout,
        AsyncCommand::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| HealthError::Timeout {
        device: device.to_string(),
        secs: timeout.as_secs(),
    })?
    .map_err(|e| HealthError::external(device, format!("failed to execute {}: {}", binary, e)))?;

    debug!(
        "{} {} finished in {}ms",
        binary,
        args.join(" "),
        start_time.elapsed().as_millis()
    );

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(HealthError::external(
            device,
            format!("{} exited with {}: {}", binary, output.status, stderr.trim()),
        ));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| HealthError::external(device, format!("output is not UTF-8: {}", e)))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command_returns_stdout() {
        let output = run_tool("sh", &["-c", "echo 'sn : ABC123'"], Duration::from_secs(5), "/dev/nvme0n1")
            .await
            .unwrap();
        assert_eq!(output, "sn : ABC123\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let err = run_tool(
            "sh",
            &["-c", "echo 'permission denied' >&2; exit 3"],
            Duration::from_secs(5),
            "/dev/nvme0n1",
        )
        .await
        .unwrap_err();

        match err {
            HealthError::ExternalTool { device, reason } => {
                assert_eq!(device, "/dev/nvme0n1");
                assert!(reason.contains("permission denied"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let err = run_tool("sleep", &["10"], Duration::from_secs(1), "/dev/nvme1n1")
            .await
            .unwrap_err();

        assert!(matches!(err, HealthError::Timeout { secs: 1, .. }));
        assert_eq!(err.device(), Some("/dev/nvme1n1"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let cli = NvmeCli::new("/nonexistent/nvme", Duration::from_secs(5));
        let err = cli.smart_log("/dev/nvme0n1").await.unwrap_err();
        assert!(matches!(err, HealthError::ExternalTool { .. }));
    }
}
