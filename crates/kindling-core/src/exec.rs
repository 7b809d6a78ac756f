//! Local process execution for engines that drive a local binary.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Run a local command to completion, inheriting stdio. Non-zero exit is
/// an error carrying the rendered command line.
pub async fn run_local(
    program: &str,
    args: &[&str],
    current_dir: Option<&Path>,
    envs: &[(String, String)],
) -> Result<()> {
    let rendered = if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    };
    debug!(command = %rendered, "running local command");

    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = current_dir {
        command.current_dir(dir);
    }
    for (key, value) in envs {
        command.env(key, value);
    }

    let status = command.status().await.map_err(|e| {
        Error::LocalCommand {
            command: rendered.clone(),
            status: -1,
        }
        .context(format!("failed to spawn {program}: {e}"))
    })?;

    if !status.success() {
        return Err(Error::LocalCommand {
            command: rendered,
            status: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_local_success() {
        run_local("true", &[], None, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_local_failure_carries_command() {
        let err = run_local("false", &[], None, &[]).await.unwrap_err();
        assert!(err.to_string().contains("false"));
    }

    #[tokio::test]
    async fn test_run_local_env_and_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        run_local(
            "sh",
            &["-c", "test \"$KINDLING_PROBE\" = yes"],
            Some(temp.path()),
            &[("KINDLING_PROBE".to_string(), "yes".to_string())],
        )
        .await
        .unwrap();
    }
}
