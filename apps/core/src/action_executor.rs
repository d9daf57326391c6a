use std::path::{Path, PathBuf};
use std::process::Command;

use crate::model::ShortcutItem;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("empty path")]
    EmptyPath,
    #[error("path does not exist: {}", .0.display())]
    MissingPath(PathBuf),
    #[error("failed to start {}: {source}", .path.display())]
    SpawnFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait Launcher {
    fn launch(&self, item: &ShortcutItem) -> Result<(), LaunchError>;
}

/// Hands the target to the desktop shell, which resolves `.lnk` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellLauncher;

impl Launcher for ShellLauncher {
    fn launch(&self, item: &ShortcutItem) -> Result<(), LaunchError> {
        launch_path(item.target_path())
    }
}

pub fn validate_launch_path(path: &str) -> Result<PathBuf, LaunchError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(LaunchError::EmptyPath);
    }

    let candidate = Path::new(trimmed);
    if !candidate.exists() {
        return Err(LaunchError::MissingPath(candidate.to_path_buf()));
    }

    Ok(candidate.to_path_buf())
}

pub fn launch_path(path: &str) -> Result<(), LaunchError> {
    let target = validate_launch_path(path)?;
    shell_command(&target)
        .spawn()
        .map(|_| ())
        .map_err(|source| LaunchError::SpawnFailed {
            path: target.clone(),
            source,
        })?;
    tracing::info!(path = %target.display(), "launched");
    Ok(())
}

fn shell_command(target: &Path) -> Command {
    #[cfg(target_os = "windows")]
    let mut command = Command::new("explorer.exe");
    #[cfg(target_os = "macos")]
    let mut command = Command::new("open");
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let mut command = Command::new("xdg-open");

    command.arg(target);
    command
}
