//! Runtime layout
//!
//! Every file the daemon and its clients share lives under one per-user
//! directory. The layout is resolved once at startup and handed to whoever
//! needs it.

use std::env;
use std::path::{Path, PathBuf};

use crate::errors::SwarmError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Directory name appended to the per-user base
pub const APP_DIR: &str = "proxmox-swarm";

/// Runtime layout for the daemon
#[derive(Debug, Clone)]
pub struct RuntimeLayout {
    /// Base directory for all runtime files
    pub base_dir: PathBuf,
}

impl RuntimeLayout {
    /// Create a layout rooted at an explicit directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Resolve the per-user layout from the environment:
    /// `$XDG_RUNTIME_DIR`, then `$HOME/.config`, then the temp dir
    pub fn resolve() -> Self {
        let base = env::var_os("XDG_RUNTIME_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                env::var_os("HOME")
                    .filter(|home| !home.is_empty())
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .unwrap_or_else(env::temp_dir);

        Self::new(base.join(APP_DIR))
    }

    /// Use `override_dir` when given, otherwise [`RuntimeLayout::resolve`]
    pub fn from_override(override_dir: Option<&Path>) -> Self {
        match override_dir {
            Some(dir) => Self::new(dir),
            None => Self::resolve(),
        }
    }

    pub fn base(&self) -> Dir {
        Dir::new(&self.base_dir)
    }

    /// Decimal pid of the running daemon
    pub fn pid_file(&self) -> File {
        self.base().file("daemon.pid")
    }

    /// Unix socket the daemon listens on
    pub fn socket_file(&self) -> File {
        self.base().file("daemon.sock")
    }

    pub fn settings_file(&self) -> File {
        self.base().file("settings.json")
    }

    pub fn logs_dir(&self) -> Dir {
        self.base().subdir("logs")
    }

    /// Create the runtime directories
    pub async fn setup(&self) -> Result<(), SwarmError> {
        self.base().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for RuntimeLayout {
    fn default() -> Self {
        Self::resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = RuntimeLayout::new("/run/user/1000/proxmox-swarm");
        assert_eq!(
            layout.pid_file().path(),
            Path::new("/run/user/1000/proxmox-swarm/daemon.pid")
        );
        assert_eq!(
            layout.socket_file().path(),
            Path::new("/run/user/1000/proxmox-swarm/daemon.sock")
        );
        assert_eq!(
            layout.logs_dir().path(),
            Path::new("/run/user/1000/proxmox-swarm/logs")
        );
    }

    #[test]
    fn test_resolve_ends_with_app_dir() {
        let layout = RuntimeLayout::resolve();
        assert!(layout.base_dir.ends_with(APP_DIR));
    }

    #[test]
    fn test_override() {
        let layout = RuntimeLayout::from_override(Some(Path::new("/tmp/custom")));
        assert_eq!(layout.base_dir, PathBuf::from("/tmp/custom"));
    }

    #[tokio::test]
    async fn test_setup_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RuntimeLayout::new(dir.path().join("rt"));
        layout.setup().await.unwrap();
        assert!(layout.base().exists().await);
        assert!(layout.logs_dir().exists().await);
    }
}
