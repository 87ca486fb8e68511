//! Engine command line.

use std::path::{Path, PathBuf};
use std::process::Command;

use proxydetox_storage::ProxyConfiguration;

use crate::error::{Result, SupervisorError};

/// File name of the engine executable.
pub const ENGINE_BINARY: &str = "proxydetox";

/// Engine drain allowance in seconds; the engine stops immediately.
pub const GRACEFUL_SHUTDOWN_TIMEOUT: u32 = 0;

/// Resolves the engine next to the current executable.
pub fn default_engine_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|_| SupervisorError::ExecutablePath)?;
    let dir = exe.parent().ok_or(SupervisorError::ExecutablePath)?;
    Ok(dir.join(ENGINE_BINARY))
}

/// Program and arguments used to launch the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl EngineCommand {
    /// Builds the command line from a settings snapshot.
    ///
    /// Optional flags are only present when enabled, in the order
    /// negotiate, direct-fallback, always-use-connect.
    pub fn new(program: impl AsRef<Path>, config: &ProxyConfiguration) -> Self {
        let mut args = vec![
            "--port".to_string(),
            config.port.to_string(),
            "--graceful-shutdown-timeout".to_string(),
            GRACEFUL_SHUTDOWN_TIMEOUT.to_string(),
        ];
        if config.negotiate {
            args.push("--negotiate".to_string());
        }
        if config.direct_fallback {
            args.push("--direct-fallback".to_string());
        }
        if config.always_use_connect {
            args.push("--always-use-connect".to_string());
        }

        Self {
            program: program.as_ref().to_path_buf(),
            args,
        }
    }

    /// Executable path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Argument vector, without the program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns a ready-to-spawn [`Command`].
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl std::fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProxyConfiguration {
        ProxyConfiguration {
            port: 3128,
            pac_file: PathBuf::from("/tmp/proxy.pac"),
            negotiate: false,
            always_use_connect: false,
            direct_fallback: false,
            autostart: false,
        }
    }

    #[test]
    fn test_minimal_arguments() {
        let command = EngineCommand::new("/opt/proxydetox", &config());
        assert_eq!(
            command.args(),
            ["--port", "3128", "--graceful-shutdown-timeout", "0"]
        );
    }

    #[test]
    fn test_all_flags() {
        let mut config = config();
        config.port = 8080;
        config.negotiate = true;
        config.direct_fallback = true;
        config.always_use_connect = true;

        let command = EngineCommand::new("/opt/proxydetox", &config);
        assert_eq!(
            command.args(),
            [
                "--port",
                "8080",
                "--graceful-shutdown-timeout",
                "0",
                "--negotiate",
                "--direct-fallback",
                "--always-use-connect",
            ]
        );
    }

    #[test]
    fn test_single_flag() {
        let mut config = config();
        config.direct_fallback = true;

        let command = EngineCommand::new("/opt/proxydetox", &config);
        assert_eq!(command.args().last().map(String::as_str), Some("--direct-fallback"));
        assert_eq!(command.args().len(), 5);
    }

    #[test]
    fn test_pac_file_and_autostart_not_passed() {
        let mut config = config();
        config.autostart = true;

        let command = EngineCommand::new("/opt/proxydetox", &config);
        assert!(!command.args().iter().any(|a| a.contains("pac")));
        assert_eq!(command.args().len(), 4);
    }

    #[test]
    fn test_display() {
        let command = EngineCommand::new("/opt/proxydetox", &config());
        assert_eq!(
            command.to_string(),
            "/opt/proxydetox --port 3128 --graceful-shutdown-timeout 0"
        );
    }

    #[test]
    fn test_default_engine_path_is_sibling() {
        let path = default_engine_path().unwrap();
        let exe = std::env::current_exe().unwrap();
        assert_eq!(path.parent(), exe.parent());
        assert_eq!(path.file_name().unwrap(), ENGINE_BINARY);
    }
}
