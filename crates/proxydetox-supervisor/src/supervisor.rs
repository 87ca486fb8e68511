//! Engine process supervisor.
//!
//! Owns at most one engine child. A dedicated watcher thread owns the
//! blocking wait on the child and reports its exit status back over a
//! channel, so the caller's thread never blocks unless it asks to stop.
//!
//! The engine has no live-reconfiguration channel: any settings change is
//! applied with [`ProcessSupervisor::restart`].

use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use proxydetox_storage::{ConfigurationStore, SettingsBackend};

use crate::command::EngineCommand;
use crate::error::{Result, SupervisorError};

/// Last observed engine exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitRecord {
    /// Process id of the exited engine.
    pub pid: u32,
    /// Exit status as an opaque integer (`128 + signal` when killed by a signal).
    pub status: i32,
    /// When the exit was observed.
    pub at: DateTime<Utc>,
}

struct EngineHandle {
    pid: u32,
    running: Arc<AtomicBool>,
    exited: Receiver<ExitStatus>,
    watcher: JoinHandle<()>,
}

/// Supervises the engine process.
///
/// Methods take `&mut self`; the supervisor expects a single serialized
/// caller, such as a UI event loop.
pub struct ProcessSupervisor<B: SettingsBackend> {
    store: Arc<ConfigurationStore<B>>,
    engine: PathBuf,
    stop_timeout: Option<Duration>,
    handle: Option<EngineHandle>,
    last_exit: Arc<Mutex<Option<ExitRecord>>>,
    signal: fn(u32, Termination) -> Result<()>,
}

impl<B: SettingsBackend> ProcessSupervisor<B> {
    /// Creates a supervisor launching `engine` with settings from `store`.
    pub fn new(store: Arc<ConfigurationStore<B>>, engine: impl Into<PathBuf>) -> Self {
        Self {
            store,
            engine: engine.into(),
            stop_timeout: None,
            handle: None,
            last_exit: Arc::new(Mutex::new(None)),
            signal,
        }
    }

    /// Escalates to a forced kill when the engine has not exited `timeout`
    /// after the termination signal. Without this, `stop` waits indefinitely.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    /// Engine executable path.
    pub fn engine(&self) -> &Path {
        &self.engine
    }

    /// Settings the engine is launched with.
    pub fn store(&self) -> &ConfigurationStore<B> {
        &self.store
    }

    /// Command line the next `start` would use.
    pub fn engine_command(&self) -> EngineCommand {
        EngineCommand::new(&self.engine, &self.store.snapshot())
    }

    /// Launches the engine, stopping a running one first.
    ///
    /// A launch failure is returned to the caller and leaves no handle.
    pub fn start(&mut self) -> Result<u32> {
        self.stop()?;

        let command = self.engine_command();
        debug!("Launching engine: {}", command);

        let mut child = command
            .to_command()
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| {
                error!("Failed to run {}: {}", self.engine.display(), source);
                SupervisorError::Launch {
                    path: self.engine.clone(),
                    source,
                }
            })?;
        let pid = child.id();

        let running = Arc::new(AtomicBool::new(true));
        let (tx, exited) = mpsc::channel();
        let (child_tx, child_rx) = mpsc::channel::<Child>();
        let watcher_running = Arc::clone(&running);
        let last_exit = Arc::clone(&self.last_exit);

        // The child is handed over only once the thread exists, so a failed
        // spawn still leaves it here to be reaped.
        let watcher = thread::Builder::new()
            .name(format!("engine-watch-{}", pid))
            .spawn(move || {
                let Ok(mut child) = child_rx.recv() else {
                    return;
                };
                let status = child.wait();
                watcher_running.store(false, Ordering::SeqCst);
                match status {
                    Ok(status) => {
                        let code = opaque_status(&status);
                        info!("Engine (pid {}) exited with status {}", pid, code);
                        *last_exit.lock() = Some(ExitRecord {
                            pid,
                            status: code,
                            at: Utc::now(),
                        });
                        let _ = tx.send(status);
                    }
                    Err(e) => {
                        warn!("Failed to wait for engine (pid {}): {}", pid, e);
                    }
                }
            });

        let watcher = match watcher {
            Ok(watcher) => watcher,
            Err(e) => {
                error!("Failed to start exit watcher for engine (pid {}): {}", pid, e);
                reap(&mut child);
                return Err(SupervisorError::Watcher(e));
            }
        };
        if let Err(mpsc::SendError(mut child)) = child_tx.send(child) {
            error!("Exit watcher for engine (pid {}) is gone", pid);
            reap(&mut child);
            let _ = watcher.join();
            return Err(SupervisorError::Watcher(std::io::Error::other(
                "exit watcher terminated before taking the engine",
            )));
        }

        info!("Engine started (pid {})", pid);
        self.handle = Some(EngineHandle {
            pid,
            running,
            exited,
            watcher,
        });
        Ok(pid)
    }

    /// Terminates the engine and waits for it to exit.
    ///
    /// Does nothing when no engine was started.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        if handle.running.load(Ordering::SeqCst) {
            debug!("Terminating engine (pid {})", handle.pid);
            if let Err(e) = (self.signal)(handle.pid, Termination::Graceful) {
                self.handle = Some(handle);
                return Err(e);
            }
        }

        match self.stop_timeout {
            None => {
                let _ = handle.exited.recv();
            }
            Some(timeout) => match handle.exited.recv_timeout(timeout) {
                Ok(_) | Err(RecvTimeoutError::Disconnected) => {}
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "Engine (pid {}) still running after {:?}, killing it",
                        handle.pid, timeout
                    );
                    if let Err(e) = (self.signal)(handle.pid, Termination::Forced) {
                        self.handle = Some(handle);
                        return Err(e);
                    }
                    let _ = handle.exited.recv();
                }
            },
        }

        if handle.watcher.join().is_err() {
            warn!("Exit watcher for pid {} panicked", handle.pid);
        }
        info!("Engine stopped (pid {})", handle.pid);
        Ok(())
    }

    /// Stops and relaunches the engine with the current settings.
    pub fn restart(&mut self) -> Result<u32> {
        self.stop()?;
        self.start()
    }

    /// Returns whether the current engine is alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.running.load(Ordering::SeqCst))
    }

    /// Process id of the current engine, alive or not yet stopped.
    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.pid)
    }

    /// Most recent observed engine exit.
    pub fn last_exit(&self) -> Option<ExitRecord> {
        self.last_exit.lock().clone()
    }
}

impl<B: SettingsBackend> Drop for ProcessSupervisor<B> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop engine on drop: {}", e);
        }
    }
}

/// Kills and reaps a child that no watcher owns.
fn reap(child: &mut Child) {
    let pid = child.id();
    if let Err(e) = child.kill() {
        warn!("Failed to kill engine (pid {}): {}", pid, e);
    }
    match child.wait() {
        Ok(status) => debug!("Reaped engine (pid {}) with status {}", pid, opaque_status(&status)),
        Err(e) => warn!("Failed to reap engine (pid {}): {}", pid, e),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Graceful,
    Forced,
}

#[cfg(unix)]
fn signal(pid: u32, how: Termination) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let sig = match how {
        Termination::Graceful => Signal::SIGTERM,
        Termination::Forced => Signal::SIGKILL,
    };
    let raw = i32::try_from(pid).map_err(|_| SupervisorError::Signal {
        pid,
        message: "pid out of range".to_string(),
    })?;

    match kill(Pid::from_raw(raw), sig) {
        // Already gone; the watcher reports the exit.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(SupervisorError::Signal {
            pid,
            message: e.desc().to_string(),
        }),
    }
}

#[cfg(not(unix))]
fn signal(pid: u32, _how: Termination) -> Result<()> {
    let output = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .output()
        .map_err(|e| SupervisorError::Signal {
            pid,
            message: e.to_string(),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(SupervisorError::Signal {
            pid,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(unix)]
fn opaque_status(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn opaque_status(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Instant;

    use proxydetox_storage::MemoryBackend;
    use tempfile::TempDir;

    const ETXTBSY: i32 = 26;

    /// Writes an executable shell script standing in for the engine.
    fn fake_engine(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("proxydetox");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn supervisor(engine: PathBuf) -> ProcessSupervisor<MemoryBackend> {
        let store = Arc::new(ConfigurationStore::new(MemoryBackend::new()));
        ProcessSupervisor::new(store, engine)
    }

    /// Starts, retrying while another test thread's fork still holds the
    /// freshly written script open.
    fn start(sup: &mut ProcessSupervisor<MemoryBackend>) -> u32 {
        for _ in 0..50 {
            match sup.start() {
                Ok(pid) => return pid,
                Err(SupervisorError::Launch { source, .. })
                    if source.raw_os_error() == Some(ETXTBSY) =>
                {
                    thread::sleep(Duration::from_millis(20));
                }
                Err(e) => panic!("start failed: {e}"),
            }
        }
        panic!("engine script stayed busy");
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    fn is_alive(pid: u32) -> bool {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut sup = supervisor(fake_engine(&dir, "exec sleep 30"));

        sup.stop().unwrap();
        assert!(!sup.is_running());
        assert!(sup.pid().is_none());
    }

    #[test]
    fn test_start_and_stop() {
        let dir = TempDir::new().unwrap();
        let mut sup = supervisor(fake_engine(&dir, "exec sleep 30"));

        let pid = start(&mut sup);
        assert!(sup.is_running());
        assert_eq!(sup.pid(), Some(pid));

        sup.stop().unwrap();
        assert!(!sup.is_running());
        assert!(sup.pid().is_none());
        assert!(!is_alive(pid));

        let exit = sup.last_exit().unwrap();
        assert_eq!(exit.pid, pid);
        assert_eq!(exit.status, 128 + 15);
    }

    #[test]
    fn test_launch_failure_keeps_no_handle() {
        let dir = TempDir::new().unwrap();
        let mut sup = supervisor(dir.path().join("missing-engine"));

        let err = sup.start().unwrap_err();
        assert!(matches!(err, SupervisorError::Launch { .. }));
        assert!(!sup.is_running());
        assert!(sup.pid().is_none());

        // Still usable afterwards.
        sup.stop().unwrap();
    }

    #[test]
    fn test_restart_replaces_process() {
        let dir = TempDir::new().unwrap();
        let mut sup = supervisor(fake_engine(&dir, "exec sleep 30"));

        let first = start(&mut sup);
        let second = sup.restart().unwrap();

        assert_ne!(first, second);
        assert!(!is_alive(first));
        assert!(sup.is_running());
        assert_eq!(sup.pid(), Some(second));

        sup.stop().unwrap();
    }

    #[test]
    fn test_start_while_running_stops_previous() {
        let dir = TempDir::new().unwrap();
        let mut sup = supervisor(fake_engine(&dir, "exec sleep 30"));

        let first = start(&mut sup);
        let second = sup.start().unwrap();

        assert_ne!(first, second);
        assert!(!is_alive(first));
        assert_eq!(sup.last_exit().map(|e| e.pid), Some(first));
    }

    #[test]
    fn test_arguments_follow_settings() {
        let dir = TempDir::new().unwrap();
        let args_file = dir.path().join("args.txt");
        let engine = fake_engine(
            &dir,
            &format!("echo \"$@\" > {}\nexec sleep 30", args_file.display()),
        );
        let mut sup = supervisor(engine);
        sup.store().set_port(4128).unwrap();
        sup.store().set_negotiate(true).unwrap();

        start(&mut sup);
        assert!(wait_for(|| fs::read_to_string(&args_file)
            .map(|s| s.ends_with('\n'))
            .unwrap_or(false)));
        assert_eq!(
            fs::read_to_string(&args_file).unwrap().trim(),
            "--port 4128 --graceful-shutdown-timeout 0 --negotiate"
        );

        fs::remove_file(&args_file).unwrap();
        sup.store().set_negotiate(false).unwrap();
        sup.store().set_always_use_connect(true).unwrap();
        sup.restart().unwrap();
        assert!(wait_for(|| fs::read_to_string(&args_file)
            .map(|s| s.ends_with('\n'))
            .unwrap_or(false)));
        assert_eq!(
            fs::read_to_string(&args_file).unwrap().trim(),
            "--port 4128 --graceful-shutdown-timeout 0 --always-use-connect"
        );
    }

    #[test]
    fn test_engine_exiting_on_its_own() {
        let dir = TempDir::new().unwrap();
        let mut sup = supervisor(fake_engine(&dir, "exit 3"));

        let pid = start(&mut sup);
        assert!(wait_for(|| !sup.is_running()));
        assert_eq!(sup.pid(), Some(pid));

        sup.stop().unwrap();
        assert!(sup.pid().is_none());
        assert_eq!(sup.last_exit().map(|e| e.status), Some(3));
    }

    #[test]
    fn test_stop_timeout_escalates_to_kill() {
        let dir = TempDir::new().unwrap();
        let ready = dir.path().join("ready");
        let engine = fake_engine(
            &dir,
            &format!(
                "trap '' TERM\ntouch {}\nwhile true; do sleep 0.05; done",
                ready.display()
            ),
        );
        let mut sup = supervisor(engine).with_stop_timeout(Duration::from_millis(200));

        start(&mut sup);
        assert!(wait_for(|| ready.exists()));

        sup.stop().unwrap();
        assert!(!sup.is_running());
        assert_eq!(sup.last_exit().map(|e| e.status), Some(128 + 9));
    }

    fn refuse_all(pid: u32, _how: Termination) -> Result<()> {
        Err(SupervisorError::Signal {
            pid,
            message: "Operation not permitted".to_string(),
        })
    }

    fn refuse_forced(pid: u32, how: Termination) -> Result<()> {
        match how {
            Termination::Graceful => signal(pid, how),
            Termination::Forced => refuse_all(pid, how),
        }
    }

    #[test]
    fn test_failed_terminate_keeps_handle() {
        let dir = TempDir::new().unwrap();
        let mut sup = supervisor(fake_engine(&dir, "exec sleep 30"));
        let pid = start(&mut sup);

        sup.signal = refuse_all;
        assert!(matches!(sup.stop(), Err(SupervisorError::Signal { .. })));
        assert!(sup.is_running());
        assert_eq!(sup.pid(), Some(pid));

        sup.signal = signal;
        sup.stop().unwrap();
        assert!(!is_alive(pid));
    }

    #[test]
    fn test_failed_kill_after_timeout_keeps_handle() {
        let dir = TempDir::new().unwrap();
        let ready = dir.path().join("ready");
        let engine = fake_engine(
            &dir,
            &format!(
                "trap '' TERM\ntouch {}\nwhile true; do sleep 0.05; done",
                ready.display()
            ),
        );
        let mut sup = supervisor(engine).with_stop_timeout(Duration::from_millis(200));
        let pid = start(&mut sup);
        assert!(wait_for(|| ready.exists()));

        sup.signal = refuse_forced;
        assert!(matches!(sup.stop(), Err(SupervisorError::Signal { .. })));
        assert!(sup.is_running());
        assert_eq!(sup.pid(), Some(pid));

        sup.signal = signal;
        sup.stop().unwrap();
        assert!(!is_alive(pid));
        assert_eq!(sup.last_exit().map(|e| e.status), Some(128 + 9));
    }

    #[test]
    fn test_reap_leaves_no_zombie() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id();

        reap(&mut child);

        // A zombie would still accept signals.
        assert!(!is_alive(pid));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn test_drop_stops_engine() {
        let dir = TempDir::new().unwrap();
        let mut sup = supervisor(fake_engine(&dir, "exec sleep 30"));

        let pid = start(&mut sup);
        drop(sup);

        assert!(!is_alive(pid));
    }
}
