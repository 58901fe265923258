//! # mongod process.
//!
//! ```text
//! start():  <bin>/mongod --config <config>/mongod.conf   (TMPDIR=<tmp>, uid/gid of user/group)
//! probe():  TCP connect to host:port within PROBE_TIMEOUT
//! wait():   child exits ─────────────► Ok | ProcessExited
//!           stop fires ─► SIGTERM ─► reap (STOP_TIMEOUT, then SIGKILL)
//! ```
//!
//! Credentials are only switched when the executor runs as root; otherwise
//! the process inherits the executor's identity and a warning is logged.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::error::{ConfigError, ExecutorError};
use crate::executor::node::Node;

const MONGOD_BINARY: &str = "mongod";
const MONGOD_CONFIG_FILE: &str = "mongod.conf";
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Launches and supervises a local mongod.
pub struct MongodNode {
    binary: PathBuf,
    config_file: PathBuf,
    tmp_dir: PathBuf,
    user: String,
    group: String,
    probe_addr: String,
    child: Option<Child>,
}

impl MongodNode {
    pub fn new(cfg: &ExecutorConfig) -> Self {
        Self {
            binary: cfg.dirs.bin.join(MONGOD_BINARY),
            config_file: cfg.dirs.config.join(MONGOD_CONFIG_FILE),
            tmp_dir: cfg.dirs.tmp.clone(),
            user: cfg.user.clone(),
            group: cfg.group.clone(),
            probe_addr: cfg.probe_addr(),
            child: None,
        }
    }

    /// The command `start` runs, without credentials applied.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--config")
            .arg(&self.config_file)
            .env("TMPDIR", &self.tmp_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }

    #[cfg(unix)]
    fn apply_credentials(&self, cmd: &mut Command) -> Result<(), ExecutorError> {
        use nix::unistd::{Group, User, geteuid};

        let user = User::from_name(&self.user)
            .map_err(|e| invalid("user", format!("lookup of {} failed: {e}", self.user)))?
            .ok_or_else(|| invalid("user", format!("unknown user {}", self.user)))?;
        let group = Group::from_name(&self.group)
            .map_err(|e| invalid("group", format!("lookup of {} failed: {e}", self.group)))?
            .ok_or_else(|| invalid("group", format!("unknown group {}", self.group)))?;

        if !geteuid().is_root() {
            warn!(
                user = %self.user,
                group = %self.group,
                "not running as root, mongod keeps the executor's identity"
            );
            return Ok(());
        }
        cmd.uid(user.uid.as_raw()).gid(group.gid.as_raw());
        debug!(uid = user.uid.as_raw(), gid = group.gid.as_raw(), "mongod credentials set");
        Ok(())
    }

    #[cfg(not(unix))]
    fn apply_credentials(&self, _cmd: &mut Command) -> Result<(), ExecutorError> {
        warn!(user = %self.user, "process credentials are not supported on this platform");
        Ok(())
    }

    async fn shut_down(child: &mut Child) -> Result<ExitStatus, ExecutorError> {
        terminate(child)?;
        match time::timeout(STOP_TIMEOUT, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!(timeout_secs = STOP_TIMEOUT.as_secs(), "mongod ignored SIGTERM, killing");
                child.kill().await?;
                Ok(child.wait().await?)
            }
        }
    }
}

#[async_trait]
impl Node for MongodNode {
    fn name(&self) -> &str {
        MONGOD_BINARY
    }

    async fn start(&mut self) -> Result<(), ExecutorError> {
        let mut cmd = self.command();
        self.apply_credentials(&mut cmd)?;

        let binary = self.binary.display().to_string();
        let child = cmd.spawn().map_err(|source| ExecutorError::Launch {
            binary: binary.clone(),
            source,
        })?;
        info!(
            binary = %binary,
            config = %self.config_file.display(),
            pid = child.id(),
            "started mongod"
        );
        self.child = Some(child);
        Ok(())
    }

    async fn probe(&self) -> std::io::Result<()> {
        match time::timeout(PROBE_TIMEOUT, TcpStream::connect(&self.probe_addr)).await {
            Ok(conn) => conn.map(drop),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to {} timed out", self.probe_addr),
            )),
        }
    }

    async fn wait(&mut self, stop: CancellationToken) -> Result<(), ExecutorError> {
        let Some(child) = self.child.as_mut() else {
            return Err(ExecutorError::Io(std::io::Error::other("mongod was not started")));
        };

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                self.child = None;
                if status.success() {
                    info!(%status, "mongod exited");
                    Ok(())
                } else {
                    Err(ExecutorError::ProcessExited { status: status.to_string() })
                }
            }
            _ = stop.cancelled() => {
                info!("stopping mongod");
                let status = Self::shut_down(child).await?;
                self.child = None;
                info!(%status, "mongod stopped");
                Ok(())
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> Result<(), ExecutorError> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|e| ExecutorError::Io(std::io::Error::other(e)))?;
    kill(Pid::from_raw(pid), Signal::SIGTERM)
        .map_err(|errno| ExecutorError::Io(std::io::Error::from(errno)))
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> Result<(), ExecutorError> {
    Ok(child.start_kill()?)
}

fn invalid(setting: &'static str, reason: String) -> ExecutorError {
    ExecutorError::Config(ConfigError::Invalid { setting, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dirs;
    use crate::executor::NodeType;
    use tokio::net::TcpListener;

    fn config() -> ExecutorConfig {
        let mut cfg = ExecutorConfig::new(NodeType::Mongod);
        cfg.dirs = Dirs {
            bin: "/opt/mongodb/bin".into(),
            config: "/sandbox".into(),
            tmp: "/sandbox/tmp".into(),
        };
        cfg
    }

    #[test]
    fn command_points_at_binary_and_config_file() {
        let node = MongodNode::new(&config());
        let cmd = node.command();
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), "/opt/mongodb/bin/mongod");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["--config", "/sandbox/mongod.conf"]);
        let tmp = std_cmd
            .get_envs()
            .find(|(k, _)| *k == "TMPDIR")
            .and_then(|(_, v)| v);
        assert_eq!(tmp, Some(std::ffi::OsStr::new("/sandbox/tmp")));
    }

    #[tokio::test]
    async fn probe_reaches_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut cfg = config();
        cfg.port = listener.local_addr().unwrap().port();

        MongodNode::new(&cfg).probe().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let mut cfg = config();
        cfg.dirs.bin = tempfile::tempdir().unwrap().path().to_path_buf();
        cfg.user = whoami();
        cfg.group = current_group();

        let err = MongodNode::new(&cfg).start().await.unwrap_err();
        assert_eq!(err.exit_code(), 5, "{err}");
    }

    #[tokio::test]
    async fn wait_before_start_is_an_error() {
        let mut node = MongodNode::new(&config());
        let err = node.wait(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Io(_)));
    }

    #[cfg(unix)]
    fn whoami() -> String {
        nix::unistd::User::from_uid(nix::unistd::geteuid())
            .unwrap()
            .map(|u| u.name)
            .unwrap()
    }

    #[cfg(unix)]
    fn current_group() -> String {
        nix::unistd::Group::from_gid(nix::unistd::getegid())
            .unwrap()
            .map(|g| g.name)
            .unwrap()
    }
}
