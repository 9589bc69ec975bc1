//! Guest access over ssh and scp.
//!
//! The remote shell is an external tool; vmc only builds its command lines.
//! Host keys are not checked since every guest is a disposable local VM.

use crate::error::{Error, Result};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Guest ssh port.
pub const SSH_PORT: u16 = 22;

/// Connect timeout for reachability probes and ssh itself.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bound when waiting for a freshly started guest.
pub const BOOT_WAIT: Duration = Duration::from_secs(60);

/// Default interval between reachability probes.
pub const BOOT_POLL: Duration = Duration::from_millis(100);

/// In-guest command execution and file copy.
pub trait RemoteShell {
    /// Whether the guest's ssh port accepts connections.
    fn port_open(&self, ip: &str) -> bool;

    /// Run `command` in the guest. Output is shown only when `verbose`.
    fn run(&self, ip: &str, command: &str, verbose: bool) -> Result<()>;

    /// Open an interactive session.
    fn interactive(&self, ip: &str) -> Result<()>;

    /// Copy a local file or directory to `dest` in the guest.
    fn copy(&self, ip: &str, src: &Path, dest: &str, verbose: bool) -> Result<()>;
}

/// [`RemoteShell`] backed by the system `ssh` and `scp` binaries.
#[derive(Debug, Clone)]
pub struct SshShell {
    user: String,
    key: PathBuf,
}

impl SshShell {
    /// Create a shell logging in as `user` with private key `key`.
    pub fn new(user: impl Into<String>, key: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            key: key.into(),
        }
    }

    fn common_args(&self) -> Vec<String> {
        vec![
            "-o".into(),
            format!("ConnectTimeout={}", CONNECT_TIMEOUT.as_secs()),
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            "-o".into(),
            "UserKnownHostsFile=/dev/null".into(),
            "-o".into(),
            "LogLevel=ERROR".into(),
            "-i".into(),
            self.key.to_string_lossy().into_owned(),
        ]
    }

    fn login(&self, ip: &str) -> String {
        format!("{}@{}", self.user, ip)
    }

    fn ssh_command(&self, ip: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(self.common_args()).arg(self.login(ip));
        cmd
    }

    fn execute(mut cmd: Command, label: &str, verbose: bool) -> Result<()> {
        if !verbose {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let status = cmd
            .status()
            .map_err(|e| Error::command_failed(label, e.to_string()))?;
        if !status.success() {
            return Err(Error::guest(format!("{} exited with {}", label, status)));
        }
        Ok(())
    }
}

impl RemoteShell for SshShell {
    fn port_open(&self, ip: &str) -> bool {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            return false;
        };
        TcpStream::connect_timeout(&SocketAddr::new(addr, SSH_PORT), CONNECT_TIMEOUT).is_ok()
    }

    fn run(&self, ip: &str, command: &str, verbose: bool) -> Result<()> {
        tracing::debug!(ip = %ip, command = %command, "running guest command");
        let mut cmd = self.ssh_command(ip);
        cmd.arg(command);
        Self::execute(cmd, "ssh", verbose)
    }

    fn interactive(&self, ip: &str) -> Result<()> {
        Self::execute(self.ssh_command(ip), "ssh", true)
    }

    fn copy(&self, ip: &str, src: &Path, dest: &str, verbose: bool) -> Result<()> {
        tracing::debug!(ip = %ip, src = %src.display(), dest = %dest, "copying to guest");
        let mut cmd = Command::new("scp");
        cmd.arg("-r")
            .args(self.common_args())
            .arg(src)
            .arg(format!("{}:{}", self.login(ip), dest));
        Self::execute(cmd, "scp", verbose)
    }
}

/// Poll `ip` until its ssh port opens or `timeout` elapses.
pub fn wait_for_port(shell: &dyn RemoteShell, ip: &str, timeout: Duration, interval: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if shell.port_open(ip) {
            return true;
        }
        if Instant::now() >= deadline {
            tracing::debug!(ip = %ip, "guest not reachable in time");
            return false;
        }
        thread::sleep(interval);
    }
}

/// Make sure the guest access key pair exists.
///
/// Generates the private key on first use, keeps it at mode 0600, and
/// derives `<key>.pub` when it is missing.
pub fn ensure_ssh_keys(key: &Path) -> Result<()> {
    if let Some(dir) = key.parent() {
        std::fs::create_dir_all(dir)?;
    }

    if !key.exists() {
        tracing::info!(key = %key.display(), "generating ssh key for guest access");
        let output = Command::new("ssh-keygen")
            .args(["-q", "-t", "ed25519", "-N", "", "-C", "vmc", "-f"])
            .arg(key)
            .output()
            .map_err(|e| Error::command_failed("ssh-keygen", e.to_string()))?;
        if !output.status.success() {
            return Err(Error::command_failed(
                "ssh-keygen",
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
    }

    restrict_permissions(key)?;

    let public = public_key_path(key);
    if !public.exists() {
        let output = Command::new("ssh-keygen")
            .arg("-y")
            .arg("-f")
            .arg(key)
            .output()
            .map_err(|e| Error::command_failed("ssh-keygen -y", e.to_string()))?;
        if !output.status.success() {
            return Err(Error::command_failed(
                "ssh-keygen -y",
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        std::fs::write(&public, &output.stdout)?;
    }

    Ok(())
}

/// `<key>.pub`.
pub fn public_key_path(key: &Path) -> PathBuf {
    let mut name = key.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}

#[cfg(unix)]
fn restrict_permissions(key: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(key, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_key: &Path) -> Result<()> {
    Ok(())
}
