// Interactive SSH command session over libssh2: wait for the prompt, enter enable
// mode, turn paging off, then send commands and read until the prompt returns.
// libssh2 is blocking, so every call runs on the blocking pool.

use super::{Transport, TransportError, TransportKind};
use crate::inventory::Device;
use async_trait::async_trait;
use ssh2::{Channel, Session};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const SAVE_COMMAND: &str = "write memory";
const MORE_MARKERS: [&str; 2] = ["--More--", "<--- More --->"];

#[derive(Debug, Clone)]
pub struct SshSettings {
    pub connect_timeout: Duration,
    /// Max silence while waiting for output or a prompt.
    pub command_timeout: Duration,
}

#[derive(Debug, Clone)]
struct SshTarget {
    host: String,
    port: u16,
    username: String,
    password: String,
    secret: Option<String>,
    paging_command: &'static str,
}

impl SshTarget {
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// ASA-class firmware uses `terminal pager`, everything else `terminal length`.
pub fn paging_command(platform: Option<&str>) -> &'static str {
    match platform {
        Some(p) if p.starts_with("cisco_asa") || p.starts_with("cisco_ftd") => "terminal pager 0",
        _ => "terminal length 0",
    }
}

const PROMPT_CONFIRM_ATTEMPTS: usize = 3;

fn last_line(text: &str) -> &str {
    text.rsplit(['\n', '\r']).next().unwrap_or("").trim()
}

/// True when the last line of `text` looks like a CLI prompt (`name#`, `name>`, `name(config)#`).
/// The name must start with a letter or digit, so banner rules like `#####` never match.
/// With `base` set, the prompt must also start with it; an empty `base` matches nothing.
pub fn ends_with_prompt(text: &str, base: Option<&str>) -> bool {
    let Some(name) = last_line(text).strip_suffix(['#', '>']) else {
        return false;
    };
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return false;
    }
    match base {
        Some(b) => !b.is_empty() && name.starts_with(b),
        None => !name.contains(char::is_whitespace),
    }
}

/// Prompt text without the trailing mode character, or `None` when nothing is left.
fn base_prompt(text: &str) -> Option<String> {
    let base = last_line(text).trim_end_matches(['#', '>']);
    (!base.is_empty()).then(|| base.to_string())
}

/// Strip the echoed command (first line) and the trailing prompt (last line).
pub fn clean_output(raw: &str, command: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "");
    let mut lines: Vec<&str> = normalized.split('\n').collect();
    if lines.first().is_some_and(|l| l.contains(command.trim())) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| ends_with_prompt(l, None) || l.trim().is_empty()) {
        lines.pop();
    }
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

struct Shell {
    // Keeps the session alive for the channel's lifetime.
    _session: Session,
    channel: Channel,
    base: Option<String>,
    command_timeout: Duration,
}

fn io_error(e: std::io::Error, timeout: Duration) -> TransportError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::Timeout(timeout),
        _ => TransportError::Session(e.to_string()),
    }
}

fn ssh_error(context: &str, e: ssh2::Error) -> TransportError {
    TransportError::Session(format!("{}: {}", context, e))
}

impl Shell {
    fn open(target: &SshTarget, settings: &SshSettings) -> Result<Self, TransportError> {
        let address = target.address();
        let connect_err = |reason: String| TransportError::Connect {
            target: address.clone(),
            reason,
        };
        let socket = address
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?
            .next()
            .ok_or_else(|| connect_err("no resolved address".into()))?;
        let tcp = TcpStream::connect_timeout(&socket, settings.connect_timeout)
            .map_err(|e| connect_err(e.to_string()))?;

        let mut session = Session::new().map_err(|e| ssh_error("creating session", e))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(settings.command_timeout.as_millis().min(u32::MAX as u128) as u32);
        session
            .handshake()
            .map_err(|e| connect_err(format!("SSH handshake failed: {}", e)))?;
        session
            .userauth_password(&target.username, &target.password)
            .map_err(|e| TransportError::Auth {
                target: address.clone(),
                reason: e.to_string(),
            })?;
        if !session.authenticated() {
            return Err(TransportError::Auth {
                target: address.clone(),
                reason: "authentication rejected".into(),
            });
        }

        let mut channel = session
            .channel_session()
            .map_err(|e| ssh_error("opening channel", e))?;
        channel
            .request_pty("vt100", None, Some((511, 24, 0, 0)))
            .map_err(|e| ssh_error("requesting PTY", e))?;
        channel
            .shell()
            .map_err(|e| ssh_error("starting shell", e))?;

        let mut shell = Shell {
            _session: session,
            channel,
            base: None,
            command_timeout: settings.command_timeout,
        };
        let prompt = shell.find_prompt()?;
        if prompt.ends_with('>') {
            shell.enable(target, &address)?;
        } else {
            shell.base = Some(shell.require_base(&prompt)?);
        }
        shell.send(target.paging_command)?;
        shell.read_until_prompt()?;
        debug!(target = %address, "SSH session ready");
        Ok(shell)
    }

    fn enable(&mut self, target: &SshTarget, address: &str) -> Result<(), TransportError> {
        self.send("enable")?;
        let reply = self.read_until(|t| {
            t.trim_end().to_lowercase().ends_with("password:") || ends_with_prompt(t, None)
        })?;
        let reply = if reply.trim_end().to_lowercase().ends_with("password:") {
            let secret = target
                .secret
                .as_deref()
                .ok_or(TransportError::MissingCredentials("enable secret"))?;
            self.send(secret)?;
            self.read_until(|t| ends_with_prompt(t, None))?
        } else {
            reply
        };
        if !reply.trim_end().ends_with('#') {
            return Err(TransportError::Auth {
                target: address.to_string(),
                reason: "could not enter privileged mode".into(),
            });
        }
        self.base = Some(self.require_base(&reply)?);
        Ok(())
    }

    /// Wait out the login banner, then press enter until the same prompt line shows up twice.
    fn find_prompt(&mut self) -> Result<String, TransportError> {
        let banner = self.read_until(|t| ends_with_prompt(t, None))?;
        let mut previous = last_line(&banner).to_string();
        for _ in 0..PROMPT_CONFIRM_ATTEMPTS {
            self.send("")?;
            let reply = self.read_until(|t| ends_with_prompt(t, None))?;
            let current = last_line(&reply).to_string();
            if current == previous {
                return Ok(current);
            }
            previous = current;
        }
        Err(TransportError::Session("device prompt never settled".into()))
    }

    fn require_base(&self, prompt: &str) -> Result<String, TransportError> {
        base_prompt(prompt).ok_or_else(|| TransportError::Session("empty device prompt".into()))
    }

    fn send(&mut self, line: &str) -> Result<(), TransportError> {
        self.channel
            .write_all(format!("{}\n", line).as_bytes())
            .and_then(|_| self.channel.flush())
            .map_err(|e| io_error(e, self.command_timeout))
    }

    fn read_until(&mut self, done: impl Fn(&str) -> bool) -> Result<String, TransportError> {
        let mut buf: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = self
                .channel
                .read(&mut chunk)
                .map_err(|e| io_error(e, self.command_timeout))?;
            if n == 0 {
                return Err(TransportError::Session("channel closed by device".into()));
            }
            buf.extend_from_slice(&chunk[..n]);
            let content_len = buf
                .iter()
                .rposition(|b| !b.is_ascii_whitespace())
                .map_or(0, |i| i + 1);
            if let Some(marker) = MORE_MARKERS
                .iter()
                .find(|m| buf[..content_len].ends_with(m.as_bytes()))
            {
                // Paging did not take; page through and drop the marker.
                buf.truncate(content_len - marker.len());
                self.channel
                    .write_all(b" ")
                    .map_err(|e| io_error(e, self.command_timeout))?;
                continue;
            }
            let text = String::from_utf8_lossy(&buf);
            if done(&text) {
                return Ok(text.into_owned());
            }
        }
    }

    fn read_until_prompt(&mut self) -> Result<String, TransportError> {
        let base = self.base.clone();
        self.read_until(|t| ends_with_prompt(t, base.as_deref()))
    }

    fn run(&mut self, command: &str) -> Result<String, TransportError> {
        self.send(command)?;
        let raw = self.read_until_prompt()?;
        Ok(clean_output(&raw, command))
    }
}

/// SSH command session for one device. The shell is opened on first use and reused.
pub struct SshTransport {
    target: SshTarget,
    settings: SshSettings,
    shell: Arc<Mutex<Option<Shell>>>,
}

impl SshTransport {
    pub fn new(device: &Device, settings: SshSettings) -> Result<Self, TransportError> {
        let username = device
            .username
            .clone()
            .ok_or(TransportError::MissingCredentials("username"))?;
        let password = device
            .password
            .clone()
            .ok_or(TransportError::MissingCredentials("password"))?;
        Ok(Self {
            target: SshTarget {
                host: device.hostname.clone(),
                port: device.ssh_port(),
                username,
                password,
                secret: device.enable_secret().map(str::to_string),
                paging_command: paging_command(device.platform.as_deref()),
            },
            settings,
            shell: Arc::new(Mutex::new(None)),
        })
    }

    async fn with_shell<F>(&self, f: F) -> Result<String, TransportError>
    where
        F: FnOnce(&mut Shell) -> Result<String, TransportError> + Send + 'static,
    {
        let shell = self.shell.clone();
        let target = self.target.clone();
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = shell
                .lock()
                .map_err(|e| TransportError::Session(format!("session lock poisoned: {}", e)))?;
            if guard.is_none() {
                *guard = Some(Shell::open(&target, &settings)?);
            }
            let Some(open) = guard.as_mut() else {
                return Err(TransportError::Session("session unavailable".into()));
            };
            let result = f(open);
            if result.is_err() {
                // Drop a shell in an unknown state; the next call reconnects.
                *guard = None;
            }
            result
        })
        .await
        .map_err(|e| TransportError::Session(format!("SSH worker failed: {}", e)))?
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }

    async fn execute(&self, command: &str) -> Result<String, TransportError> {
        let command = command.to_string();
        self.with_shell(move |shell| shell.run(&command)).await
    }

    async fn save_config(&self) -> Result<String, TransportError> {
        self.with_shell(|shell| shell.run(SAVE_COMMAND)).await
    }

    async fn apply_config(&self, lines: &[String]) -> Result<String, TransportError> {
        let lines = lines.to_vec();
        self.with_shell(move |shell| {
            let mut output = shell.run("configure terminal")?;
            for line in &lines {
                output.push_str(&shell.run(line)?);
            }
            output.push_str(&shell.run("end")?);
            Ok(output)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_detection() {
        assert!(ends_with_prompt("banner\r\nR1#", None));
        assert!(ends_with_prompt("R1> ", None));
        assert!(!ends_with_prompt("interface Gi0/1\n description uplink", None));
        assert!(ends_with_prompt("...\nR1(config)#", Some("R1")));
        assert!(!ends_with_prompt("...\nR2#", Some("R1")));
    }

    #[test]
    fn banner_rules_are_not_prompts() {
        assert!(!ends_with_prompt("\r\n########################################", None));
        assert!(!ends_with_prompt("Authorized access only\r\n>>>>>>>>", None));
        assert!(!ends_with_prompt("#", None));
        assert!(!ends_with_prompt("R1 (config) #", None));
    }

    #[test]
    fn empty_base_matches_nothing() {
        assert!(!ends_with_prompt("terminal length 0\r\nR1#", Some("")));
        assert_eq!(base_prompt("\r\n####"), None);
        assert_eq!(base_prompt("banner\r\nfw1> ").as_deref(), Some("fw1"));
    }

    #[test]
    fn clean_output_keeps_trailing_banner_rule() {
        let raw = "show banner motd\r\n####\r\nR1#";
        assert_eq!(clean_output(raw, "show banner motd"), "####\n");
    }

    #[test]
    fn clean_output_strips_echo_and_prompt() {
        let raw = "more system:running-config\r\nhostname R1\r\n!\r\nR1#";
        assert_eq!(
            clean_output(raw, "more system:running-config"),
            "hostname R1\n!\n"
        );
    }

    #[test]
    fn paging_by_platform() {
        assert_eq!(paging_command(Some("cisco_asa")), "terminal pager 0");
        assert_eq!(paging_command(Some("cisco_ios")), "terminal length 0");
        assert_eq!(paging_command(None), "terminal length 0");
    }
}
