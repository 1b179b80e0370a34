// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Remote command execution over SSH.
//!
//! Authentication walks a three-step fallback chain: ssh-agent, the default
//! private-key files under `~/.ssh`, then an interactive password prompt
//! (used both as plain password auth and as a keyboard-interactive
//! responder).  Host-key verification accepts any key (`AcceptingHandler`):
//! no MITM protection, in exchange for zero-setup access to lab hosts.

use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::shell::render_output;
use crate::Tool;

/// Built-in tool that runs a command on a remote host over SSH.
pub struct SshTool;

/// Host-key handler that accepts whatever the server presents.
struct AcceptingHandler;

impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

#[async_trait]
impl Tool for SshTool {
    fn name(&self) -> &str {
        "ssh"
    }

    fn description(&self) -> &str {
        "Execute a command on a remote host over SSH. 'host' accepts \
         [user@]hostname[:port]; the current login user and port 22 are the \
         defaults. Authentication tries the ssh-agent, then default key files, \
         then prompts for a password."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "host": {
                    "type": "string",
                    "description": "Target host as [user@]hostname[:port]"
                },
                "command": {
                    "type": "string",
                    "description": "The command to execute on the remote host"
                }
            },
            "required": ["host", "command"]
        })
    }

    async fn invoke(&self, args: &Value) -> anyhow::Result<String> {
        let host = match args.get("host").and_then(Value::as_str) {
            Some(h) if !h.is_empty() => h,
            _ => bail!("host parameter required"),
        };
        let command = match args.get("command").and_then(Value::as_str) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => bail!("command parameter required"),
        };

        let target = parse_host(host);
        debug!(user = %target.user, host = %target.host, port = target.port, "ssh exec");

        let config = Arc::new(client::Config::default());
        let mut session = client::connect(
            config,
            (target.host.as_str(), target.port),
            AcceptingHandler,
        )
        .await
        .with_context(|| format!("cannot connect to {}:{}", target.host, target.port))?;

        let authed = authenticate(&mut session, &target.user).await;
        if let Err(e) = authed {
            // The connection is half-open after a failed auth; close it
            // before surfacing the error.
            let _ = session
                .disconnect(Disconnect::ByApplication, "", "en")
                .await;
            return Err(e);
        }

        let result = exec_remote(&mut session, &command).await;
        let _ = session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
        result
    }
}

/// Parsed `[user@]hostname[:port]` target.
#[derive(Debug, PartialEq)]
struct SshTarget {
    user: String,
    host: String,
    port: u16,
}

fn parse_host(spec: &str) -> SshTarget {
    let (user, rest) = match spec.split_once('@') {
        Some((u, r)) if !u.is_empty() => (u.to_string(), r),
        _ => (current_user(), spec),
    };
    let (host, port) = match rest.rsplit_once(':') {
        Some((h, p)) => match p.parse::<u16>() {
            Ok(port) => (h.to_string(), port),
            Err(_) => (rest.to_string(), 22),
        },
        None => (rest.to_string(), 22),
    };
    SshTarget { user, host, port }
}

fn current_user() -> String {
    match std::env::var("USER") {
        Ok(u) if !u.is_empty() => u,
        _ => "root".to_string(),
    }
}

/// Walk the authentication fallback chain; returns once one step succeeds.
async fn authenticate(session: &mut Handle<AcceptingHandler>, user: &str) -> anyhow::Result<()> {
    // 1. ssh-agent via SSH_AUTH_SOCK.
    if std::env::var("SSH_AUTH_SOCK").is_ok() {
        match try_agent(session, user).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => warn!("ssh-agent auth failed: {e}"),
        }
    }

    // 2. Default private-key files under the user's home.
    if let Some(home) = dirs::home_dir() {
        for name in ["id_rsa", "id_ed25519", "id_ecdsa"] {
            let path = home.join(".ssh").join(name);
            if !path.exists() {
                continue;
            }
            let key = match load_secret_key(&path, None) {
                Ok(k) => k,
                Err(e) => {
                    warn!(key = %path.display(), "cannot load private key: {e}");
                    continue;
                }
            };
            let auth = session
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), None))
                .await?;
            if auth.success() {
                debug!(key = %path.display(), "authenticated with private key");
                return Ok(());
            }
        }
    }

    // 3. Interactive password, also answering keyboard-interactive prompts.
    let password = prompt_password(&format!("Password for {user}: ")).await?;
    let auth = session.authenticate_password(user, password.as_str()).await?;
    if auth.success() {
        return Ok(());
    }
    if try_keyboard_interactive(session, user, &password).await? {
        return Ok(());
    }

    bail!("all authentication methods failed for user {user}")
}

async fn try_agent(session: &mut Handle<AcceptingHandler>, user: &str) -> anyhow::Result<bool> {
    let mut agent = AgentClient::connect_env()
        .await
        .context("cannot connect to ssh-agent")?;
    let identities = agent
        .request_identities()
        .await
        .context("ssh-agent identity listing failed")?;
    for identity in identities {
        let russh::keys::agent::AgentIdentity::PublicKey { key, .. } = identity else {
            continue;
        };
        let auth = session
            .authenticate_publickey_with(user, key, None, &mut agent)
            .await?;
        if auth.success() {
            debug!("authenticated via ssh-agent");
            return Ok(true);
        }
    }
    Ok(false)
}

/// Answer every keyboard-interactive challenge with the same password.
async fn try_keyboard_interactive(
    session: &mut Handle<AcceptingHandler>,
    user: &str,
    password: &str,
) -> anyhow::Result<bool> {
    use russh::client::KeyboardInteractiveAuthResponse as Kia;

    let mut response = session
        .authenticate_keyboard_interactive_start(user, None)
        .await?;
    loop {
        match response {
            Kia::Success => return Ok(true),
            Kia::Failure { .. } => return Ok(false),
            Kia::InfoRequest { prompts, .. } => {
                let answers = vec![password.to_string(); prompts.len()];
                response = session
                    .authenticate_keyboard_interactive_respond(answers)
                    .await?;
            }
        }
    }
}

async fn exec_remote(
    session: &mut Handle<AcceptingHandler>,
    command: &str,
) -> anyhow::Result<String> {
    let mut channel = session
        .channel_open_session()
        .await
        .context("cannot open ssh session channel")?;
    channel
        .exec(true, command)
        .await
        .context("remote exec failed")?;

    let mut stdout: Vec<u8> = Vec::new();
    let mut stderr: Vec<u8> = Vec::new();
    let mut status: Option<i32> = None;

    loop {
        let Some(msg) = channel.wait().await else {
            break;
        };
        match msg {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
            // ext 1 is the SSH stderr stream.
            ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
            ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status as i32),
            _ => {}
        }
    }

    Ok(render_output(
        &String::from_utf8_lossy(&stdout),
        &String::from_utf8_lossy(&stderr),
        status,
    ))
}

/// Read a password from the controlling terminal with echo disabled.
async fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    let prompt = prompt.to_string();
    tokio::task::spawn_blocking(move || read_password_blocking(&prompt))
        .await
        .context("password prompt task failed")?
}

fn read_password_blocking(prompt: &str) -> anyhow::Result<String> {
    use std::io::{BufRead, Write};

    eprint!("{prompt}");
    std::io::stderr().flush().ok();

    #[cfg(unix)]
    let saved = echo_off();

    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line);

    #[cfg(unix)]
    if let Some(term) = saved {
        echo_restore(term);
    }
    eprintln!();

    read.context("cannot read password from stdin")?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

#[cfg(unix)]
fn echo_off() -> Option<libc::termios> {
    unsafe {
        let mut term: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(libc::STDIN_FILENO, &mut term) != 0 {
            return None;
        }
        let saved = term;
        term.c_lflag &= !libc::ECHO;
        if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &term) != 0 {
            return None;
        }
        Some(saved)
    }
}

#[cfg(unix)]
fn echo_restore(saved: libc::termios) {
    unsafe {
        libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &saved);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
