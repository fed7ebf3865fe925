//! Serial console access through a terminal server
//!
//! The device console is wired to a terminal server port; we talk to it as a
//! raw TCP stream and match on the shell prompt.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, info};

use crate::models::SerialSettings;

/// Console session on one terminal server port
#[derive(Debug)]
pub struct SerialClient {
    addr: String,
    prompt: String,
    stream: TcpStream,
    /// Raw bytes; decoded only once a match ends on a character boundary
    buffer: Vec<u8>,
}

impl SerialClient {
    /// Open the terminal server port
    pub async fn connect(settings: &SerialSettings, connect_timeout: Duration) -> Result<Self> {
        let addr = format!("{}:{}", settings.host, settings.port);
        let stream = timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .with_context(|| format!("Timed out connecting to terminal server {addr}"))?
            .with_context(|| format!("Failed to connect to terminal server {addr}"))?;

        info!("Connected to serial console at {}", addr);
        Ok(Self {
            addr,
            prompt: settings.prompt.clone(),
            stream,
            buffer: Vec::new(),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Shell prompt configured for this console
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        debug!("serial {} <- {}", self.addr, line);
        self.stream
            .write_all(format!("{line}\n").as_bytes())
            .await
            .context("Failed to write to serial console")?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn fill(&mut self, wait: Duration) -> Result<usize> {
        let mut chunk = [0u8; 4096];
        let n = timeout(wait, self.stream.read(&mut chunk))
            .await
            .map_err(|_| anyhow::anyhow!("no console output within {}ms", wait.as_millis()))?
            .context("Failed to read from serial console")?;
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Read until `pattern` appears; returns everything up to and including
    /// it. Output after the pattern stays buffered for the next read.
    pub async fn read_until(&mut self, pattern: &str, wait: Duration) -> Result<String> {
        if pattern.is_empty() {
            return Ok(String::new());
        }
        let needle = pattern.as_bytes();
        let deadline = Instant::now() + wait;

        loop {
            if let Some(pos) = self.buffer.windows(needle.len()).position(|w| w == needle) {
                let out: Vec<u8> = self.buffer.drain(..pos + needle.len()).collect();
                return Ok(String::from_utf8_lossy(&out).into_owned());
            }

            let remaining = deadline
                .checked_duration_since(Instant::now())
                .filter(|d| !d.is_zero())
                .ok_or_else(|| anyhow::anyhow!("Timed out waiting for {pattern:?} on {}", self.addr))?;

            let n = self
                .fill(remaining)
                .await
                .with_context(|| format!("Waiting for {pattern:?} on {}", self.addr))?;
            if n == 0 {
                anyhow::bail!("Terminal server {} closed the connection", self.addr);
            }
        }
    }

    /// Run a command and return its output without the echoed command line
    /// and the trailing `prompt`
    pub async fn execute(&mut self, command: &str, prompt: &str, wait: Duration) -> Result<String> {
        self.write_line(command).await?;
        let raw = self.read_until(prompt, wait).await?;
        Ok(strip_echo(&raw, command, prompt))
    }

    /// Discard pending output, reading until the line is quiet for `quiet`
    pub async fn drain(&mut self, quiet: Duration) -> String {
        while let Ok(n) = self.fill(quiet).await {
            if n == 0 {
                break;
            }
        }
        String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned()
    }
}

fn strip_echo(raw: &str, command: &str, prompt: &str) -> String {
    let body = raw.strip_suffix(prompt).unwrap_or(raw);
    body.lines()
        .map(|l| l.trim_end_matches('\r'))
        .skip_while(|l| l.trim().is_empty() || l.trim() == command)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
