//! Chat session — prompt assembly, history, shell passthrough and console output.
//!
//! Text is passed through as typed: the prompt prefix and the user's input
//! are joined with a single space and sent unmodified.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{debug, info};

use crate::adapters::{ChatBackend, Message, Role};
use crate::provider::ModelKind;

pub const SYSTEM_PROMPT: &str = "You are a domain expert. Answer the user's questions from a \
professional point of view, putting expertise first.";

const USER_MARK: &str = "🥰:";
const ASSISTANT_MARK: &str = "🤖:";
const REASONING_MARK: &str = "🤖🧐:";
const EXIT_WORDS: [&str; 3] = ["exit", "quit", "q"];

/// One block of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    Exit,
}

/// Read lines until a blank line or `EOF`; `exit`, `quit` or `q` on any line ends the session.
pub fn read_block<R: BufRead>(reader: &mut R) -> io::Result<Input> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            // Closed stdin: hand over what we have, or stop.
            return Ok(if lines.is_empty() {
                Input::Exit
            } else {
                Input::Text(lines.join("\n"))
            });
        }

        let line = line.trim_end_matches(&['\n', '\r'][..]);
        let word = line.trim();
        if word.is_empty() || word == "EOF" {
            return Ok(Input::Text(lines.join("\n")));
        }
        if EXIT_WORDS.contains(&word) {
            return Ok(Input::Exit);
        }
        lines.push(line.to_string());
    }
}

pub fn compose_prompt(prefix: &str, input: &str) -> String {
    format!("{prefix} {input}")
}

/// Run `command` through `sh -c`; on success returns stdout and stderr joined by a newline.
pub async fn run_shell(command: &str) -> Result<String> {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await
        .with_context(|| format!("Failed to spawn `{command}`"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        anyhow::bail!("`{command}` exited with {}: {}", output.status, stderr.trim_end());
    }
    Ok(format!("{stdout}\n{stderr}"))
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: String,
    pub kind: ModelKind,
    pub stream: bool,
    /// Echo the raw input and drop the decorations around replies.
    pub raw: bool,
}

pub struct Session<'a> {
    backend: &'a dyn ChatBackend,
    options: SessionOptions,
    history: Vec<Message>,
}

impl<'a> Session<'a> {
    pub fn new(backend: &'a dyn ChatBackend, options: SessionOptions) -> Self {
        Self {
            backend,
            options,
            history: vec![Message::new(Role::System, SYSTEM_PROMPT)],
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Single request built from `prefix` and everything read from stdin.
    pub async fn ask_once<W: Write>(&mut self, prefix: &str, input: &str, out: &mut W) -> Result<String> {
        if self.options.raw {
            writeln!(out, "{input}")?;
        } else {
            writeln!(out, "{USER_MARK}")?;
        }
        self.send(compose_prompt(prefix, input), out).await
    }

    /// Interactive loop; `prefix` starts as the command-line words and is
    /// replaced by the output of each `!command`.
    pub async fn run_interactive<R: BufRead, W: Write>(
        &mut self,
        mut prefix: String,
        input: &mut R,
        out: &mut W,
    ) -> Result<()> {
        loop {
            writeln!(out, "{USER_MARK}")?;
            out.flush()?;
            let text = match read_block(input).context("Failed to read input")? {
                Input::Exit => break,
                Input::Text(text) => text,
            };

            if let Some(command) = text.strip_prefix('!') {
                debug!(command, "Running shell command");
                match run_shell(command).await {
                    Ok(output) => {
                        writeln!(out, "command succeeded")?;
                        writeln!(out, "{output}")?;
                        prefix = output;
                    }
                    Err(e) => {
                        writeln!(out, "command failed: {e:#}")?;
                        prefix.clear();
                    }
                }
                continue;
            }

            let reply = self.send(compose_prompt(&prefix, &text), out).await?;
            self.history.push(Message::new(Role::Assistant, reply));
        }

        info!(turns = self.history.len() / 2, "Chat session ended");
        Ok(())
    }

    async fn send<W: Write>(&mut self, prompt: String, out: &mut W) -> Result<String> {
        self.history.push(Message::new(Role::User, prompt));
        let decorate = !self.options.raw;
        writeln!(out)?;

        if self.options.stream {
            if decorate {
                writeln!(out, "{ASSISTANT_MARK}")?;
            }
            let mut fragments = self.backend.stream(&self.options.model, &self.history).await?;
            let mut reply = String::new();
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment?;
                write!(out, "{fragment}")?;
                out.flush()?;
                reply.push_str(&fragment);
            }
            writeln!(out)?;
            return Ok(reply);
        }

        let completion = self.backend.complete(&self.options.model, &self.history).await?;
        if decorate && self.options.kind == ModelKind::Reasoner {
            if let Some(reasoning) = &completion.reasoning {
                writeln!(out, "{REASONING_MARK}\n{reasoning}")?;
            }
        }
        if decorate {
            writeln!(out, "{ASSISTANT_MARK}")?;
        }
        writeln!(out, "{}", completion.content)?;
        Ok(completion.content)
    }
}
