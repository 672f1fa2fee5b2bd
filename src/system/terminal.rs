//! Terminal presentation: typewriter text, prompts and screen clearing.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::error::TerminalError;

/// Columns of left padding in front of every line.
pub const LEFT_PADDING: usize = 4;

/// ANSI sequence clearing the screen and homing the cursor.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Presentation surface the stages talk to.
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Print a paragraph followed by a blank line.
    async fn say(&self, text: &str) -> Result<(), TerminalError>;

    /// Show `label` and read one line of input, without the line ending.
    async fn prompt_line(&self, label: &str) -> Result<String, TerminalError>;

    async fn clear_screen(&self) -> Result<(), TerminalError>;

    /// Wait for the operator to press ENTER.
    async fn pause(&self, label: &str) -> Result<(), TerminalError> {
        self.prompt_line(label).await.map(|_| ())
    }
}

/// The process's own stdin/stdout.
pub struct ConsoleTerminal {
    delay: Duration,
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleTerminal {
    /// `delay` is the pause between characters of typewriter output.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl Terminal for ConsoleTerminal {
    async fn say(&self, text: &str) -> Result<(), TerminalError> {
        let mut out = tokio::io::stdout();
        let padding = " ".repeat(LEFT_PADDING);
        for line in text.lines() {
            out.write_all(padding.as_bytes()).await?;
            if self.delay.is_zero() {
                out.write_all(line.as_bytes()).await?;
            } else {
                let mut buf = [0u8; 4];
                for ch in line.chars() {
                    out.write_all(ch.encode_utf8(&mut buf).as_bytes()).await?;
                    out.flush().await?;
                    tokio::time::sleep(self.delay).await;
                }
            }
            out.write_all(b"\n").await?;
        }
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }

    async fn prompt_line(&self, label: &str) -> Result<String, TerminalError> {
        let mut out = tokio::io::stdout();
        out.write_all(" ".repeat(LEFT_PADDING).as_bytes()).await?;
        out.write_all(label.as_bytes()).await?;
        out.flush().await?;

        let mut lines = self.lines.lock().await;
        match lines.next_line().await? {
            Some(line) => Ok(line),
            None => Err(TerminalError::Closed(label.trim().to_string())),
        }
    }

    async fn clear_screen(&self) -> Result<(), TerminalError> {
        let mut out = tokio::io::stdout();
        out.write_all(CLEAR_SCREEN.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

/// Render each character of `text` as an 8-bit binary group.
pub fn to_binary(text: &str) -> String {
    text.bytes()
        .map(|b| format!("{b:08b}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Letters centred under the binary groups produced by [`to_binary`].
pub fn spaced_letters(text: &str) -> String {
    text.chars()
        .map(|c| format!("{c:^8}"))
        .collect::<Vec<_>>()
        .join(" ")
}
