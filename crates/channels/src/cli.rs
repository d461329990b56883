//! CLI channel: interactive terminal chat.
//!
//! Reads turns from stdin and prints replies to stdout. Used for
//! `steward agent` interactive mode. A few slash commands map to the
//! non-turn envelope types:
//!
//! | Input | Envelope |
//! |-------|----------|
//! | `/clear` | `clear` |
//! | `/tz <hours>` | `set_ts_offset` |
//! | `/image <path>` | `image` (file contents, base64) |
//! | `exit`, `quit`, `/exit`, `/quit`, `:q` | end of input |
//!
//! Images sent back by functions are written to the image directory.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use steward_core::channel::{Channel, InboundKind, InboundMessage, OutboundKind, OutboundMessage};
use steward_core::error::ChannelError;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

/// Identity of the local terminal user.
pub const CLI_USER_ID: &str = "local_user";

/// The single conversation of a terminal session.
pub const CLI_CHAT_ID: &str = "cli_session";

/// What one line of terminal input means.
#[derive(Debug, Clone, PartialEq)]
pub enum LineInput {
    /// Nothing to do (blank line)
    Skip,
    /// Stop reading input
    Quit,
    /// A ready-to-route message
    Message(InboundMessage),
    /// An image to be read from disk and sent
    ImageFile(PathBuf),
}

/// Interpret one line typed by the user. `seq` becomes the message id.
pub fn parse_line(line: &str, seq: u64) -> LineInput {
    let line = line.trim();
    if line.is_empty() {
        return LineInput::Skip;
    }
    if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
        return LineInput::Quit;
    }

    let (kind, content) = if line == "/clear" {
        (InboundKind::Clear, String::new())
    } else if let Some(hours) = line.strip_prefix("/tz ") {
        (InboundKind::SetTzOffset, hours.trim().to_string())
    } else if let Some(path) = line.strip_prefix("/image ") {
        return LineInput::ImageFile(PathBuf::from(path.trim()));
    } else {
        (InboundKind::Text, line.to_string())
    };

    LineInput::Message(envelope(kind, content, seq))
}

fn envelope(kind: InboundKind, content: String, seq: u64) -> InboundMessage {
    InboundMessage {
        user_id: CLI_USER_ID.into(),
        chat_id: CLI_CHAT_ID.into(),
        kind,
        content,
        message_id: Some(seq.to_string()),
    }
}

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    out: Mutex<Box<dyn Write + Send>>,
    image_dir: PathBuf,
    images_saved: AtomicU64,
    turn_end: Notify,
}

impl CliChannel {
    /// Print to stdout; images go to the system temp directory.
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()), std::env::temp_dir())
    }

    pub fn with_writer(out: Box<dyn Write + Send>, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            out: Mutex::new(out),
            image_dir: image_dir.into(),
            images_saved: AtomicU64::new(0),
            turn_end: Notify::new(),
        }
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Start reading stdin. The receiver closes on EOF or an exit command.
    pub fn start(&self) -> mpsc::Receiver<InboundMessage> {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let reader = BufReader::new(io::stdin());
            let mut lines = reader.lines();
            let mut seq = 0u64;

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                };

                seq += 1;
                let message = match parse_line(&line, seq) {
                    LineInput::Skip => continue,
                    LineInput::Quit => break,
                    LineInput::Message(message) => message,
                    LineInput::ImageFile(path) => match tokio::fs::read(&path).await {
                        Ok(bytes) => envelope(InboundKind::Image, BASE64_STANDARD.encode(bytes), seq),
                        Err(e) => {
                            eprintln!("Cannot read image {}: {e}", path.display());
                            continue;
                        }
                    },
                };

                if tx.send(message).await.is_err() {
                    break;
                }
            }
            debug!("CLI input closed");
        });

        rx
    }

    /// Wait until the current turn's end marker has been printed.
    pub async fn wait_turn_end(&self) {
        self.turn_end.notified().await;
    }

    fn write_line(&self, line: &str) -> Result<(), ChannelError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| ChannelError::ConnectionLost("output lock poisoned".into()))?;
        writeln!(out, "{line}")
            .and_then(|_| out.flush())
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: "cli".into(),
                reason: e.to_string(),
            })
    }

    async fn save_image(&self, message: &OutboundMessage) -> Result<PathBuf, ChannelError> {
        let bytes = BASE64_STANDARD
            .decode(message.content.trim())
            .map_err(|e| ChannelError::InvalidPayload(format!("image is not base64: {e}")))?;

        let n = self.images_saved.fetch_add(1, Ordering::SeqCst) + 1;
        let id = message.message_id.as_deref().unwrap_or("reply");
        let path = self.image_dir.join(format!("steward-{id}-{n}.png"));

        let saved = async {
            tokio::fs::create_dir_all(&self.image_dir).await?;
            tokio::fs::write(&path, bytes).await
        };
        saved.await.map_err(|e| ChannelError::DeliveryFailed {
            channel: "cli".into(),
            reason: format!("cannot save image: {e}"),
        })?;
        Ok(path)
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn emit(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        match message.kind {
            OutboundKind::Text | OutboundKind::Markdown => self.write_line(&message.content),
            OutboundKind::Notification => self.write_line(&format!("[{}]", message.content)),
            OutboundKind::Image => {
                let path = self.save_image(&message).await?;
                self.write_line(&format!("[image saved to {}]", path.display()))
            }
            OutboundKind::End => {
                self.turn_end.notify_one();
                Ok(())
            }
        }
    }
}
