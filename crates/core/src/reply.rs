//! Reply capability handed to the agent and to function handlers.
//!
//! Every operation targets the turn currently being answered. Outside of a
//! turn there is nobody to answer, and each operation fails with
//! [`ReplyError::Reset`].

use async_trait::async_trait;
use crate::error::ReplyError;

/// The four ways to talk back to the user during a turn.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    async fn reply_text(&self, text: &str) -> std::result::Result<(), ReplyError>;

    async fn reply_markdown(&self, markdown: &str) -> std::result::Result<(), ReplyError>;

    /// Send an image, given as base64-encoded bytes.
    async fn reply_image(&self, base64: &str) -> std::result::Result<(), ReplyError>;

    /// Out-of-band status line (e.g. "Executing function: ...").
    async fn push_notification(&self, text: &str) -> std::result::Result<(), ReplyError>;
}

/// What a function handler can see of the session that invoked it.
pub trait CallerContext: ReplyChannel {
    /// The session's UTC offset in hours.
    fn tz_offset(&self) -> i32;

    /// The last image the user sent in this session, base64-encoded.
    fn last_image(&self) -> Option<String>;
}
