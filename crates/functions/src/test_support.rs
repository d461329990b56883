//! Recording caller context shared by the function tests.

use async_trait::async_trait;
use std::sync::Mutex;
use steward_core::error::ReplyError;
use steward_core::reply::{CallerContext, ReplyChannel};

#[derive(Default)]
pub struct RecordingContext {
    pub texts: Mutex<Vec<String>>,
}

impl RecordingContext {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyChannel for RecordingContext {
    async fn reply_text(&self, text: &str) -> Result<(), ReplyError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn reply_markdown(&self, _markdown: &str) -> Result<(), ReplyError> {
        Ok(())
    }

    async fn reply_image(&self, _base64: &str) -> Result<(), ReplyError> {
        Ok(())
    }

    async fn push_notification(&self, _text: &str) -> Result<(), ReplyError> {
        Ok(())
    }
}

impl CallerContext for RecordingContext {
    fn tz_offset(&self) -> i32 {
        0
    }

    fn last_image(&self) -> Option<String> {
        None
    }
}
