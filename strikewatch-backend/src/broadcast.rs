use std::future::Future;
use std::sync::Arc;

use poise::serenity_prelude::{ChannelId, CreateAttachment, CreateMessage, Http};

use crate::error::StatusError;

/// File name used for banner attachments.
pub const IMAGE_NAME: &str = "status.png";

/// A finished status message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    /// PNG bytes
    Image(Vec<u8>),
}

/// Delivers status messages to chat destinations.
pub trait Broadcaster: Send + Sync + 'static {
    fn deliver(
        &self,
        channel_id: u64,
        payload: &Payload,
    ) -> impl Future<Output = Result<(), StatusError>> + Send;
}

/// Posts to Discord channels through the REST API.
pub struct DiscordBroadcaster {
    http: Arc<Http>,
}

impl DiscordBroadcaster {
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
        }
    }
}

impl Broadcaster for DiscordBroadcaster {
    async fn deliver(&self, channel_id: u64, payload: &Payload) -> Result<(), StatusError> {
        if channel_id == 0 {
            return Err(StatusError::DeliveryFailed {
                target: channel_id,
                message: "channel id must be non-zero".to_string(),
            });
        }

        let message = match payload {
            Payload::Text(text) => CreateMessage::new().content(text.clone()),
            Payload::Image(png) => {
                CreateMessage::new().add_file(CreateAttachment::bytes(png.clone(), IMAGE_NAME))
            }
        };

        ChannelId::new(channel_id)
            .send_message(&self.http, message)
            .await
            .map_err(|e| StatusError::DeliveryFailed {
                target: channel_id,
                message: e.to_string(),
            })?;
        Ok(())
    }
}
