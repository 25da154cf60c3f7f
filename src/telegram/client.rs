use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use grammers_client::types::{Downloadable, Media, Message};
use grammers_client::{Client, Config as GrammersConfig, InitParams};
use grammers_session::{PackedChat, Session};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{DownloadProgress, FetchError, MediaKind, MessageSource, TelegramMessage};
use crate::config::TelegramCredentials;
use crate::link::{ChannelReference, MessageReference};

/// MTProto user client backed by a serialized session string
pub struct TelegramClient {
    client: Mutex<Option<Client>>,
    channels: Mutex<HashMap<i64, PackedChat>>,
}

impl TelegramClient {
    /// Connect using the session string produced by `tg2yt session`
    pub async fn connect(credentials: &TelegramCredentials) -> Result<Self, FetchError> {
        let session = decode_session(&credentials.session)?;

        tracing::info!("Connecting to Telegram...");
        let client = Client::connect(GrammersConfig {
            session,
            api_id: credentials.api_id,
            api_hash: credentials.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| FetchError::Connect(e.to_string()))?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(|e| FetchError::Connect(e.to_string()))?;
        if !authorized {
            return Err(FetchError::Unauthorized);
        }

        tracing::info!("Connection successful");
        Ok(Self {
            client: Mutex::new(Some(client)),
            channels: Mutex::new(HashMap::new()),
        })
    }

    async fn handle(&self) -> Result<Client, FetchError> {
        self.client
            .lock()
            .await
            .clone()
            .ok_or_else(|| FetchError::Connect("client already disconnected".to_string()))
    }

    /// Find the channel among the account's dialogs. Canonical links carry no
    /// access hash, so the dialog list is the only way to address the channel.
    async fn resolve_channel(&self, client: &Client, channel: &ChannelReference) -> Result<PackedChat, FetchError> {
        if let Some(packed) = self.channels.lock().await.get(&channel.reference()) {
            return Ok(packed.clone());
        }

        tracing::debug!("Resolving channel {} from dialogs", channel);
        let mut dialogs = client.iter_dialogs();
        while let Some(dialog) = dialogs
            .next()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?
        {
            let chat = dialog.chat();
            if chat.id() == channel.base_id() || chat.id() == channel.reference() {
                let packed = chat.pack();
                self.channels
                    .lock()
                    .await
                    .insert(channel.reference(), packed.clone());
                return Ok(packed);
            }
        }

        Err(FetchError::ChannelNotFound(channel.reference()))
    }
}

#[async_trait]
impl MessageSource for TelegramClient {
    async fn get_message(
        &self,
        reference: &MessageReference,
    ) -> Result<Option<Box<dyn TelegramMessage>>, FetchError> {
        let client = self.handle().await?;
        let chat = self.resolve_channel(&client, &reference.channel).await?;
        let message_id = i32::try_from(reference.message_id)
            .map_err(|_| FetchError::InvalidMessageId(reference.message_id))?;

        tracing::info!("Fetching message {} from chat {}...", message_id, reference.channel);
        let mut messages = client
            .get_messages_by_id(chat, &[message_id])
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let message = messages.pop().flatten();
        Ok(message.map(|message| Box::new(FetchedMessage::new(client, message)) as Box<dyn TelegramMessage>))
    }

    async fn disconnect(&self) {
        if self.client.lock().await.take().is_some() {
            tracing::info!("Disconnected from Telegram");
        }
    }
}

/// A message plus the client needed to download its media
struct FetchedMessage {
    client: Client,
    media: Option<Media>,
    kind: Option<MediaKind>,
    caption: Option<String>,
    filename: Option<String>,
    size: Option<u64>,
}

impl FetchedMessage {
    fn new(client: Client, message: Message) -> Self {
        let caption = Some(message.text().trim().to_string()).filter(|text| !text.is_empty());
        let media = message.media();

        let (kind, filename, size) = match &media {
            Some(Media::Document(document)) => {
                let is_video = document
                    .mime_type()
                    .map(|mime| mime.starts_with("video/"))
                    .unwrap_or(false);
                let name = Some(document.name().to_string()).filter(|name| !name.is_empty());
                let kind = if is_video { MediaKind::Video } else { MediaKind::Document };
                (Some(kind), name, u64::try_from(document.size()).ok())
            }
            Some(Media::Photo(_)) => (Some(MediaKind::Photo), None, None),
            Some(_) => (Some(MediaKind::Other), None, None),
            None => (None, None, None),
        };

        Self {
            client,
            media,
            kind,
            caption,
            filename,
            size,
        }
    }
}

#[async_trait]
impl TelegramMessage for FetchedMessage {
    fn media_kind(&self) -> Option<MediaKind> {
        self.kind
    }

    fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    fn declared_size(&self) -> Option<u64> {
        self.size
    }

    async fn download_to(&self, dest: &Path, progress: DownloadProgress<'_>) -> Result<u64, FetchError> {
        let media = self.media.clone().ok_or(FetchError::NoMedia)?;
        let total = self.size.unwrap_or(0);

        let mut file = tokio::fs::File::create(dest).await?;
        let mut download = self.client.iter_download(&Downloadable::Media(media));
        let mut transferred = 0u64;

        while let Some(chunk) = download
            .next()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            transferred += chunk.len() as u64;
            progress(transferred, total.max(transferred));
        }

        file.flush().await?;
        Ok(transferred)
    }
}

/// Decode a base64 session string into a grammers session
pub fn decode_session(encoded: &str) -> Result<Session, FetchError> {
    let trimmed = encoded.trim();
    let bytes = general_purpose::STANDARD
        .decode(trimmed)
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(trimmed))
        .map_err(|e| FetchError::InvalidSession(e.to_string()))?;

    Session::load(&bytes).map_err(|e| FetchError::InvalidSession(e.to_string()))
}

/// Encode a session for storage as a secret
pub fn encode_session(session: &Session) -> String {
    general_purpose::STANDARD.encode(session.save())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_session_is_rejected() {
        assert!(matches!(
            decode_session("not base64 at all!!"),
            Err(FetchError::InvalidSession(_))
        ));
    }
}
