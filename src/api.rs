//! One method per remote operation.
//!
//! Every method follows the same steps: reject a payload that serializes to
//! `null` before touching the network, send it (as JSON, or as multipart when
//! a file is attached), then decode the response envelope into the
//! operation's result type.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::envelope;
use crate::error::{Error, Result};
use crate::multipart::InputFile;
use crate::transport::{method, Transport};
use crate::types::{
    ChatInviteLink, EditedMessage, File, Message, MessageId, User, UserProfilePhotos,
};

/// Multipart field carrying the file attached to sendMediaGroup. Reference it
/// from the `media` array as `attach://attachment`.
pub const MEDIA_GROUP_ATTACHMENT: &str = "attachment";

/// Result of [`Api::post_message`], shaped by the operation that ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Posted {
    Message(Box<Message>),
    MessageId(MessageId),
    Edited(EditedMessage),
    Flag(bool),
    ProfilePhotos(UserProfilePhotos),
    File(File),
    InviteLink(Box<ChatInviteLink>),
    Link(String),
}

fn require_payload<P>(method: &str, payload: &P) -> Result<Value>
where
    P: Serialize + ?Sized,
{
    let value = serde_json::to_value(payload).map_err(Error::Encode)?;
    if value.is_null() {
        return Err(Error::Validation(format!("{}: payload can't be null", method)));
    }
    Ok(value)
}

/// Typed access to the Bot API operations. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Api {
    transport: Transport,
}

impl Api {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    async fn call<P, T>(&self, method: &str, payload: &P) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = require_payload(method, payload)?;
        let response = self.transport.post(&body, method).await?;
        envelope::decode(method, &response)
    }

    async fn call_with_file<P, T>(
        &self,
        method: &str,
        field: &str,
        payload: &P,
        file: Option<InputFile>,
    ) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = require_payload(method, payload)?;
        let response = match file {
            Some(file) => {
                debug!("{}: uploading {} as '{}'", method, file.name(), field);
                self.transport.upload(file, method, field, &body).await?
            }
            None => self.transport.post(&body, method).await?,
        };
        envelope::decode(method, &response)
    }

    /// Basic information about the bot itself.
    pub async fn get_me(&self) -> Result<User> {
        let response = self.transport.get(method::GET_ME).await?;
        envelope::decode(method::GET_ME, &response)
    }

    pub async fn send_message<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Message> {
        self.call(method::SEND_MESSAGE, payload).await
    }

    pub async fn forward_message<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Message> {
        self.call(method::FORWARD_MESSAGE, payload).await
    }

    /// Like forwarding, without the link back to the original.
    pub async fn copy_message<P: Serialize + ?Sized>(&self, payload: &P) -> Result<MessageId> {
        self.call(method::COPY_MESSAGE, payload).await
    }

    // ── Media ──────────────────────────────────────────────────────────────
    //
    // Pass `file: None` to send by file_id or URL (set in the payload), or a
    // local file to upload it.

    pub async fn send_photo<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        file: Option<InputFile>,
    ) -> Result<Message> {
        self.call_with_file(method::SEND_PHOTO, "photo", payload, file)
            .await
    }

    pub async fn send_audio<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        file: Option<InputFile>,
    ) -> Result<Message> {
        self.call_with_file(method::SEND_AUDIO, "audio", payload, file)
            .await
    }

    pub async fn send_document<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        file: Option<InputFile>,
    ) -> Result<Message> {
        self.call_with_file(method::SEND_DOCUMENT, "document", payload, file)
            .await
    }

    pub async fn send_video<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        file: Option<InputFile>,
    ) -> Result<Message> {
        self.call_with_file(method::SEND_VIDEO, "video", payload, file)
            .await
    }

    pub async fn send_animation<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        file: Option<InputFile>,
    ) -> Result<Message> {
        self.call_with_file(method::SEND_ANIMATION, "animation", payload, file)
            .await
    }

    pub async fn send_voice<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        file: Option<InputFile>,
    ) -> Result<Message> {
        self.call_with_file(method::SEND_VOICE, "voice", payload, file)
            .await
    }

    pub async fn send_video_note<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        file: Option<InputFile>,
    ) -> Result<Message> {
        self.call_with_file(method::SEND_VIDEO_NOTE, "video_note", payload, file)
            .await
    }

    /// The attached file, if any, is sent as [`MEDIA_GROUP_ATTACHMENT`].
    pub async fn send_media_group<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        file: Option<InputFile>,
    ) -> Result<Vec<Message>> {
        self.call_with_file(method::SEND_MEDIA_GROUP, MEDIA_GROUP_ATTACHMENT, payload, file)
            .await
    }

    // ── Locations, venues, contacts, polls ─────────────────────────────────

    pub async fn send_location<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Message> {
        self.call(method::SEND_LOCATION, payload).await
    }

    pub async fn edit_message_live_location<P: Serialize + ?Sized>(
        &self,
        payload: &P,
    ) -> Result<EditedMessage> {
        self.call(method::EDIT_MESSAGE_LIVE_LOCATION, payload).await
    }

    pub async fn stop_message_live_location<P: Serialize + ?Sized>(
        &self,
        payload: &P,
    ) -> Result<EditedMessage> {
        self.call(method::STOP_MESSAGE_LIVE_LOCATION, payload).await
    }

    pub async fn send_venue<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Message> {
        self.call(method::SEND_VENUE, payload).await
    }

    pub async fn send_contact<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Message> {
        self.call(method::SEND_CONTACT, payload).await
    }

    pub async fn send_poll<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Message> {
        self.call(method::SEND_POLL, payload).await
    }

    pub async fn send_dice<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Message> {
        self.call(method::SEND_DICE, payload).await
    }

    /// "typing…" and friends. Lasts about five seconds on the client side.
    pub async fn send_chat_action<P: Serialize + ?Sized>(&self, payload: &P) -> Result<bool> {
        self.call(method::SEND_CHAT_ACTION, payload).await
    }

    // ── Users and files ────────────────────────────────────────────────────

    pub async fn get_user_profile_photos<P: Serialize + ?Sized>(
        &self,
        payload: &P,
    ) -> Result<UserProfilePhotos> {
        self.call(method::GET_USER_PROFILE_PHOTOS, payload).await
    }

    /// Resolve a `file_id` to a downloadable `file_path`. Links stay valid
    /// for at least an hour; files up to 20 MB.
    pub async fn get_file<P: Serialize + ?Sized>(&self, payload: &P) -> Result<File> {
        self.call(method::GET_FILE, payload).await
    }

    /// Download a file by the `file_path` from [`Api::get_file`].
    pub async fn download_file(&self, file_path: &str) -> Result<Bytes> {
        if file_path.trim().is_empty() {
            return Err(Error::Validation("file_path can't be empty".to_string()));
        }
        self.transport.download(file_path).await
    }

    // ── Chat administration ────────────────────────────────────────────────

    pub async fn kick_chat_member<P: Serialize + ?Sized>(&self, payload: &P) -> Result<bool> {
        self.call(method::KICK_CHAT_MEMBER, payload).await
    }

    pub async fn unban_chat_member<P: Serialize + ?Sized>(&self, payload: &P) -> Result<bool> {
        self.call(method::UNBAN_CHAT_MEMBER, payload).await
    }

    pub async fn restrict_chat_member<P: Serialize + ?Sized>(&self, payload: &P) -> Result<bool> {
        self.call(method::RESTRICT_CHAT_MEMBER, payload).await
    }

    pub async fn promote_chat_member<P: Serialize + ?Sized>(&self, payload: &P) -> Result<bool> {
        self.call(method::PROMOTE_CHAT_MEMBER, payload).await
    }

    pub async fn set_chat_administrator_custom_title<P: Serialize + ?Sized>(
        &self,
        payload: &P,
    ) -> Result<bool> {
        self.call(method::SET_CHAT_ADMINISTRATOR_CUSTOM_TITLE, payload)
            .await
    }

    pub async fn set_chat_permissions<P: Serialize + ?Sized>(&self, payload: &P) -> Result<bool> {
        self.call(method::SET_CHAT_PERMISSIONS, payload).await
    }

    /// Replaces the primary invite link; returns the new one.
    pub async fn export_chat_invite_link<P: Serialize + ?Sized>(
        &self,
        payload: &P,
    ) -> Result<String> {
        self.call(method::EXPORT_CHAT_INVITE_LINK, payload).await
    }

    pub async fn create_chat_invite_link<P: Serialize + ?Sized>(
        &self,
        payload: &P,
    ) -> Result<ChatInviteLink> {
        self.call(method::CREATE_CHAT_INVITE_LINK, payload).await
    }

    pub async fn edit_chat_invite_link<P: Serialize + ?Sized>(
        &self,
        payload: &P,
    ) -> Result<ChatInviteLink> {
        self.call(method::EDIT_CHAT_INVITE_LINK, payload).await
    }

    pub async fn revoke_chat_invite_link<P: Serialize + ?Sized>(
        &self,
        payload: &P,
    ) -> Result<ChatInviteLink> {
        self.call(method::REVOKE_CHAT_INVITE_LINK, payload).await
    }

    /// Run any JSON-only operation by its remote name.
    ///
    /// Useful when the method is only known at runtime. Operations that take
    /// a file, and names this crate doesn't know, fail with
    /// `Error::UnknownMethod` without sending anything.
    pub async fn post_message<P: Serialize + ?Sized>(
        &self,
        method_name: &str,
        payload: &P,
    ) -> Result<Posted> {
        let posted = match method_name {
            method::SEND_MESSAGE => Posted::Message(Box::new(self.send_message(payload).await?)),
            method::FORWARD_MESSAGE => {
                Posted::Message(Box::new(self.forward_message(payload).await?))
            }
            method::COPY_MESSAGE => Posted::MessageId(self.copy_message(payload).await?),
            method::SEND_LOCATION => Posted::Message(Box::new(self.send_location(payload).await?)),
            method::EDIT_MESSAGE_LIVE_LOCATION => {
                Posted::Edited(self.edit_message_live_location(payload).await?)
            }
            method::STOP_MESSAGE_LIVE_LOCATION => {
                Posted::Edited(self.stop_message_live_location(payload).await?)
            }
            method::SEND_VENUE => Posted::Message(Box::new(self.send_venue(payload).await?)),
            method::SEND_CONTACT => Posted::Message(Box::new(self.send_contact(payload).await?)),
            method::SEND_POLL => Posted::Message(Box::new(self.send_poll(payload).await?)),
            method::SEND_DICE => Posted::Message(Box::new(self.send_dice(payload).await?)),
            method::SEND_CHAT_ACTION => Posted::Flag(self.send_chat_action(payload).await?),
            method::GET_USER_PROFILE_PHOTOS => {
                Posted::ProfilePhotos(self.get_user_profile_photos(payload).await?)
            }
            method::GET_FILE => Posted::File(self.get_file(payload).await?),
            method::KICK_CHAT_MEMBER => Posted::Flag(self.kick_chat_member(payload).await?),
            method::UNBAN_CHAT_MEMBER => Posted::Flag(self.unban_chat_member(payload).await?),
            method::RESTRICT_CHAT_MEMBER => {
                Posted::Flag(self.restrict_chat_member(payload).await?)
            }
            method::PROMOTE_CHAT_MEMBER => Posted::Flag(self.promote_chat_member(payload).await?),
            method::SET_CHAT_ADMINISTRATOR_CUSTOM_TITLE => {
                Posted::Flag(self.set_chat_administrator_custom_title(payload).await?)
            }
            method::SET_CHAT_PERMISSIONS => {
                Posted::Flag(self.set_chat_permissions(payload).await?)
            }
            method::EXPORT_CHAT_INVITE_LINK => {
                Posted::Link(self.export_chat_invite_link(payload).await?)
            }
            method::CREATE_CHAT_INVITE_LINK => {
                Posted::InviteLink(Box::new(self.create_chat_invite_link(payload).await?))
            }
            method::EDIT_CHAT_INVITE_LINK => {
                Posted::InviteLink(Box::new(self.edit_chat_invite_link(payload).await?))
            }
            method::REVOKE_CHAT_INVITE_LINK => {
                Posted::InviteLink(Box::new(self.revoke_chat_invite_link(payload).await?))
            }
            other => return Err(Error::UnknownMethod(other.to_string())),
        };
        Ok(posted)
    }
}
