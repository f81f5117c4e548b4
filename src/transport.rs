use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Public Bot API host. Requests go to `{base}/bot{token}/{method}`.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Per-request timeout applied by the shared HTTP client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote operation names, as they appear in the URL path.
pub mod method {
    pub const GET_ME: &str = "getMe";
    pub const GET_UPDATES: &str = "getUpdates";
    pub const SEND_MESSAGE: &str = "sendMessage";
    pub const FORWARD_MESSAGE: &str = "forwardMessage";
    pub const COPY_MESSAGE: &str = "copyMessage";
    pub const SEND_PHOTO: &str = "sendPhoto";
    pub const SEND_AUDIO: &str = "sendAudio";
    pub const SEND_DOCUMENT: &str = "sendDocument";
    pub const SEND_VIDEO: &str = "sendVideo";
    pub const SEND_ANIMATION: &str = "sendAnimation";
    pub const SEND_VOICE: &str = "sendVoice";
    pub const SEND_VIDEO_NOTE: &str = "sendVideoNote";
    pub const SEND_MEDIA_GROUP: &str = "sendMediaGroup";
    pub const SEND_LOCATION: &str = "sendLocation";
    pub const EDIT_MESSAGE_LIVE_LOCATION: &str = "editMessageLiveLocation";
    pub const STOP_MESSAGE_LIVE_LOCATION: &str = "stopMessageLiveLocation";
    pub const SEND_VENUE: &str = "sendVenue";
    pub const SEND_CONTACT: &str = "sendContact";
    pub const SEND_POLL: &str = "sendPoll";
    pub const SEND_DICE: &str = "sendDice";
    pub const SEND_CHAT_ACTION: &str = "sendChatAction";
    pub const GET_USER_PROFILE_PHOTOS: &str = "getUserProfilePhotos";
    pub const GET_FILE: &str = "getFile";
    pub const KICK_CHAT_MEMBER: &str = "kickChatMember";
    pub const UNBAN_CHAT_MEMBER: &str = "unbanChatMember";
    pub const RESTRICT_CHAT_MEMBER: &str = "restrictChatMember";
    pub const PROMOTE_CHAT_MEMBER: &str = "promoteChatMember";
    pub const SET_CHAT_ADMINISTRATOR_CUSTOM_TITLE: &str = "setChatAdministratorCustomTitle";
    pub const SET_CHAT_PERMISSIONS: &str = "setChatPermissions";
    pub const EXPORT_CHAT_INVITE_LINK: &str = "exportChatInviteLink";
    pub const CREATE_CHAT_INVITE_LINK: &str = "createChatInviteLink";
    pub const EDIT_CHAT_INVITE_LINK: &str = "editChatInviteLink";
    pub const REVOKE_CHAT_INVITE_LINK: &str = "revokeChatInviteLink";
}

/// Raw HTTP exchange with the Bot API.
///
/// Cheap to clone: the underlying `reqwest::Client` pools connections and is
/// shared by every clone, including the ingestion task.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: Arc<str>,
    token: Arc<str>,
}

impl Transport {
    pub fn new(token: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, token, base_url))
    }

    pub fn with_client(client: Client, token: &str, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').into(),
            token: token.into(),
        }
    }

    pub fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Download URL for a `file_path` returned by `getFile`.
    pub fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.base_url,
            self.token,
            file_path.trim_start_matches('/')
        )
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub async fn get(&self, method: &str) -> Result<Bytes> {
        debug!("GET {}", method);
        let request = self
            .client
            .get(self.endpoint(method))
            .header(CONTENT_TYPE, "application/json");
        self.send(request).await
    }

    pub async fn get_with_query<Q>(&self, method: &str, query: &Q) -> Result<Bytes>
    where
        Q: Serialize + ?Sized,
    {
        debug!("GET {} (with query)", method);
        let request = self
            .client
            .get(self.endpoint(method))
            .header(CONTENT_TYPE, "application/json")
            .query(query);
        self.send(request).await
    }

    pub async fn post<P>(&self, payload: &P, method: &str) -> Result<Bytes>
    where
        P: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload).map_err(Error::Encode)?;
        debug!("POST {} ({} bytes)", method, body.len());
        let request = self
            .client
            .post(self.endpoint(method))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        self.send(request).await
    }

    /// Fetch the contents of a file previously resolved with getFile.
    pub async fn download(&self, file_path: &str) -> Result<Bytes> {
        debug!("GET file {}", file_path);
        self.send(self.client.get(self.file_url(file_path))).await
    }

    /// Send the request and drain the body. Anything but 200 is an error.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Bytes> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status != StatusCode::OK {
            return Err(Error::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(body)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{unreachable_url, MockResponse, MockServer};
    use serde_json::json;

    fn transport(base: &str) -> Transport {
        Transport::new("123:abc", base, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_endpoint_layout() {
        let t = transport("https://api.telegram.org/");
        assert_eq!(t.endpoint("getMe"), "https://api.telegram.org/bot123:abc/getMe");
        assert_eq!(
            t.file_url("/photos/file_0.jpg"),
            "https://api.telegram.org/file/bot123:abc/photos/file_0.jpg"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let t = transport(DEFAULT_API_URL);
        let printed = format!("{:?}", t);
        assert!(!printed.contains("123:abc"));
        assert!(printed.contains("redacted"));
    }

    #[tokio::test]
    async fn test_get_returns_raw_body() {
        let server = MockServer::start(vec![MockResponse::ok(json!({"id": 1}))]).await;
        let t = transport(&server.url());

        let body = t.get("getMe").await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["result"]["id"], 1);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, reqwest::Method::GET);
        assert_eq!(requests[0].path, "/bot123:abc/getMe");
        assert_eq!(requests[0].header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start(vec![]).await;
        let t = transport(&server.url());

        t.post(&json!({"chat_id": 7, "text": "hi"}), "sendMessage")
            .await
            .unwrap();

        let request = &server.requests()[0];
        assert_eq!(request.method, reqwest::Method::POST);
        assert_eq!(request.path, "/bot123:abc/sendMessage");
        assert_eq!(request.json(), json!({"chat_id": 7, "text": "hi"}));
    }

    #[tokio::test]
    async fn test_get_with_query_encodes_params() {
        let server = MockServer::start(vec![]).await;
        let t = transport(&server.url());

        t.get_with_query("getUpdates", &[("offset", 42)]).await.unwrap();
        assert_eq!(server.requests()[0].query.as_deref(), Some("offset=42"));
    }

    #[tokio::test]
    async fn test_non_200_is_status_error_regardless_of_body() {
        for status in [201u16, 400, 404, 500, 502] {
            let ok_body = json!({"ok": true, "result": true}).to_string();
            let server = MockServer::start(vec![MockResponse::status(status, &ok_body)]).await;
            let t = transport(&server.url());

            let err = t.get("getMe").await.unwrap_err();
            match err {
                Error::Status { status: got, body } => {
                    assert_eq!(got.as_u16(), status);
                    assert_eq!(body, ok_body);
                }
                other => panic!("expected status error for {}, got {:?}", status, other),
            }
        }
    }

    #[tokio::test]
    async fn test_download_uses_file_url() {
        let server =
            MockServer::start(vec![MockResponse::status(200, "raw file bytes")]).await;
        let t = transport(&server.url());

        let data = t.download("documents/file_3.pdf").await.unwrap();
        assert_eq!(&data[..], b"raw file bytes");
        assert_eq!(server.requests()[0].path, "/file/bot123:abc/documents/file_3.pdf");
    }

    #[tokio::test]
    async fn test_connection_failure_is_http_error() {
        let t = transport(&unreachable_url().await);
        let err = t.post(&json!({}), "getMe").await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
