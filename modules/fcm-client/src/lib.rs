pub mod error;
pub mod types;

use std::time::Duration;

pub use error::{FcmError, Result};
pub use types::PushMessage;

use types::{ErrorEnvelope, MessageBody, Notification, SendRequest, SendResponse};

const BASE_URL: &str = "https://fcm.googleapis.com/v1";

pub struct FcmClient {
    http: reqwest::Client,
    project_id: String,
    access_token: String,
    base_url: String,
}

impl FcmClient {
    /// `access_token` is an OAuth2 bearer token for the Firebase project's
    /// service account. `timeout` bounds each send end to end.
    pub fn new(project_id: String, access_token: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            project_id,
            access_token,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send one message. Returns the FCM message name on success.
    pub async fn send(&self, message: &PushMessage) -> Result<String> {
        let url = format!(
            "{}/projects/{}/messages:send",
            self.base_url, self.project_id
        );
        let request = SendRequest {
            message: MessageBody {
                token: &message.token,
                notification: Notification {
                    title: &message.title,
                    body: &message.body,
                },
                data: &message.data,
            },
        };

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err = classify_error(status.as_u16(), &body);
            tracing::debug!(status = status.as_u16(), error = %err, "FCM send rejected");
            return Err(err);
        }

        let sent: SendResponse = resp.json().await?;
        Ok(sent.name)
    }
}

/// Map an FCM error response onto `FcmError`, separating token rejections
/// from everything else.
pub fn classify_error(status: u16, body: &str) -> FcmError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return FcmError::Api {
            status,
            message: body.to_string(),
        };
    };
    let err = envelope.error;

    let code = err
        .details
        .iter()
        .find_map(|d| d.error_code.clone())
        .unwrap_or_else(|| err.status.clone());

    let token_rejected = match code.as_str() {
        "UNREGISTERED" => true,
        "INVALID_ARGUMENT" => err.message.to_lowercase().contains("registration token"),
        _ => false,
    };

    if token_rejected {
        FcmError::InvalidToken {
            code,
            message: err.message,
        }
    } else {
        FcmError::Api {
            status,
            message: format!("{code}: {}", err.message),
        }
    }
}
