use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single-device push notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    /// Key/value payload delivered to the app. FCM requires string values.
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendRequest<'a> {
    pub message: MessageBody<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageBody<'a> {
    pub token: &'a str,
    pub notification: Notification<'a>,
    pub data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification<'a> {
    pub title: &'a str,
    pub body: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendResponse {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorStatus {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
}
