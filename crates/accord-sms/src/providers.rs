use serde_json::Value;
use tracing::info;

use crate::{DeliveryError, digits_only};

/// One of the interchangeable SMS gateways. The verification service only
/// ever talks to [`crate::SmsGateway`]; swapping providers is a config
/// change, not a code change.
pub enum SmsProvider {
    Smsc {
        login: String,
        password: String,
        base_url: String,
    },
    Mobizon {
        api_key: String,
        base_url: String,
    },
    /// Logs the message instead of sending it. Development and tests only.
    Console,
    /// Scripted responses for gateway retry tests.
    #[cfg(test)]
    Script(std::sync::Mutex<Vec<Result<Option<String>, DeliveryError>>>),
    /// Never completes; exercises the per-attempt timeout.
    #[cfg(test)]
    Hang,
}

impl SmsProvider {
    pub fn smsc(login: String, password: String) -> Self {
        Self::Smsc {
            login,
            password,
            base_url: "https://smsc.kz/sys".to_string(),
        }
    }

    pub fn mobizon(api_key: String) -> Self {
        Self::Mobizon {
            api_key,
            base_url: "https://api.mobizon.kz".to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Smsc { .. } => "smsc",
            Self::Mobizon { .. } => "mobizon",
            Self::Console => "console",
            #[cfg(test)]
            Self::Script(_) => "script",
            #[cfg(test)]
            Self::Hang => "hang",
        }
    }

    /// One delivery attempt. Returns the provider message id, if any.
    pub async fn send(
        &self,
        http: &reqwest::Client,
        phone: &str,
        text: &str,
    ) -> Result<Option<String>, DeliveryError> {
        match self {
            Self::Smsc {
                login,
                password,
                base_url,
            } => {
                let phones = digits_only(phone);
                let resp = http
                    .get(format!("{base_url}/send.php"))
                    .query(&[
                        ("login", login.as_str()),
                        ("psw", password.as_str()),
                        ("phones", phones.as_str()),
                        ("mes", text),
                        ("fmt", "3"),
                        ("charset", "utf-8"),
                    ])
                    .send()
                    .await
                    .map_err(request_error)?;
                let body: Value = resp.json().await.map_err(request_error)?;
                parse_smsc_response(&body)
            }
            Self::Mobizon { api_key, base_url } => {
                let recipient = digits_only(phone);
                let resp = http
                    .get(format!("{base_url}/service/message/sendsmsmessage"))
                    .query(&[
                        ("recipient", recipient.as_str()),
                        ("text", text),
                        ("apiKey", api_key.as_str()),
                        ("output", "json"),
                    ])
                    .send()
                    .await
                    .map_err(request_error)?;
                if resp.status() == reqwest::StatusCode::UNAUTHORIZED
                    || resp.status() == reqwest::StatusCode::FORBIDDEN
                {
                    return Err(DeliveryError::Auth(format!(
                        "mobizon returned {}",
                        resp.status()
                    )));
                }
                let body: Value = resp.json().await.map_err(request_error)?;
                parse_mobizon_response(&body)
            }
            Self::Console => {
                info!("console sms to {}: {}", phone, text);
                Ok(None)
            }
            #[cfg(test)]
            Self::Script(responses) => responses
                .lock()
                .expect("script lock poisoned")
                .remove(0),
            #[cfg(test)]
            Self::Hang => std::future::pending().await,
        }
    }
}

fn request_error(e: reqwest::Error) -> DeliveryError {
    if e.is_timeout() {
        DeliveryError::Timeout
    } else {
        DeliveryError::Network(e.to_string())
    }
}

/// SMSC `fmt=3` responses: `{"id": N, "cnt": N}` on success,
/// `{"error": "...", "error_code": N}` on failure. Codes 2 (bad login) and
/// 4 (IP blocked) are credential/configuration faults.
fn parse_smsc_response(body: &Value) -> Result<Option<String>, DeliveryError> {
    if let Some(code) = body.get("error_code").and_then(Value::as_i64) {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return match code {
            2 | 4 => Err(DeliveryError::Auth(message)),
            _ => Err(DeliveryError::Rejected(message)),
        };
    }
    Ok(body.get("id").map(|id| id.to_string()))
}

/// Mobizon wraps everything in `{"code": N, "data": ..., "message": ...}`;
/// code 0 is success.
fn parse_mobizon_response(body: &Value) -> Result<Option<String>, DeliveryError> {
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(-1);
    if code == 0 {
        let message_id = body
            .pointer("/data/messageId")
            .map(|id| id.to_string().trim_matches('"').to_string());
        return Ok(message_id);
    }
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    Err(DeliveryError::Rejected(message))
}
