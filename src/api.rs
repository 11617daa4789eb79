use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::{multipart, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{ImageAttachment, Note, NotePayload, Priority, RecordId};
use crate::error::ApiError;
use crate::interceptor::{default_chain, Alert, Exchange, InterceptorChain, Outcome, Severity};
use crate::notifier::AlertNotifier;
use crate::state::SessionHandle;

/// Client for the calendar notes REST API. Every call goes through the
/// interceptor chain; guest calls rely on the cookie jar for the guest id.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
    health_timeout: Duration,
    session: SessionHandle,
    chain: InterceptorChain,
    notifier: AlertNotifier,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserName {
    #[serde(default)]
    pub first: String,
    #[serde(default)]
    pub last: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default, alias = "_id")]
    pub id: RecordId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<UserName>,

    /// Everything else the server sends about the user.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl User {
    /// First name, else the local part of the email.
    pub fn display_name(&self) -> Option<String> {
        self.name
            .as_ref()
            .map(|n| n.first.clone())
            .filter(|n| !n.is_empty())
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
            })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    requires_password_reset: bool,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    LoggedIn { user: Option<User> },
    /// The account has a temporary password; no token was issued.
    PasswordResetRequired,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordChange<'a> {
    email: &'a str,
    new_password: &'a str,
}

impl ApiClient {
    pub fn new(cfg: &Config, session: SessionHandle) -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            base_url: normalize_base(&cfg.api_base_url),
            http,
            health_timeout: Duration::from_secs(cfg.health_timeout_secs),
            chain: default_chain(session.clone()),
            session,
            notifier: AlertNotifier::new(cfg.alert_webhook_url.clone()),
        })
    }

    /// Replaces the interceptor chain.
    pub fn with_chain(mut self, chain: InterceptorChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    fn builder(&self, method: Method, path: &str, auth: bool) -> RequestBuilder {
        let mut req = self.http.request(method, self.url(path));
        if auth {
            if let Some(token) = self.session.token() {
                req = req.bearer_auth(token);
            }
        }
        req
    }

    async fn call(&self, method: Method, path: &str, auth: bool) -> Result<Value> {
        let req = self.builder(method.clone(), path, auth);
        self.execute(method, path, req).await
    }

    async fn call_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        auth: bool,
    ) -> Result<Value> {
        let req = self.builder(method.clone(), path, auth).json(body);
        self.execute(method, path, req).await
    }

    async fn execute(&self, method: Method, path: &str, req: RequestBuilder) -> Result<Value> {
        let outcome = match req.send().await {
            Ok(resp) => {
                let status = resp.status();
                match resp.text().await {
                    Ok(body) => Outcome::Response { status, body },
                    Err(e) => Outcome::Transport {
                        timeout: e.is_timeout(),
                        message: e.to_string(),
                    },
                }
            }
            Err(e) => Outcome::Transport {
                timeout: e.is_timeout(),
                message: e.to_string(),
            },
        };

        let mut exchange = Exchange::new(method, path, outcome);
        let result = self.chain.run(&mut exchange);
        self.dispatch_alerts(&exchange.alerts).await;
        result?;

        Ok(match exchange.outcome {
            Outcome::Response { body, .. } => parse_body(&body),
            Outcome::Transport { .. } => Value::Null,
        })
    }

    async fn dispatch_alerts(&self, alerts: &[Alert]) {
        for alert in alerts {
            if alert.severity >= Severity::Error {
                warn!(code = %alert.code, severity = ?alert.severity, "alert: {}", alert.message);
            } else {
                info!(code = %alert.code, severity = ?alert.severity, "alert: {}", alert.message);
            }
            if let Err(e) = self.notifier.notify(alert).await {
                warn!(error = %e, "alert.notify_failed");
            }
        }
    }

    // ==================== auth ====================

    pub async fn register_user(&self, first: &str, last: &str, email: &str) -> Result<Value> {
        let body = json!({ "name": { "first": first, "last": last }, "email": email });
        self.call_json(Method::POST, "User/register", &body, false).await
    }

    /// Logs in and stores the token and user on success.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let body = json!({ "username": username, "password": password });
        let raw = self.call_json(Method::POST, "auth/login", &body, false).await?;
        let resp: LoginResponse = decode(raw)?;

        if resp.requires_password_reset {
            info!(username, "auth.password_reset_required");
            return Ok(LoginOutcome::PasswordResetRequired);
        }
        let token = resp
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::decode("login response has no token"))?;

        self.session.login(token, Some(username.to_string()))?;
        let user_id = resp
            .user
            .as_ref()
            .map(|u| u.id.clone())
            .filter(|id| !id.as_str().is_empty());
        self.session.set_user_id(user_id)?;
        info!(username, "auth.logged_in");
        Ok(LoginOutcome::LoggedIn { user: resp.user })
    }

    pub async fn change_password(&self, email: &str, new_password: &str) -> Result<Value> {
        let body = PasswordChange { email, new_password };
        self.call_json(Method::POST, "User/change-password?isNewPassword=true", &body, true)
            .await
    }

    /// Asks the server to mail a reset token. The body is the bare email.
    pub async fn reset_password(&self, email: &str) -> Result<Value> {
        self.call_json(Method::POST, "User/reset-password", email, false)
            .await
    }

    pub async fn verify_reset_token(&self, email: &str, token: &str) -> Result<Value> {
        let body = json!({ "email": email, "token": token });
        self.call_json(Method::POST, "User/verify-reset-token", &body, false)
            .await
    }

    /// Same endpoint as [`ApiClient::change_password`], sent without a token.
    pub async fn complete_password_reset(&self, email: &str, new_password: &str) -> Result<Value> {
        let body = PasswordChange { email, new_password };
        self.call_json(Method::POST, "User/change-password?isNewPassword=true", &body, false)
            .await
    }

    pub async fn current_user(&self) -> Result<User> {
        decode(self.call(Method::GET, "User/getLoggedInUser", true).await?)
    }

    // ==================== users ====================

    pub async fn users(&self) -> Result<Vec<User>> {
        decode_list(self.call(Method::GET, "user/users", true).await?)
    }

    pub async fn delete_user(&self, id: &RecordId) -> Result<()> {
        self.call(Method::DELETE, &format!("user/{id}"), true).await?;
        Ok(())
    }

    pub async fn update_user(&self, data: &Value) -> Result<Value> {
        self.call_json(Method::PUT, "User/update", data, true).await
    }

    // ==================== notes ====================

    /// The signed-in user's notes, or the guest's when there is no session.
    /// Dates come back as the server stored them.
    pub async fn notes(&self) -> Result<Vec<Note>> {
        let raw = match (self.session.is_authenticated(), self.session.user_id()) {
            (true, Some(id)) => self.call(Method::GET, &format!("Notes/{id}"), true).await?,
            _ => self.call(Method::GET, "Notes", false).await?,
        };
        decode_each(raw)
    }

    pub async fn add_note(&self, payload: &NotePayload) -> Result<Value> {
        let auth = self.session.is_authenticated();
        self.call_json(Method::POST, "Notes", payload, auth).await
    }

    /// Full update. `tz_offset_minutes` is the caller's current UTC offset;
    /// it is only used when the payload carries none.
    pub async fn update_note(
        &self,
        id: &RecordId,
        payload: &NotePayload,
        tz_offset_minutes: i32,
    ) -> Result<Value> {
        let mut body = payload.clone();
        body.user_id = None;
        body.tz_offset_minutes.get_or_insert(tz_offset_minutes);
        let auth = self.session.is_authenticated();
        self.call_json(Method::PUT, &format!("Notes/{id}"), &body, auth)
            .await
    }

    pub async fn delete_note(&self, id: &RecordId) -> Result<()> {
        let auth = self.session.is_authenticated();
        self.call(Method::DELETE, &format!("Notes/{id}"), auth).await?;
        Ok(())
    }

    /// `date` is a wire timestamp (`YYYY-MM-DDT12:00:00Z`).
    pub async fn update_note_date(&self, id: &RecordId, date: &str) -> Result<Value> {
        self.call_json(Method::PUT, &format!("Notes/{id}/date"), &json!({ "date": date }), true)
            .await
    }

    pub async fn set_pinned(&self, id: &RecordId, pinned: bool) -> Result<Value> {
        self.call_json(Method::PUT, &format!("Notes/{id}/pin"), &json!({ "pinned": pinned }), true)
            .await
    }

    pub async fn set_priority(&self, id: &RecordId, priority: Priority) -> Result<Value> {
        let body = json!({ "priority": priority });
        self.call_json(Method::PUT, &format!("Notes/{id}/priority"), &body, true)
            .await
    }

    pub async fn set_reminder(&self, id: &RecordId, reminder: bool) -> Result<Value> {
        let body = json!({ "reminder": reminder });
        self.call_json(Method::PUT, &format!("Notes/{id}/reminder"), &body, true)
            .await
    }

    /// Uploads an image file and returns the stored base64 form.
    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime: &str,
        note_id: Option<&RecordId>,
    ) -> Result<ImageAttachment> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let mut form = multipart::Form::new().part("file", part);
        if let Some(id) = note_id {
            form = form.text("noteId", id.to_string());
        }
        let req = self.builder(Method::POST, "Notes/upload", false).multipart(form);
        let raw = self.execute(Method::POST, "Notes/upload", req).await?;
        decode(raw)
    }

    pub async fn migrate_guest_notes(&self, user_id: &RecordId) -> Result<Value> {
        self.call(Method::PUT, &format!("Notes/migrate/{user_id}"), false)
            .await
    }

    pub async fn send_contact_message(&self, msg: &ContactMessage) -> Result<Value> {
        self.call_json(Method::POST, "email/contact-email", msg, false)
            .await
    }

    /// Pings the health endpoint. Bypasses the interceptor chain so a
    /// sleeping server does not raise alerts or end the session.
    pub async fn health(&self) -> bool {
        let resp = self
            .http
            .get(self.url("health"))
            .timeout(self.health_timeout)
            .send()
            .await;
        match resp {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                warn!(status = %r.status(), "api.health_degraded");
                false
            }
            Err(e) => {
                warn!(error = %e, "api.health_unreachable");
                false
            }
        }
    }
}

fn normalize_base(url: &str) -> String {
    format!("{}/", url.trim_end_matches('/'))
}

/// Success bodies may be empty or not JSON at all; both read as null.
fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or(Value::Null)
}

fn decode<T: DeserializeOwned>(raw: Value) -> Result<T> {
    serde_json::from_value(raw).map_err(|e| anyhow!(ApiError::decode(e.to_string())))
}

/// Null decodes as an empty list.
fn decode_list<T: DeserializeOwned>(raw: Value) -> Result<Vec<T>> {
    if raw.is_null() {
        return Ok(Vec::new());
    }
    decode(raw)
}

/// Like [`decode_list`], but an item that fails to decode is logged and
/// dropped instead of failing the whole list.
fn decode_each<T: DeserializeOwned>(raw: Value) -> Result<Vec<T>> {
    let items: Vec<Value> = decode_list(raw)?;
    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(index, error = %e, "api.item_skipped");
                None
            }
        })
        .collect())
}
