use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use grammers_client::{Client, Config, InitParams, SignInError, Update};
use grammers_session::Session;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{error, info, warn};

use receipt_core::types::{ChatId, ChatKind, MessageId};

use crate::auth::{AuthState, AuthStatus, AuthenticatedUser, CodeMeta};
use crate::error::ChatError;
use crate::types::{ChatDocument, ChatMessage, ChatSummary, ListChatsParams, ListChatsResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FILE_TIMEOUT: Duration = Duration::from_secs(60);
const HISTORY_BATCH_SIZE: usize = 100;
const FETCH_ALL_BATCH_CAP: usize = 400;

/// Token returned by `set_phone_number`, threaded into `check_code` the way
/// grammers's `request_login_code`/`sign_in` pair requires (unlike TDLib,
/// which keeps this implicitly in its own session state).
struct PendingLogin {
    token: grammers_client::types::LoginToken,
}

struct PendingPassword {
    token: grammers_client::types::PasswordToken,
}

/// Owns the one authenticated chat-platform session for this deployment.
/// Exclusive owner of the `grammers_client::Client` handle and of the
/// background update-receive task, per §5's ownership rule — external
/// callers only ever go through this struct's request/reply methods.
pub struct ChatSession {
    client: RwLock<Option<Client>>,
    auth_state: RwLock<AuthState>,
    phone: RwLock<Option<String>>,
    user: RwLock<Option<AuthenticatedUser>>,
    code_meta: RwLock<Option<CodeMeta>>,
    pending_login: Mutex<Option<PendingLogin>>,
    pending_password: Mutex<Option<PendingPassword>>,
    api_id: i32,
    api_hash: String,
    session_path: PathBuf,
    handlers: Mutex<Vec<mpsc::Sender<ChatMessage>>>,
}

impl ChatSession {
    pub fn new(api_id: i32, api_hash: String, session_path: PathBuf) -> Self {
        Self {
            client: RwLock::new(None),
            auth_state: RwLock::new(AuthState::WaitPhoneNumber),
            phone: RwLock::new(None),
            user: RwLock::new(None),
            code_meta: RwLock::new(None),
            pending_login: Mutex::new(None),
            pending_password: Mutex::new(None),
            api_id,
            api_hash,
            session_path,
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Establish the MTProto connection with exponential backoff, mirroring
    /// `ChannelManager::connect_with_backoff`: 5s, 10s, 20s... capped at
    /// 300s, up to 10 attempts, ±10% jitter derived from the clock rather
    /// than a `rand` dependency.
    pub async fn connect_with_backoff(self: &Arc<Self>) -> Result<(), ChatError> {
        let mut delay = Duration::from_secs(5);
        const MAX_DELAY: Duration = Duration::from_secs(300);
        const MAX_ATTEMPTS: u32 = 10;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.connect_once().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, error = %e, "chat session connect failed, backing off");
                    if attempt == MAX_ATTEMPTS {
                        return Err(e);
                    }
                    tokio::time::sleep(delay + jitter(delay)).await;
                    delay = (delay * 2).min(MAX_DELAY);
                }
            }
        }
        Err(ChatError::TransportUnavailable(
            "exhausted connection attempts".into(),
        ))
    }

    async fn connect_once(self: &Arc<Self>) -> Result<(), ChatError> {
        let session = Session::load_file_or_create(&self.session_path)
            .map_err(|e| ChatError::Invocation(e.to_string()))?;

        let config = Config {
            session,
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            params: InitParams::default(),
        };

        let client = Client::connect(config)
            .await
            .map_err(|e| ChatError::TransportUnavailable(e.to_string()))?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(|e| ChatError::Invocation(e.to_string()))?;

        *self.client.write().await = Some(client);
        *self.auth_state.write().await = if authorized {
            AuthState::Ready
        } else {
            AuthState::WaitPhoneNumber
        };

        if authorized {
            self.refresh_self_user().await?;
        }

        let weak_self = Arc::clone(self);
        tokio::spawn(async move {
            weak_self.run_update_loop().await;
        });

        Ok(())
    }

    /// Background receiver: the dedicated task §5 requires the manager
    /// to own exclusively. Failures are logged and the loop continues, per
    /// §4.1's failure semantics ("receiver-loop exceptions are logged and
    /// the loop continues").
    async fn run_update_loop(self: Arc<Self>) {
        loop {
            let update = {
                let guard = self.client.read().await;
                match guard.as_ref() {
                    Some(client) => client.next_update().await,
                    None => return,
                }
            };

            let update = match update {
                Ok(Some(update)) => update,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "chat session update loop error");
                    continue;
                }
            };

            if let Update::NewMessage(message) = update {
                let chat_message = format_message(&message);
                let handlers = self.handlers.lock().await;
                for tx in handlers.iter() {
                    let _ = tx.try_send(chat_message.clone());
                }
            }
        }
    }

    /// Registers an async handler invoked per inbound message. Handlers
    /// run concurrently off a bounded mpsc channel fed by the receive loop,
    /// matching §4.1's "must not block the receiver" requirement.
    pub async fn add_new_message_handler(&self) -> mpsc::Receiver<ChatMessage> {
        let (tx, rx) = mpsc::channel(256);
        self.handlers.lock().await.push(tx);
        rx
    }

    // ---- auth state machine -------------------------------------------------

    pub async fn get_auth_state(&self) -> AuthStatus {
        AuthStatus {
            state: *self.auth_state.read().await,
            raw_state: self.auth_state.read().await.raw(),
            is_authorized: self.auth_state.read().await.is_authorized(),
            phone: self.phone.read().await.clone(),
            user: self.user.read().await.clone(),
            code_meta: self.code_meta.read().await.clone(),
        }
    }

    pub async fn set_phone_number(&self, phone: String) -> Result<(), ChatError> {
        let guard = self.client.read().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ChatError::TransportUnavailable("client not connected".into()))?;

        let token = client
            .request_login_code(&phone)
            .await
            .map_err(|e| ChatError::AuthStepInvalid(e.to_string()))?;

        *self.phone.write().await = Some(phone);
        *self.code_meta.write().await = Some(CodeMeta {
            delivery_type: "app".into(),
            timeout_secs: 120,
        });
        *self.pending_login.lock().await = Some(PendingLogin { token });
        *self.auth_state.write().await = AuthState::WaitCode;
        Ok(())
    }

    pub async fn check_code(&self, code: String) -> Result<(), ChatError> {
        let guard = self.client.read().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ChatError::TransportUnavailable("client not connected".into()))?;

        let mut pending = self.pending_login.lock().await;
        let login = pending
            .take()
            .ok_or_else(|| ChatError::AuthStepInvalid("no pending login code".into()))?;

        match client.sign_in(&login.token, &code).await {
            Ok(_user) => {
                drop(pending);
                *self.auth_state.write().await = AuthState::Ready;
                self.refresh_self_user().await?;
                Ok(())
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                *self.pending_password.lock().await = Some(PendingPassword {
                    token: password_token,
                });
                *self.auth_state.write().await = AuthState::WaitPassword;
                Ok(())
            }
            Err(e) => {
                *pending = Some(login);
                Err(ChatError::AuthStepInvalid(e.to_string()))
            }
        }
    }

    pub async fn check_password(&self, password: String) -> Result<(), ChatError> {
        let guard = self.client.read().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ChatError::TransportUnavailable("client not connected".into()))?;

        let mut pending = self.pending_password.lock().await;
        let pw = pending
            .take()
            .ok_or_else(|| ChatError::AuthStepInvalid("no pending password step".into()))?;

        match client.check_password(pw.token.clone(), password.as_bytes()).await {
            Ok(_user) => {
                *self.auth_state.write().await = AuthState::Ready;
                self.refresh_self_user().await?;
                Ok(())
            }
            Err(e) => {
                *pending = Some(pw);
                Err(ChatError::AuthStepInvalid(e.to_string()))
            }
        }
    }

    pub async fn resend_code(&self) -> Result<(), ChatError> {
        let phone = self
            .phone
            .read()
            .await
            .clone()
            .ok_or_else(|| ChatError::AuthStepInvalid("no phone number on file".into()))?;
        self.set_phone_number(phone).await
    }

    pub async fn logout(&self) -> Result<(), ChatError> {
        *self.auth_state.write().await = AuthState::LoggingOut;
        let guard = self.client.read().await;
        if let Some(client) = guard.as_ref() {
            client
                .sign_out_disconnect()
                .await
                .map_err(|e| ChatError::Invocation(e.to_string()))?;
        }
        *self.auth_state.write().await = AuthState::Closed;
        *self.user.write().await = None;
        *self.phone.write().await = None;
        Ok(())
    }

    async fn refresh_self_user(&self) -> Result<(), ChatError> {
        let guard = self.client.read().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ChatError::TransportUnavailable("client not connected".into()))?;
        let me = client
            .get_me()
            .await
            .map_err(|e| ChatError::Invocation(e.to_string()))?;
        *self.user.write().await = Some(AuthenticatedUser {
            id: me.id(),
            first_name: me.first_name().unwrap_or_default().to_string(),
            username: me.username().map(|s| s.to_string()),
        });
        Ok(())
    }

    // ---- chat / message surface --------------------------------------------

    pub async fn list_chats(&self, params: ListChatsParams) -> Result<ListChatsResult, ChatError> {
        let guard = self.client.read().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ChatError::TransportUnavailable("client not connected".into()))?;

        let limit = params.limit.clamp(1, 500);
        let mut items = Vec::new();
        let mut dialogs = client.iter_dialogs();
        while let Some(dialog) = dialogs
            .next()
            .await
            .map_err(|e| ChatError::Invocation(e.to_string()))?
        {
            let chat = dialog.chat();
            if let Some(search) = &params.search {
                if !chat.name().to_lowercase().contains(&search.to_lowercase()) {
                    continue;
                }
            }
            let kind = map_chat_kind(chat);
            if let Some(allowed) = &params.allowed_types {
                if !allowed.contains(&kind) {
                    continue;
                }
            }
            items.push(ChatSummary {
                chat_id: ChatId(chat.id()),
                title: chat.name().to_string(),
                username: chat.username().map(|s| s.to_string()),
                kind,
                member_count: None,
                last_message: None,
                is_hidden: false,
            });
            if items.len() >= limit + params.offset {
                break;
            }
        }

        let total = items.len();
        let sliced = items.into_iter().skip(params.offset).take(limit).collect();
        Ok(ListChatsResult {
            total,
            items: sliced,
        })
    }

    pub async fn get_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<ChatMessage>, ChatError> {
        let guard = self.client.read().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ChatError::TransportUnavailable("client not connected".into()))?;
        let message = self.fetch_raw_message(client, chat_id, message_id).await?;
        Ok(message.as_ref().map(format_message))
    }

    /// Fetches the exact message addressed by `(chat_id, message_id)`, not
    /// just the newest one, by cursoring `iter_messages` to just past the
    /// target id and taking its head — the same pagination builder
    /// `get_messages` uses, pointed at a single id instead of a batch.
    async fn fetch_raw_message(
        &self,
        client: &Client,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<grammers_client::types::Message>, ChatError> {
        let chat = self
            .resolve_chat(client, chat_id)
            .await?
            .ok_or(ChatError::NotFound)?;

        let mut iter = client.iter_messages(&chat).max_id(message_id.0 + 1);
        let head = iter
            .next()
            .await
            .map_err(|e| ChatError::Invocation(e.to_string()))?;
        Ok(head.filter(|m| m.id() as i64 == message_id.0))
    }

    /// Newest-first history. When `fetch_all` is set, paginates with
    /// `from_id = oldest_id_of_prev_batch`, batch size 100, bounded by a
    /// 400-batch safety cap, terminating on an empty or short batch.
    pub async fn get_messages(
        &self,
        chat_id: ChatId,
        from_id: Option<MessageId>,
        limit: usize,
        fetch_all: bool,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let guard = self.client.read().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ChatError::TransportUnavailable("client not connected".into()))?;

        let chat = self
            .resolve_chat(client, chat_id)
            .await?
            .ok_or(ChatError::NotFound)?;

        let mut out = Vec::new();
        let mut cursor = from_id.map(|m| m.0);
        let mut batches = 0usize;

        loop {
            let mut iter = client.iter_messages(&chat).max_id(cursor.unwrap_or(0));
            let mut batch = Vec::new();
            while let Some(message) = iter
                .next()
                .await
                .map_err(|e| ChatError::Invocation(e.to_string()))?
            {
                batch.push(format_message(&message));
                if !fetch_all && batch.len() >= limit {
                    break;
                }
                if batch.len() >= HISTORY_BATCH_SIZE {
                    break;
                }
            }

            let batch_len = batch.len();
            let oldest = batch.last().map(|m| m.id.0);
            out.extend(batch);

            if !fetch_all {
                break;
            }
            batches += 1;
            if batch_len == 0 || batch_len < HISTORY_BATCH_SIZE || batches >= FETCH_ALL_BATCH_CAP
            {
                break;
            }
            cursor = oldest;
        }

        Ok(out)
    }

    pub async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<(), ChatError> {
        let guard = self.client.read().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ChatError::TransportUnavailable("client not connected".into()))?;
        let chat = self
            .resolve_chat(client, chat_id)
            .await?
            .ok_or(ChatError::NotFound)?;
        client
            .send_message(&chat, text)
            .await
            .map_err(|e| ChatError::Invocation(e.to_string()))?;
        Ok(())
    }

    pub async fn send_document(
        &self,
        chat_id: ChatId,
        local_path: &std::path::Path,
        caption: Option<&str>,
    ) -> Result<(), ChatError> {
        let guard = self.client.read().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ChatError::TransportUnavailable("client not connected".into()))?;
        let chat = self
            .resolve_chat(client, chat_id)
            .await?
            .ok_or(ChatError::NotFound)?;
        let uploaded = client
            .upload_file(local_path)
            .await
            .map_err(|e| ChatError::Invocation(e.to_string()))?;
        let mut message = grammers_client::InputMessage::text(caption.unwrap_or_default());
        message = message.document(uploaded);
        client
            .send_message(&chat, message)
            .await
            .map_err(|e| ChatError::Invocation(e.to_string()))?;
        Ok(())
    }

    /// Synchronous download, 60s timeout. Returns `None` if the timeout
    /// elapses before the download completes, matching §4.1's
    /// "still downloading" contract. `document.file_id` alone can't be
    /// redeemed for a transfer location, so the owning message is
    /// re-fetched to recover the live `Media` handle before downloading.
    pub async fn download_file(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        document: &ChatDocument,
    ) -> Result<Option<PathBuf>, ChatError> {
        let guard = self.client.read().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ChatError::TransportUnavailable("client not connected".into()))?;

        let message = self
            .fetch_raw_message(client, chat_id, message_id)
            .await?
            .ok_or(ChatError::NotFound)?;
        let media = message
            .document()
            .map(grammers_client::types::Media::Document)
            .ok_or_else(|| ChatError::Invocation("message no longer carries a document".into()))?;

        let dest = std::env::temp_dir().join(format!(
            "receipt-{}-{}",
            document.remote_id.clone().unwrap_or_default(),
            document.file_name.clone().unwrap_or_else(|| "file".into())
        ));

        let fut = client.download_media(&media, &dest);
        match tokio::time::timeout(FILE_TIMEOUT, fut).await {
            Ok(Ok(())) => Ok(Some(dest)),
            Ok(Err(e)) => Err(ChatError::Invocation(e.to_string())),
            Err(_) => Ok(None),
        }
    }

    async fn resolve_chat(
        &self,
        client: &Client,
        chat_id: ChatId,
    ) -> Result<Option<grammers_client::types::Chat>, ChatError> {
        match tokio::time::timeout(REQUEST_TIMEOUT, client.resolve_chat_id(chat_id.0)).await {
            Ok(Ok(chat)) => Ok(chat),
            Ok(Err(e)) => Err(ChatError::Invocation(e.to_string())),
            Err(_) => Err(ChatError::Timeout(REQUEST_TIMEOUT)),
        }
    }
}

fn map_chat_kind(chat: &grammers_client::types::Chat) -> ChatKind {
    use grammers_client::types::Chat;
    match chat {
        Chat::User(user) if user.is_bot() => ChatKind::Bot,
        Chat::User(_) => ChatKind::User,
        Chat::Group(_) => ChatKind::Group,
        Chat::Channel(channel) if channel.is_megagroup() => ChatKind::Supergroup,
        Chat::Channel(_) => ChatKind::Channel,
    }
}

fn format_message(message: &grammers_client::types::Message) -> ChatMessage {
    let document = message.document().map(|doc| ChatDocument {
        file_id: doc.id().to_string(),
        file_name: doc.name().map(|s| s.to_string()),
        mime_type: Some(doc.mime_type().to_string()),
        size: Some(doc.size() as i64),
        remote_id: Some(doc.id().to_string()),
        local_path: None,
    });

    ChatMessage {
        chat_id: ChatId(message.chat().id()),
        id: MessageId(message.id() as i64),
        date: message.date(),
        is_outgoing: message.outgoing(),
        sender_id: message.sender().map(|c| c.id()),
        text: message.text().to_string(),
        document,
    }
}

fn jitter(base: Duration) -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let pct = (nanos % 21) as i64 - 10; // -10%..=+10%
    let delta_ms = base.as_millis() as i64 * pct / 100;
    Duration::from_millis(delta_ms.unsigned_abs() as u64)
}
