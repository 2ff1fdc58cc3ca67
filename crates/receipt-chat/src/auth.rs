use serde::Serialize;

/// Authorization states. Names match the TDLib-derived state machine this
/// manager's contract was distilled from (`wait_tdlib_parameters`,
/// `wait_encryption_key`, `wait_phone_number`, `wait_code`, `wait_password`,
/// `ready`, `closing`, `closed`, `logging_out`). `grammers-client`'s own
/// MTProto session establishment has no analogue for the first two states
/// (connection setup is implicit in `Client::connect`), so this manager
/// starts directly at `wait_phone_number` once connected and otherwise
/// reproduces the rest of the machine exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    WaitPhoneNumber,
    WaitCode,
    WaitPassword,
    Ready,
    Closing,
    Closed,
    LoggingOut,
    Unknown,
}

impl AuthState {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthState::Ready)
    }
}

/// Delivery metadata for the last sent login code, cached across
/// `wait_code` so `getAuthState` can return it without re-requesting.
#[derive(Debug, Clone, Serialize)]
pub struct CodeMeta {
    pub delivery_type: String,
    pub timeout_secs: u32,
}

/// Pure read of the manager's current auth state, the phone on file, the
/// authorized self-user (once known), and any cached code metadata.
#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    pub state: AuthState,
    pub raw_state: &'static str,
    pub is_authorized: bool,
    pub phone: Option<String>,
    pub user: Option<AuthenticatedUser>,
    pub code_meta: Option<CodeMeta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

impl AuthState {
    pub fn raw(&self) -> &'static str {
        match self {
            AuthState::WaitPhoneNumber => "wait_phone_number",
            AuthState::WaitCode => "wait_code",
            AuthState::WaitPassword => "wait_password",
            AuthState::Ready => "ready",
            AuthState::Closing => "closing",
            AuthState::Closed => "closed",
            AuthState::LoggingOut => "logging_out",
            AuthState::Unknown => "unknown",
        }
    }
}
