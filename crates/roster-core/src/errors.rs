use crate::registry::AuthState;

/// Core error type.
///
/// Adapter crates map their failures into this type so the transport layer can
/// decide consistently between a caller mistake, a session problem and a
/// platform failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("platform error: {0}")]
    Platform(PlatformError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Authentication failures. Session state is preserved so the caller can retry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid code")]
    InvalidCode,

    #[error("code expired, request a new one")]
    CodeExpired,

    #[error("invalid two-factor password")]
    InvalidPassword,

    #[error("two-factor password required")]
    TwoFactorRequired,

    #[error("no session for this phone, request a code first")]
    SessionMissing,

    #[error("session is not authenticated")]
    NotAuthenticated,

    #[error("already authenticated")]
    AlreadyAuthenticated,

    #[error("operation not allowed in state {0}")]
    WrongState(AuthState),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("admin rights are required to list members")]
    AdminRequired,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NotFoundError {
    #[error("conversation {0} not found")]
    ConversationNotFound(i64),

    #[error("no completed parse result to export")]
    ResultNotFound,
}

/// Failures reported by a platform client.
///
/// `Transient` is the only per-item failure the aggregation engine absorbs;
/// everything else ends the operation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("phone code invalid")]
    InvalidCode,

    #[error("phone code expired")]
    CodeExpired,

    #[error("session password needed")]
    PasswordRequired,

    #[error("password hash invalid")]
    InvalidPassword,

    #[error("chat admin required")]
    AdminRequired,

    #[error("entity not found")]
    NotFound,

    #[error("transient lookup failure: {0}")]
    Transient(String),

    #[error("flood wait of {0}s")]
    FloodWait(u32),

    #[error("{0}")]
    Other(String),
}

impl From<PlatformError> for Error {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::InvalidCode => Error::Auth(AuthError::InvalidCode),
            PlatformError::CodeExpired => Error::Auth(AuthError::CodeExpired),
            PlatformError::PasswordRequired => Error::Auth(AuthError::TwoFactorRequired),
            PlatformError::InvalidPassword => Error::Auth(AuthError::InvalidPassword),
            PlatformError::AdminRequired => Error::Permission(PermissionError::AdminRequired),
            other => Error::Platform(other),
        }
    }
}

impl Error {
    /// Short machine-readable kind used by transports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Validation(_) => "validation",
            Error::Auth(_) => "auth",
            Error::Permission(_) => "permission",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Cancelled => "cancelled",
            Error::Platform(_) => "platform",
            Error::Io(_) | Error::Json(_) | Error::Csv(_) => "internal",
        }
    }
}
