use crate::ftp::reply::ReplyError;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FtpError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Control reply error: {0}")]
    ReplyError(#[from] ReplyError),

    #[error("Connect to {host}:{port} failed: {reason}")]
    ConnectError {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Connect to {host}:{port} timed out after {seconds}s")]
    ConnectTimedOut { host: String, port: u16, seconds: u64 },

    #[error("Service not available (421): {message}")]
    ServiceNotAvailable { message: String },

    #[error("Login rejected for user '{username}' (reply {code})")]
    LoginRejected { username: String, code: u16 },

    #[error("Command {command} rejected with reply {code}: {message}")]
    CommandRejected {
        command: String,
        code: u16,
        message: String,
    },

    #[error("Invalid passive mode reply: {0}")]
    InvalidPassiveReply(String),

    #[error("Data connection to {addr} failed: {source}")]
    DataConnectError {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote directory '{path}' could not be created")]
    RemoteDirCreateFailed { path: String },

    #[error("Remote file '{name}' not found in '{dir}'")]
    RemoteFileNotFound { dir: String, name: String },

    #[error("Local path '{path}' not found")]
    LocalPathNotFound { path: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid HTTP request: {message}")]
    HttpRequestError { message: String },
}

pub type Result<T> = std::result::Result<T, FtpError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Protocol,
    RemoteFile,
    LocalIo,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl FtpError {
    pub fn command_rejected(command: impl ToString, code: u16, message: impl Into<String>) -> Self {
        FtpError::CommandRejected {
            command: command.to_string(),
            code,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            FtpError::ConnectError { .. }
            | FtpError::ConnectTimedOut { .. }
            | FtpError::ServiceNotAvailable { .. }
            | FtpError::DataConnectError { .. } => ErrorCategory::Network,
            FtpError::ReplyError(_)
            | FtpError::LoginRejected { .. }
            | FtpError::CommandRejected { .. }
            | FtpError::InvalidPassiveReply(_)
            | FtpError::HttpRequestError { .. } => ErrorCategory::Protocol,
            FtpError::RemoteDirCreateFailed { .. } | FtpError::RemoteFileNotFound { .. } => {
                ErrorCategory::RemoteFile
            }
            FtpError::IoError(_)
            | FtpError::SerializationError(_)
            | FtpError::LocalPathNotFound { .. } => ErrorCategory::LocalIo,
            FtpError::ConfigError { .. }
            | FtpError::ConfigValidationError { .. }
            | FtpError::InvalidConfigValueError { .. }
            | FtpError::MissingConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            FtpError::HttpRequestError { .. } => ErrorSeverity::Low,
            FtpError::ConnectError { .. }
            | FtpError::ConnectTimedOut { .. }
            | FtpError::ServiceNotAvailable { .. }
            | FtpError::DataConnectError { .. } => ErrorSeverity::Medium,
            FtpError::ConfigError { .. }
            | FtpError::ConfigValidationError { .. }
            | FtpError::InvalidConfigValueError { .. }
            | FtpError::MissingConfigError { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FtpError::RemoteFileNotFound { .. } | FtpError::LocalPathNotFound { .. }
        )
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "檢查 FTP 主機、連接埠與網路連線後重試",
            ErrorCategory::Protocol => match self {
                FtpError::LoginRejected { .. } => "確認 FTP 帳號與密碼是否正確",
                _ => "以 --verbose 重新執行並檢查伺服器回應",
            },
            ErrorCategory::RemoteFile => "確認遠端目錄權限與檔案名稱",
            ErrorCategory::LocalIo => "確認本地路徑存在且具有讀寫權限",
            ErrorCategory::Configuration => "檢查設定檔或環境變數 (FTP_HOST, FTP_PORT ...)",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            FtpError::ConnectError { host, port, .. } | FtpError::ConnectTimedOut { host, port, .. } => {
                format!("無法連線到 FTP 伺服器 {}:{}", host, port)
            }
            FtpError::LoginRejected { username, .. } => format!("使用者 {} 登入失敗", username),
            FtpError::RemoteFileNotFound { dir, name } => {
                format!("遠端目錄 {} 下沒有 {}", dir, name)
            }
            FtpError::RemoteDirCreateFailed { path } => format!("無法建立遠端目錄 {}", path),
            FtpError::LocalPathNotFound { path } => format!("本地路徑 {} 不存在", path),
            other => other.to_string(),
        }
    }
}
