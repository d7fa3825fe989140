//! 精簡的 FTP 用戶端: 控制連線收發、被動模式資料連線與目錄操作.

pub mod command;
mod control;
pub mod path;
pub mod reply;
pub mod session;

pub use command::FtpCommand;
pub use reply::{FtpReply, ReplyError};
pub use session::{FtpSession, SessionConfig, TransferStats};
