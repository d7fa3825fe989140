pub mod http;
pub mod transfer;

pub use crate::domain::model::{DirUploadReport, DownloadReceipt, FailedUpload, UploadReceipt};
pub use crate::domain::ports::{ConfigProvider, Storage};
pub use crate::utils::error::Result;
pub use transfer::FtpTransfer;
