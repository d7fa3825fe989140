use crate::utils::error::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// 本地檔案存取, 路徑皆相對於本地根目錄
pub trait Storage: Send + Sync {
    type Reader: AsyncRead + Unpin + Send;
    type Writer: AsyncWrite + Unpin + Send;

    fn resolve(&self, path: &str) -> PathBuf;
    fn open_reader(&self, path: &str) -> impl std::future::Future<Output = Result<Self::Reader>> + Send;
    fn create_writer(&self, path: &str) -> impl std::future::Future<Output = Result<Self::Writer>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn host(&self) -> &str;
    fn port(&self) -> u16;
    fn username(&self) -> &str;
    fn password(&self) -> &str;
    fn remote_dir(&self) -> &str;
    fn local_dir(&self) -> &str;
    fn connect_timeout(&self) -> Duration;
    fn mirror_subdirs(&self) -> bool;
}
