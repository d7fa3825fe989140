use crate::core::http as http_response;
use crate::core::{
    ConfigProvider, DirUploadReport, DownloadReceipt, FailedUpload, Storage, UploadReceipt,
};
use crate::ftp::{path, FtpSession, SessionConfig};
use crate::utils::error::{FtpError, Result};
use crate::utils::validation;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};
use walkdir::WalkDir;

/// 對外的 FTP 傳輸操作. 每個操作各自開一個會話, 結束前一定登出並關閉.
pub struct FtpTransfer<C: ConfigProvider, S: Storage> {
    config: C,
    storage: S,
}

/// 遠端檔案的位置: 所在目錄與檔名
struct RemoteFile {
    dir: String,
    name: String,
}

impl RemoteFile {
    fn full_path(&self) -> String {
        if self.dir.is_empty() {
            self.name.clone()
        } else {
            path::join_remote(&self.dir, &self.name)
        }
    }
}

// 單一檔案的失敗, 目錄上傳時記錄後繼續
fn is_file_level(error: &FtpError) -> bool {
    matches!(
        error,
        FtpError::CommandRejected { .. }
            | FtpError::RemoteDirCreateFailed { .. }
            | FtpError::InvalidConfigValueError { .. }
    )
}

fn local_not_found(error: FtpError, local_path: &str) -> FtpError {
    match error {
        FtpError::IoError(e) if e.kind() == std::io::ErrorKind::NotFound => {
            FtpError::LocalPathNotFound {
                path: local_path.to_string(),
            }
        }
        other => other,
    }
}

impl<C: ConfigProvider, S: Storage> FtpTransfer<C, S> {
    pub fn new(config: C, storage: S) -> Self {
        Self { config, storage }
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// 連線並登入, 呼叫端負責 `close`
    pub async fn connect(&self) -> Result<FtpSession> {
        let session_config = SessionConfig {
            host: self.config.host().to_string(),
            port: self.config.port(),
            username: self.config.username().to_string(),
            password: self.config.password().to_string(),
            connect_timeout: self.config.connect_timeout(),
        };

        match FtpSession::connect(&session_config).await {
            Ok(session) => {
                tracing::debug!(
                    "[ok] connect to ftp server {} (utf8: {})",
                    session.peer_addr(),
                    session.utf8_enabled()
                );
                Ok(session)
            }
            Err(e) => {
                tracing::error!("[failed] connect to ftp server ------->>> {}", e);
                Err(e)
            }
        }
    }

    /// 相對路徑接在遠端根目錄之下, 絕對路徑原樣使用
    fn resolve_remote(&self, remote_path: &str) -> Result<RemoteFile> {
        validation::validate_remote_path("remote_path", remote_path)?;
        let full = if path::is_absolute(remote_path) {
            remote_path.to_string()
        } else {
            path::join_remote(self.config.remote_dir(), remote_path)
        };
        let (dir, name) = path::split_parent(&full);
        Ok(RemoteFile {
            name: name.to_string(),
            dir,
        })
    }

    /// 相對目錄以登入後的工作目錄為基準換成絕對路徑.
    /// 同一會話內多次 CWD 之後, 相對路徑就不再指向同一處.
    async fn absolute_dir(session: &mut FtpSession, dir: &str) -> Result<String> {
        if path::is_absolute(dir) {
            return Ok(dir.to_string());
        }
        let home = session.pwd().await?;
        Ok(path::join_remote(&home, dir))
    }

    /// 切入檔案所在目錄, 並確認檔名出現在清單中
    async fn locate(session: &mut FtpSession, file: &RemoteFile) -> Result<()> {
        let not_found = || FtpError::RemoteFileNotFound {
            dir: file.dir.clone(),
            name: file.name.clone(),
        };

        if file.name.is_empty() {
            return Err(not_found());
        }
        if !file.dir.is_empty() && !session.cwd(&file.dir).await? {
            tracing::error!("[failed] remote directory does not exist ------->>> {}", file.dir);
            return Err(not_found());
        }

        let names = session.nlst(None).await?;
        if names.iter().any(|entry| path::file_name(entry) == file.name) {
            Ok(())
        } else {
            tracing::error!("[failed] file does not exist on server ------->>> {}", file.full_path());
            Err(not_found())
        }
    }

    async fn store_into<R>(
        session: &mut FtpSession,
        remote_dir: &str,
        file_name: &str,
        reader: &mut R,
    ) -> Result<UploadReceipt>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        session.ensure_dir(remote_dir).await?;
        let stats = session.store(file_name, reader).await?;
        Ok(UploadReceipt {
            remote_dir: remote_dir.to_string(),
            file_name: file_name.to_string(),
            bytes: stats.bytes,
            md5: stats.md5,
        })
    }

    /// 上傳到 `remote_dir/append_dir/file_name`, 缺少的遠端目錄會自動建立
    pub async fn upload_file<R>(
        &self,
        reader: &mut R,
        append_dir: &str,
        file_name: &str,
    ) -> Result<UploadReceipt>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        validation::validate_file_name("file_name", file_name)?;
        validation::validate_remote_path("append_dir", append_dir)?;
        let remote_dir = path::join_remote(self.config.remote_dir(), append_dir);

        let mut session = self.connect().await?;
        let result = async {
            let remote_dir = Self::absolute_dir(&mut session, &remote_dir).await?;
            Self::store_into(&mut session, &remote_dir, file_name, &mut *reader).await
        }
        .await;
        session.close().await;

        match &result {
            Ok(receipt) => tracing::info!(
                "[ok] upload file: {} -> {} ({} bytes)",
                file_name,
                receipt.remote_dir,
                receipt.bytes
            ),
            Err(e) => tracing::error!("[failed] upload file {} ------->>> {}", file_name, e),
        }
        result
    }

    /// 上傳本地檔案; 未指定遠端檔名時沿用本地檔名
    pub async fn upload_local_file(
        &self,
        local_path: &str,
        append_dir: &str,
        remote_name: Option<&str>,
    ) -> Result<UploadReceipt> {
        let file_name = match remote_name {
            Some(name) => name.to_string(),
            None => Path::new(local_path)
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| FtpError::InvalidConfigValueError {
                    field: "local_path".to_string(),
                    value: local_path.to_string(),
                    reason: "Cannot derive a UTF-8 file name".to_string(),
                })?,
        };

        let mut reader = self
            .storage
            .open_reader(local_path)
            .await
            .map_err(|e| local_not_found(e, local_path))?;
        self.upload_file(&mut reader, append_dir, &file_name).await
    }

    /// 上傳整個本地目錄. 預設所有檔案都放在同一個遠端目錄,
    /// `mirror_subdirs` 開啟時保留子目錄結構. 單檔失敗記錄在報告中並繼續.
    pub async fn upload_dir(&self, append_dir: &str, local_path: &str) -> Result<DirUploadReport> {
        let started_at = Utc::now();
        validation::validate_remote_path("append_dir", append_dir)?;
        let root = self.storage.resolve(local_path);
        if tokio::fs::metadata(&root).await.is_err() {
            tracing::error!("[failed] local path does not exist ------->>> {}", root.display());
            return Err(FtpError::LocalPathNotFound {
                path: root.display().to_string(),
            });
        }

        let remote_root = path::join_remote(self.config.remote_dir(), append_dir);
        let mirror = self.config.mirror_subdirs();
        tracing::info!(
            "📁 Uploading directory {} -> {} (mirror_subdirs: {})",
            root.display(),
            remote_root,
            mirror
        );

        let (files, mut failed) = collect_files(root.clone()).await?;

        let mut session = self.connect().await?;
        let result = async {
            let remote_root = Self::absolute_dir(&mut session, &remote_root).await?;
            let uploaded = self
                .upload_entries(&mut session, &root, &remote_root, mirror, files, &mut failed)
                .await?;
            Ok::<_, FtpError>((remote_root, uploaded))
        }
        .await;
        session.close().await;
        let (remote_root, uploaded) = result?;

        let report = DirUploadReport {
            local_root: root.display().to_string(),
            remote_dir: remote_root,
            uploaded,
            failed,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            "✅ Uploaded {} files ({} bytes), {} failed",
            report.uploaded.len(),
            report.total_bytes(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn upload_entries(
        &self,
        session: &mut FtpSession,
        root: &Path,
        remote_root: &str,
        mirror: bool,
        files: Vec<PathBuf>,
        failed: &mut Vec<FailedUpload>,
    ) -> Result<Vec<UploadReceipt>> {
        let mut uploaded = Vec::with_capacity(files.len());

        for file in files {
            let local_display = file.display().to_string();
            let mut record_failure = |reason: String| {
                tracing::error!("[failed] upload file {} ------->>> {}", local_display, reason);
                failed.push(FailedUpload {
                    local_path: local_display.clone(),
                    reason,
                });
            };

            let file_name = match file.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => {
                    record_failure("file name is not valid UTF-8".to_string());
                    continue;
                }
            };
            let remote_dir = if mirror {
                path::join_remote(remote_root, &relative_dir(root, &file))
            } else {
                remote_root.to_string()
            };

            let mut reader = match tokio::fs::File::open(&file).await {
                Ok(reader) => reader,
                Err(e) => {
                    record_failure(e.to_string());
                    continue;
                }
            };

            let stored = match validation::validate_file_name("file_name", &file_name) {
                Ok(()) => Self::store_into(session, &remote_dir, &file_name, &mut reader).await,
                Err(e) => Err(e),
            };
            match stored {
                Ok(receipt) => {
                    tracing::info!(
                        "[ok] upload file: {} -> {} ({} bytes)",
                        file.display(),
                        receipt.remote_dir,
                        receipt.bytes
                    );
                    uploaded.push(receipt);
                }
                Err(e) if is_file_level(&e) => record_failure(e.to_string()),
                Err(e) => return Err(e),
            }
        }

        Ok(uploaded)
    }

    /// 下載到本地目錄下的 `local_file_name`
    pub async fn download_to_local(
        &self,
        remote_file_name: &str,
        local_file_name: &str,
    ) -> Result<DownloadReceipt> {
        let file = self.resolve_remote(remote_file_name)?;
        let destination = self.storage.resolve(local_file_name);

        let mut session = self.connect().await?;
        let result = self
            .retrieve_to_storage(&mut session, &file, local_file_name)
            .await;
        session.close().await;

        match result {
            Ok(stats) => {
                tracing::info!(
                    "[ok] download file: {} -> {} ({} bytes)",
                    file.full_path(),
                    destination.display(),
                    stats.bytes
                );
                Ok(DownloadReceipt {
                    remote_path: file.full_path(),
                    destination: destination.display().to_string(),
                    bytes: stats.bytes,
                    md5: stats.md5,
                })
            }
            Err(e) => {
                tracing::error!("[failed] download file {} ------->>> {}", file.full_path(), e);
                Err(e)
            }
        }
    }

    async fn retrieve_to_storage(
        &self,
        session: &mut FtpSession,
        file: &RemoteFile,
        local_file_name: &str,
    ) -> Result<crate::ftp::TransferStats> {
        Self::locate(session, file).await?;

        let mut writer = self.storage.create_writer(local_file_name).await?;
        let result = session.retrieve(&file.name, &mut writer).await;
        drop(writer);

        if result.is_err() {
            // 不留下不完整的檔案
            if let Err(e) = tokio::fs::remove_file(self.storage.resolve(local_file_name)).await {
                tracing::debug!("remove partial file failed ------->>> {}", e);
            }
        }
        result
    }

    /// 下載到任意 AsyncWrite
    pub async fn download_to_writer<W>(
        &self,
        remote_file_name: &str,
        writer: &mut W,
    ) -> Result<DownloadReceipt>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let file = self.resolve_remote(remote_file_name)?;

        let mut session = self.connect().await?;
        let result = async {
            Self::locate(&mut session, &file).await?;
            session.retrieve(&file.name, &mut *writer).await
        }
        .await;
        session.close().await;

        match result {
            Ok(stats) => {
                tracing::info!("[ok] download file: {} ({} bytes)", file.full_path(), stats.bytes);
                Ok(DownloadReceipt {
                    remote_path: file.full_path(),
                    destination: "stream".to_string(),
                    bytes: stats.bytes,
                    md5: stats.md5,
                })
            }
            Err(e) => {
                tracing::error!("[failed] download file {} ------->>> {}", file.full_path(), e);
                Err(e)
            }
        }
    }

    /// 以 HTTP 回應送出遠端檔案. 回應標頭送出前失敗時,
    /// 路徑不合法回 400, 找不到檔案回 404, 其餘回 502.
    pub async fn download_to_http<W>(&self, remote_path: &str, writer: &mut W) -> Result<DownloadReceipt>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let file = match self.resolve_remote(remote_path) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("[failed] http download {:?} ------->>> {}", remote_path, e);
                Self::write_http_error(writer, ::http::StatusCode::BAD_REQUEST, &e).await;
                return Err(e);
            }
        };
        let mut head_sent = false;

        let result = async {
            let mut session = self.connect().await?;
            let streamed = Self::stream_http(&mut session, &file, &mut *writer, &mut head_sent).await;
            session.close().await;
            streamed
        }
        .await;

        match result {
            Ok(stats) => {
                tracing::info!("[ok] http download: {} ({} bytes)", file.full_path(), stats.bytes);
                Ok(DownloadReceipt {
                    remote_path: file.full_path(),
                    destination: "http".to_string(),
                    bytes: stats.bytes,
                    md5: stats.md5,
                })
            }
            Err(e) => {
                tracing::error!("[failed] http download {} ------->>> {}", file.full_path(), e);
                if !head_sent {
                    let status = if e.is_not_found() {
                        ::http::StatusCode::NOT_FOUND
                    } else {
                        ::http::StatusCode::BAD_GATEWAY
                    };
                    Self::write_http_error(writer, status, &e).await;
                }
                Err(e)
            }
        }
    }

    async fn write_http_error<W>(writer: &mut W, status: ::http::StatusCode, error: &FtpError)
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let response = http_response::text_response(status, &error.user_friendly_message());
        if let Err(write_err) = http_response::write_response(writer, &response).await {
            tracing::debug!("write error response failed ------->>> {}", write_err);
        }
    }

    async fn stream_http<W>(
        session: &mut FtpSession,
        file: &RemoteFile,
        writer: &mut W,
        head_sent: &mut bool,
    ) -> Result<crate::ftp::TransferStats>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        Self::locate(session, file).await?;
        let size = session.size(&file.name).await?;

        http_response::write_head(writer, &http_response::download_head(&file.name, size)).await?;
        *head_sent = true;

        session.retrieve(&file.name, writer).await
    }

    /// 讀取遠端檔案並以標準 Base64 (含補位, 不換行) 回傳
    pub async fn read_to_base64(&self, remote_file_name: &str) -> Result<String> {
        let mut buf = Vec::new();
        let receipt = self.download_to_writer(remote_file_name, &mut buf).await?;
        tracing::debug!("Encoding {} bytes of {} as base64", receipt.bytes, receipt.remote_path);
        Ok(general_purpose::STANDARD.encode(&buf))
    }

    /// 列出遠端根目錄 (或其下的子目錄) 的名稱
    pub async fn list_remote(&self, dir: Option<&str>) -> Result<Vec<String>> {
        if let Some(d) = dir {
            validation::validate_remote_path("dir", d)?;
        }
        let target = match dir {
            Some(d) if path::is_absolute(d) => d.to_string(),
            Some(d) => path::join_remote(self.config.remote_dir(), d),
            None => self.config.remote_dir().to_string(),
        };

        let mut session = self.connect().await?;
        let result = session
            .nlst((!target.is_empty()).then_some(target.as_str()))
            .await;
        session.close().await;

        if let Ok(names) = &result {
            tracing::debug!("Listed {} entries in {}", names.len(), target);
        }
        result
    }
}

/// 子目錄相對於根目錄的遠端表示 (`a/b`)
fn relative_dir(root: &Path, file: &Path) -> String {
    file.parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

/// 走訪本地目錄取得所有檔案, 無法讀取的項目記為失敗
async fn collect_files(root: PathBuf) -> Result<(Vec<PathBuf>, Vec<FailedUpload>)> {
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        let mut failed = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => {
                    let local_path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    tracing::warn!("skip unreadable entry {} ------->>> {}", local_path, e);
                    failed.push(FailedUpload {
                        local_path,
                        reason: e.to_string(),
                    });
                }
            }
        }
        (files, failed)
    })
    .await
    .map_err(|e| FtpError::IoError(std::io::Error::other(e)))
}
