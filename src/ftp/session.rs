use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::command::FtpCommand;
use super::control::ControlChannel;
use super::path;
use super::reply::FtpReply;
use crate::utils::error::{FtpError, Result};

const TRANSFER_BUFFER_SIZE: usize = 64 * 1024;
const MAX_QUIT_REPLIES: usize = 3;

/// 建立連線所需的參數
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
}

/// 單次傳輸的位元組數與 MD5
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    pub bytes: u64,
    pub md5: String,
}

/// 已登入、二進位模式、被動模式的 FTP 會話
pub struct FtpSession {
    control: ControlChannel<TcpStream>,
    peer: SocketAddr,
    utf8: bool,
}

impl FtpSession {
    /// 連線、讀取歡迎訊息、登入並切換為 UTF-8 與二進位傳輸.
    /// 逾時只涵蓋 TCP 連線與歡迎訊息.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let host = config.host.as_str();
        let port = config.port;

        let opened = tokio::time::timeout(config.connect_timeout, Self::open(host, port)).await;
        let (control, peer) = match opened {
            Ok(r) => r?,
            Err(_) => {
                return Err(FtpError::ConnectTimedOut {
                    host: host.to_string(),
                    port,
                    seconds: config.connect_timeout.as_secs(),
                })
            }
        };

        let mut session = FtpSession {
            control,
            peer,
            utf8: false,
        };

        if let Err(e) = session.setup(config).await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn open(host: &str, port: u16) -> Result<(ControlChannel<TcpStream>, SocketAddr)> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| FtpError::ConnectError {
                host: host.to_string(),
                port,
                reason: e.to_string(),
            })?;
        let peer = stream.peer_addr()?;
        let mut control = ControlChannel::new(stream);

        let mut greeting = control.read_reply().await?;
        // 120: 服務稍後就緒, 繼續等待 220
        while greeting.code() == 120 {
            greeting = control.read_reply().await?;
        }
        match greeting.code() {
            421 => Err(FtpError::ServiceNotAvailable {
                message: greeting.message(),
            }),
            _ if greeting.is_positive_completion() => {
                tracing::debug!("Greeting from {}: {}", peer, greeting.first_line());
                Ok((control, peer))
            }
            code => Err(FtpError::ConnectError {
                host: host.to_string(),
                port,
                reason: format!("unexpected greeting reply {}", code),
            }),
        }
    }

    async fn setup(&mut self, config: &SessionConfig) -> Result<()> {
        self.login(&config.username, &config.password).await?;
        self.utf8 = self.set_use_utf8().await?;
        self.set_binary().await?;
        Ok(())
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn utf8_enabled(&self) -> bool {
        self.utf8
    }

    async fn command(&mut self, cmd: FtpCommand, param: Option<&str>) -> Result<FtpReply> {
        self.control.send_cmd(cmd, param).await?;
        let reply = self.control.read_reply().await?;
        if reply.code() == 421 {
            return Err(FtpError::ServiceNotAvailable {
                message: reply.message(),
            });
        }
        Ok(reply)
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let mut reply = self.command(FtpCommand::USER, Some(username)).await?;
        if reply.code() == 331 {
            reply = self.command(FtpCommand::PASS, Some(password)).await?;
        }
        match reply.code() {
            230 | 202 => {
                tracing::debug!("Logged in as {}", username);
                Ok(())
            }
            500 | 501 | 503 => Err(FtpError::command_rejected(
                FtpCommand::USER,
                reply.code(),
                reply.message(),
            )),
            code => Err(FtpError::LoginRejected {
                username: username.to_string(),
                code,
            }),
        }
    }

    async fn set_use_utf8(&mut self) -> Result<bool> {
        let reply = self.command(FtpCommand::OPTS_UTF8_ON, None).await?;
        if reply.is_positive_completion() {
            Ok(true)
        } else {
            tracing::debug!(
                "Server declined OPTS UTF8 ON ({}), sending UTF-8 paths anyway",
                reply.code()
            );
            Ok(false)
        }
    }

    async fn set_binary(&mut self) -> Result<()> {
        let cmd = FtpCommand::TYPE_I;
        let reply = self.command(cmd, None).await?;
        if reply.is_positive_completion() {
            Ok(())
        } else {
            Err(FtpError::command_rejected(cmd, reply.code(), reply.message()))
        }
    }

    /// 切換工作目錄; 目錄不存在時回傳 false
    pub async fn cwd(&mut self, dir: &str) -> Result<bool> {
        let cmd = FtpCommand::CWD;
        let reply = self.command(cmd, Some(dir)).await?;
        match reply.code() {
            200 | 250 => Ok(true),
            450 | 550 | 553 => Ok(false),
            code => Err(FtpError::command_rejected(cmd, code, reply.message())),
        }
    }

    /// 建立目錄; 伺服器拒絕時回傳 false
    pub async fn mkd(&mut self, dir: &str) -> Result<bool> {
        let cmd = FtpCommand::MKD;
        let reply = self.command(cmd, Some(dir)).await?;
        match reply.code() {
            250 | 257 => Ok(true),
            450 | 521 | 550 | 553 => Ok(false),
            code => Err(FtpError::command_rejected(cmd, code, reply.message())),
        }
    }

    pub async fn pwd(&mut self) -> Result<String> {
        let cmd = FtpCommand::PWD;
        let reply = self.command(cmd, None).await?;
        if reply.code() != 257 {
            return Err(FtpError::command_rejected(cmd, reply.code(), reply.message()));
        }
        reply
            .parse_path_257()
            .ok_or_else(|| FtpError::command_rejected(cmd, reply.code(), reply.message()))
    }

    pub async fn size(&mut self, file: &str) -> Result<Option<u64>> {
        let cmd = FtpCommand::SIZE;
        let reply = self.command(cmd, Some(file)).await?;
        match reply.code() {
            213 => Ok(reply.first_line().parse::<u64>().ok()),
            450 | 500 | 501 | 502 | 504 | 550 => Ok(None),
            code => Err(FtpError::command_rejected(cmd, code, reply.message())),
        }
    }

    /// 確保遠端目錄存在並切換進去, 缺少的層級逐一建立
    pub async fn ensure_dir(&mut self, dir: &str) -> Result<()> {
        if path::segments(dir).is_empty() {
            if path::is_absolute(dir) && !self.cwd("/").await? {
                return Err(FtpError::RemoteDirCreateFailed {
                    path: "/".to_string(),
                });
            }
            return Ok(());
        }

        // 嘗試直接切入
        if self.cwd(dir).await? {
            return Ok(());
        }

        // 相對路徑會隨 CWD 改變, 先換成絕對路徑
        let full = if path::is_absolute(dir) {
            dir.to_string()
        } else {
            let base = self.pwd().await?;
            path::join_remote(&base, dir)
        };

        for prefix in path::prefixes(&full) {
            if self.cwd(&prefix).await? {
                continue;
            }
            if !self.mkd(&prefix).await? {
                tracing::error!("[failed] create remote directory: {}", prefix);
                return Err(FtpError::RemoteDirCreateFailed { path: prefix });
            }
            tracing::info!("[ok] created remote directory: {}", prefix);
        }

        if self.cwd(&full).await? {
            Ok(())
        } else {
            Err(FtpError::RemoteDirCreateFailed { path: full })
        }
    }

    async fn request_pasv(&mut self) -> Result<Option<SocketAddr>> {
        let cmd = FtpCommand::PASV;
        let reply = self.command(cmd, None).await?;
        match reply.code() {
            227 => {
                let mut addr = reply
                    .parse_pasv_227()
                    .ok_or_else(|| FtpError::InvalidPassiveReply(reply.message()))?;
                if addr.ip().is_unspecified() {
                    addr.set_ip(self.peer.ip());
                }
                Ok(Some(addr))
            }
            500 | 501 | 502 => Ok(None),
            code => Err(FtpError::command_rejected(cmd, code, reply.message())),
        }
    }

    async fn request_epsv(&mut self) -> Result<SocketAddr> {
        let cmd = FtpCommand::EPSV;
        let reply = self.command(cmd, None).await?;
        match reply.code() {
            229 => {
                let port = reply
                    .parse_epsv_229()
                    .ok_or_else(|| FtpError::InvalidPassiveReply(reply.message()))?;
                Ok(SocketAddr::new(self.peer.ip(), port))
            }
            code => Err(FtpError::command_rejected(cmd, code, reply.message())),
        }
    }

    /// 被動模式: 先問伺服器資料埠, 再由用戶端連過去
    async fn open_data_stream(&mut self) -> Result<TcpStream> {
        let pasv = if self.peer.is_ipv4() {
            self.request_pasv().await?
        } else {
            None
        };
        let addr = match pasv {
            Some(addr) => addr,
            None => self.request_epsv().await?,
        };

        tracing::debug!("Opening data connection to {}", addr);
        TcpStream::connect(addr)
            .await
            .map_err(|source| FtpError::DataConnectError { addr, source })
    }

    /// 送出傳輸指令並等待 1xx; 若伺服器直接回 2xx 代表沒有資料要傳
    async fn start_transfer(&mut self, cmd: FtpCommand, param: Option<&str>) -> Result<Option<FtpReply>> {
        let reply = self.command(cmd, param).await?;
        if reply.is_positive_preliminary() {
            Ok(None)
        } else if reply.is_positive_completion() {
            Ok(Some(reply))
        } else {
            Err(FtpError::command_rejected(cmd, reply.code(), reply.message()))
        }
    }

    async fn finish_transfer(&mut self, cmd: FtpCommand) -> Result<()> {
        let reply = self.control.read_reply().await?;
        if reply.is_positive_completion() {
            Ok(())
        } else {
            Err(FtpError::command_rejected(cmd, reply.code(), reply.message()))
        }
    }

    /// 列出目錄內的名稱; 目錄不存在或為空時回傳空清單
    pub async fn nlst(&mut self, dir: Option<&str>) -> Result<Vec<String>> {
        let cmd = FtpCommand::NLST;
        let data = self.open_data_stream().await?;

        let reply = self.command(cmd, dir).await?;
        match reply.code() {
            450 | 550 => {
                tracing::debug!("NLST {:?}: {}", dir, reply.first_line());
                return Ok(Vec::new());
            }
            _ if reply.is_positive_completion() => return Ok(Vec::new()),
            _ if reply.is_positive_preliminary() => {}
            code => return Err(FtpError::command_rejected(cmd, code, reply.message())),
        }

        let mut names = Vec::new();
        let mut lines = BufReader::new(data).lines();
        while let Some(line) = lines.next_line().await? {
            let name = line.trim_end_matches('\r');
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
        drop(lines);

        self.finish_transfer(cmd).await?;
        Ok(names)
    }

    /// 以目前工作目錄為基準上傳
    pub async fn store<R>(&mut self, file: &str, reader: &mut R) -> Result<TransferStats>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let cmd = FtpCommand::STOR;
        let mut data = self.open_data_stream().await?;
        if let Some(reply) = self.start_transfer(cmd, Some(file)).await? {
            return Err(FtpError::command_rejected(cmd, reply.code(), reply.message()));
        }

        let stats = pump(reader, &mut data).await?;
        data.shutdown().await?;
        drop(data);

        self.finish_transfer(cmd).await?;
        Ok(stats)
    }

    pub async fn retrieve<W>(&mut self, file: &str, writer: &mut W) -> Result<TransferStats>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let cmd = FtpCommand::RETR;
        let mut data = self.open_data_stream().await?;
        if let Some(reply) = self.start_transfer(cmd, Some(file)).await? {
            return Err(FtpError::command_rejected(cmd, reply.code(), reply.message()));
        }

        let stats = pump(&mut data, writer).await?;
        drop(data);

        self.finish_transfer(cmd).await?;
        Ok(stats)
    }

    async fn quit(&mut self) -> Result<()> {
        let mut reply = self.command(FtpCommand::QUIT, None).await?;
        // 中斷的傳輸可能還有 426/451 等回應排在 221 前面
        for _ in 0..MAX_QUIT_REPLIES {
            if reply.code() == 221
                || reply.is_positive_intermediate()
                || reply.is_permanent_negative()
            {
                break;
            }
            reply = self.control.read_reply().await?;
        }
        if reply.code() == 221 {
            Ok(())
        } else {
            Err(FtpError::command_rejected(
                FtpCommand::QUIT,
                reply.code(),
                reply.message(),
            ))
        }
    }

    /// 登出並關閉控制連線, 失敗只記錄不回傳
    pub async fn close(mut self) {
        if let Err(e) = self.quit().await {
            tracing::warn!("logout failed ------->>> {}", e);
        }
        if let Err(e) = self.control.shutdown().await {
            tracing::debug!("disconnect failed ------->>> {}", e);
        }
        tracing::debug!("Disconnected from {}", self.peer);
    }
}

async fn pump<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<TransferStats>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];
    let mut context = md5::Context::new();
    let mut bytes = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        context.consume(&buf[..n]);
        bytes += n as u64;
    }
    writer.flush().await?;

    Ok(TransferStats {
        bytes,
        md5: format!("{:x}", context.compute()),
    })
}
