use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

use super::command::{self, FtpCommand};
use super::reply::{FirstLine, FtpReply, ReplyError};

pub(crate) const DEFAULT_MAX_LINE_LEN: usize = 2048;
pub(crate) const DEFAULT_MAX_MULTI_LINES: usize = 128;

/// 控制連線: 一次送出一個指令, 讀回一個完整回應
pub(crate) struct ControlChannel<T>
where
    T: AsyncRead + AsyncWrite,
{
    stream: BufStream<T>,
    max_line_len: usize,
    max_multi_lines: usize,
}

impl<T> ControlChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: T) -> Self {
        ControlChannel {
            stream: BufStream::new(stream),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            max_multi_lines: DEFAULT_MAX_MULTI_LINES,
        }
    }

    pub(crate) async fn send_cmd(&mut self, cmd: FtpCommand, param: Option<&str>) -> io::Result<()> {
        match (cmd, param) {
            (FtpCommand::PASS, Some(_)) => tracing::trace!("> PASS ******"),
            (_, Some(param)) => tracing::trace!("> {} {}", cmd, param),
            (_, None) => tracing::trace!("> {}", cmd),
        }

        let buf = command::encode(cmd, param)?;
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<(), ReplyError> {
        buf.clear();

        let mut limited = (&mut self.stream).take(self.max_line_len as u64);
        let len = limited
            .read_until(b'\n', buf)
            .await
            .map_err(ReplyError::ReadFailed)?;
        match len {
            0 => Err(ReplyError::ConnectionClosed),
            _ if buf.last() != Some(&b'\n') => {
                if len >= self.max_line_len {
                    Err(ReplyError::LineTooLong)
                } else {
                    Err(ReplyError::ConnectionClosed)
                }
            }
            _ => {
                tracing::trace!("< {}", String::from_utf8_lossy(buf).trim_end());
                Ok(())
            }
        }
    }

    pub(crate) async fn read_reply(&mut self) -> Result<FtpReply, ReplyError> {
        let mut buf = Vec::<u8>::with_capacity(self.max_line_len);
        self.read_line(&mut buf).await?;

        match FtpReply::parse_first_line(&buf)? {
            FirstLine::Complete(reply) => Ok(reply),
            FirstLine::Continued(mut parser) => {
                for _i in 0..self.max_multi_lines {
                    self.read_line(&mut buf).await?;
                    if parser.feed_line(&buf)? {
                        return Ok(parser.finish());
                    }
                }
                Err(ReplyError::TooManyLines)
            }
        }
    }

    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
