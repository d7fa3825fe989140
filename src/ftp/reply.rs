use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("read failed: {0}")]
    ReadFailed(io::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("line too long")]
    LineTooLong,
    #[error("invalid line format")]
    InvalidLineFormat,
    #[error("invalid reply code {0}")]
    InvalidReplyCode(u16),
    #[error("line is not utf8")]
    LineIsNotUtf8,
    #[error("too many lines")]
    TooManyLines,
}

/// 伺服器回應: 三位數回應碼加上一或多行文字
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpReply {
    code: u16,
    lines: Vec<String>,
}

fn parse_code(line: &[u8]) -> Result<u16, ReplyError> {
    if line.len() < 3 || !line[..3].iter().all(u8::is_ascii_digit) {
        return Err(ReplyError::InvalidLineFormat);
    }
    let code = line[..3]
        .iter()
        .fold(0u16, |acc, c| acc * 10 + (c - b'0') as u16);
    if !(100..600).contains(&code) {
        return Err(ReplyError::InvalidReplyCode(code));
    }
    Ok(code)
}

fn line_text(raw: &[u8]) -> Result<String, ReplyError> {
    let msg = std::str::from_utf8(raw).map_err(|_| ReplyError::LineIsNotUtf8)?;
    Ok(msg.trim_end().to_string())
}

/// 第一行的分隔字元決定單行或多行回應
pub(crate) enum FirstLine {
    Complete(FtpReply),
    Continued(MultiLineParser),
}

impl FtpReply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        FtpReply {
            code,
            lines: vec![text.into()],
        }
    }

    pub(crate) fn parse_first_line(line: &[u8]) -> Result<FirstLine, ReplyError> {
        let code = parse_code(line)?;
        match line.get(3) {
            None | Some(b'\r') | Some(b'\n') => Ok(FirstLine::Complete(FtpReply {
                code,
                lines: vec![String::new()],
            })),
            Some(b' ') => Ok(FirstLine::Complete(FtpReply {
                code,
                lines: vec![line_text(&line[4..])?],
            })),
            Some(b'-') => Ok(FirstLine::Continued(MultiLineParser {
                code,
                end_prefix: [line[0], line[1], line[2], b' '],
                lines: vec![line_text(&line[4..])?],
            })),
            Some(_) => Err(ReplyError::InvalidLineFormat),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn first_line(&self) -> &str {
        self.lines.first().map(|s| s.trim()).unwrap_or_default()
    }

    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_positive_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_positive_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    pub fn is_transient_negative(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_permanent_negative(&self) -> bool {
        (500..600).contains(&self.code)
    }

    /// 解析 `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
    pub fn parse_pasv_227(&self) -> Option<SocketAddr> {
        let line = self.lines.first()?;
        let inner = parenthesized(line)?;

        let a: Vec<&str> = inner.split(',').map(str::trim).collect();
        if a.len() != 6 {
            return None;
        }

        let h1 = u8::from_str(a[0]).ok()?;
        let h2 = u8::from_str(a[1]).ok()?;
        let h3 = u8::from_str(a[2]).ok()?;
        let h4 = u8::from_str(a[3]).ok()?;
        let p1 = u8::from_str(a[4]).ok()?;
        let p2 = u8::from_str(a[5]).ok()?;

        let ip = IpAddr::V4(Ipv4Addr::new(h1, h2, h3, h4));
        let port = ((p1 as u16) << 8) + (p2 as u16);
        Some(SocketAddr::new(ip, port))
    }

    /// 解析 `229 Entering Extended Passive Mode (|||port|)`
    pub fn parse_epsv_229(&self) -> Option<u16> {
        let line = self.lines.first()?;
        let inner = parenthesized(line)?;
        let port = inner.strip_prefix("|||")?.strip_suffix('|')?;
        u16::from_str(port).ok()
    }

    /// 解析 `257 "/current/dir" ...`, 內部的 `""` 代表一個引號
    pub fn parse_path_257(&self) -> Option<String> {
        let line = self.lines.first()?;
        let start = memchr::memchr(b'"', line.as_bytes())?;
        let mut path = String::new();
        let mut chars = line[start + 1..].chars().peekable();
        while let Some(c) = chars.next() {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    path.push('"');
                } else {
                    return Some(path);
                }
            } else {
                path.push(c);
            }
        }
        None
    }
}

fn parenthesized(line: &str) -> Option<&str> {
    let p_start = memchr::memchr(b'(', line.as_bytes())?;
    let p_end = memchr::memchr(b')', &line.as_bytes()[p_start..])? + p_start;
    Some(&line[p_start + 1..p_end])
}

pub(crate) struct MultiLineParser {
    code: u16,
    end_prefix: [u8; 4],
    lines: Vec<String>,
}

impl MultiLineParser {
    pub(crate) fn feed_line(&mut self, line: &[u8]) -> Result<bool, ReplyError> {
        if line.starts_with(&self.end_prefix) {
            self.lines.push(line_text(&line[4..])?);
            Ok(true)
        } else {
            // 中間行保留開頭空白
            self.lines.push(line_text(line)?);
            Ok(false)
        }
    }

    pub(crate) fn finish(self) -> FtpReply {
        FtpReply {
            code: self.code,
            lines: self.lines,
        }
    }
}
