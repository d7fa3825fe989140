//! 與 FTP 無關的通用字串工具.

use regex::Regex;
use std::fmt::Display;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextError {
    #[error("unmatched braces in pattern at offset {0}")]
    UnmatchedBrace(usize),
    #[error("invalid argument index '{0}'")]
    InvalidArgumentIndex(String),
    #[error("invalid trim pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

fn int_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d|-)\d{0,9}$").expect("static regex"))
}

fn bool_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^(1|true)$").expect("static regex"))
}

/// 目前平台的換行符號
pub fn line_separator() -> &'static str {
    if cfg!(windows) {
        "\r\n"
    } else {
        "\n"
    }
}

pub fn trim(msg: Option<&str>) -> Option<&str> {
    msg.map(str::trim)
}

pub fn is_null_or_empty(s: Option<&str>) -> bool {
    s.map(|s| s.trim().is_empty()).unwrap_or(true)
}

/// 忽略大小寫比較; 左側缺值視為空字串, 右側缺值一律不相等
pub fn equals_ignore_case(a: Option<&str>, b: Option<&str>) -> bool {
    match b {
        Some(b) => {
            let a = a.unwrap_or("");
            a.chars().count() == b.chars().count()
                && a.chars().zip(b.chars()).all(|(x, y)| {
                    x == y || x.to_lowercase().eq(y.to_lowercase()) || x.to_uppercase().eq(y.to_uppercase())
                })
        }
        None => false,
    }
}

/// 字串轉整數, 格式不符或溢位時回傳 0
pub fn parse_int(num: Option<&str>) -> i32 {
    let num = match num {
        Some(n) if !n.trim().is_empty() => n,
        _ => return 0,
    };
    if !int_pattern().is_match(num) {
        return 0;
    }
    num.parse::<i32>().unwrap_or(0)
}

/// 只有 `1` 與 `true` (不分大小寫) 視為真
pub fn parse_bool(s: Option<&str>) -> bool {
    match s {
        Some(s) if !is_null_or_empty(Some(s)) => bool_pattern().is_match(s),
        _ => false,
    }
}

/// 串接後計算 MD5, 輸出 32 位小寫十六進位
pub fn md5_hex(parts: &[&str]) -> String {
    if parts.is_empty() {
        return String::new();
    }
    let mut context = md5::Context::new();
    for part in parts {
        context.consume(part.as_bytes());
    }
    format!("{:x}", context.compute())
}

pub fn md5_hex_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// 移除開頭重複出現的 pattern (正規表達式)
pub fn trim_start(s: &str, pattern: &str) -> Result<String, TextError> {
    let re = Regex::new(&format!("^(?:{})+", pattern))?;
    Ok(re.replace(s, "").into_owned())
}

/// 移除結尾重複出現的 pattern (正規表達式)
pub fn trim_end(s: &str, pattern: &str) -> Result<String, TextError> {
    let re = Regex::new(&format!("(?:{})+$", pattern))?;
    Ok(re.replace(s, "").into_owned())
}

/// 帳號末六碼改為 `xxxxxx`
pub fn mask_account(s: Option<&str>) -> Option<String> {
    let s = s.filter(|s| !s.trim().is_empty())?;
    let len = s.chars().count();
    if len > 6 {
        let kept: String = s.chars().take(len - 6).collect();
        Some(format!("{}xxxxxx", kept))
    } else {
        Some(s.to_string())
    }
}

/// 以 `{0}`、`{1}` 為佔位符格式化.
/// 單引號包住的內容原樣輸出, `''` 代表一個單引號; 沒有對應參數的佔位符保留原文.
pub fn format_message(pattern: &str, args: &[&dyn Display]) -> Result<String, TextError> {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.char_indices().peekable();
    let mut quoted = false;

    while let Some((offset, c)) = chars.next() {
        match c {
            '\'' => {
                if matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                    out.push('\'');
                } else {
                    quoted = !quoted;
                }
            }
            '{' if !quoted => {
                let mut index = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    index.push(c);
                }
                if !closed {
                    return Err(TextError::UnmatchedBrace(offset));
                }
                let trimmed = index.trim();
                let n: usize = trimmed
                    .parse()
                    .map_err(|_| TextError::InvalidArgumentIndex(trimmed.to_string()))?;
                match args.get(n) {
                    Some(arg) => out.push_str(&arg.to_string()),
                    None => {
                        out.push('{');
                        out.push_str(&index);
                        out.push('}');
                    }
                }
            }
            c => out.push(c),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_and_empty() {
        assert_eq!(trim(Some("  ftp  ")), Some("ftp"));
        assert_eq!(trim(None), None);
        assert!(is_null_or_empty(None));
        assert!(is_null_or_empty(Some("   ")));
        assert!(!is_null_or_empty(Some(" a ")));
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int(Some("42")), 42);
        assert_eq!(parse_int(Some("-7")), -7);
        assert_eq!(parse_int(Some("12a")), 0);
        assert_eq!(parse_int(Some("")), 0);
        assert_eq!(parse_int(None), 0);
        // 符合格式但超出 i32
        assert_eq!(parse_int(Some("9999999999")), 0);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(Some("1")));
        assert!(parse_bool(Some("TRUE")));
        assert!(parse_bool(Some("true")));
        assert!(!parse_bool(Some("yes")));
        assert!(!parse_bool(Some("0")));
        assert!(!parse_bool(None));
    }

    #[test]
    fn test_equals_ignore_case() {
        assert!(equals_ignore_case(Some("FTP"), Some("ftp")));
        assert!(equals_ignore_case(None, Some("")));
        assert!(!equals_ignore_case(None, None));
        assert!(!equals_ignore_case(Some("a"), None));
        assert!(!equals_ignore_case(Some("ab"), Some("a")));
    }

    #[test]
    fn test_md5() {
        assert_eq!(md5_hex(&[]), "");
        assert_eq!(md5_hex(&["abc"]), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(md5_hex(&["a", "bc"]), md5_hex(&["abc"]));
        assert_eq!(md5_hex_bytes(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_trim_pattern() {
        assert_eq!(trim_start("///upload/a/", "/").unwrap(), "upload/a/");
        assert_eq!(trim_end("/upload/a///", "/").unwrap(), "/upload/a");
        assert_eq!(trim_end("file.txt.bak.bak", r"\.bak").unwrap(), "file.txt");
        assert!(trim_start("abc", "(").is_err());
    }

    #[test]
    fn test_mask_account() {
        assert_eq!(mask_account(Some("6222021234567890")).as_deref(), Some("6222021234xxxxxx"));
        assert_eq!(mask_account(Some("123456")).as_deref(), Some("123456"));
        assert_eq!(mask_account(Some("  ")), None);
        assert_eq!(mask_account(None), None);
    }

    #[test]
    fn test_format_message() {
        let host = "ftp.example.com";
        let port = 21;
        assert_eq!(
            format_message("connect {0}:{1} failed", &[&host, &port]).unwrap(),
            "connect ftp.example.com:21 failed"
        );
        assert_eq!(
            format_message("'{0}' is literal, it''s {0}", &[&"x"]).unwrap(),
            "{0} is literal, it's x"
        );
        assert_eq!(format_message("missing {3}", &[&1]).unwrap(), "missing {3}");
        assert!(format_message("broken {0", &[&1]).is_err());
        assert!(format_message("bad {x}", &[&1]).is_err());
    }

    #[test]
    fn test_line_separator() {
        assert!(line_separator().ends_with('\n'));
    }
}
