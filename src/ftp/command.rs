use std::{fmt, io};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FtpCommand(&'static str);

impl FtpCommand {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! ftp_commands {
    (
        $(
            $(#[$docs:meta])*
            ($konst:ident, $phrase:expr);
        )+
    ) => {
        impl FtpCommand {
        $(
            $(#[$docs])*
            pub const $konst: FtpCommand = FtpCommand($phrase);
        )+
        }
    };
}

ftp_commands! {
    (USER, "USER");
    (PASS, "PASS");
    (QUIT, "QUIT");
    (OPTS_UTF8_ON, "OPTS UTF8 ON");
    (TYPE_I, "TYPE I");
    (PASV, "PASV");
    (EPSV, "EPSV");
    (CWD, "CWD");
    (PWD, "PWD");
    (MKD, "MKD");
    (NLST, "NLST");
    (SIZE, "SIZE");
    (RETR, "RETR");
    (STOR, "STOR");
}

/// 組出 `VERB[ param]\r\n`; 參數含 CR, LF 或 NUL 時拒絕
pub(crate) fn encode(cmd: FtpCommand, param: Option<&str>) -> io::Result<Vec<u8>> {
    if let Some(param) = param {
        if param.contains(['\r', '\n', '\0']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} parameter contains CR, LF or NUL", cmd),
            ));
        }
    }

    let len = cmd.0.len() + param.map(|p| p.len() + 1).unwrap_or(0) + 2;
    let mut buf: Vec<u8> = Vec::with_capacity(len);
    buf.extend_from_slice(cmd.0.as_bytes());
    if let Some(param) = param {
        buf.push(b' ');
        buf.extend_from_slice(param.as_bytes());
    }
    buf.extend_from_slice(b"\r\n");
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_commands() {
        assert_eq!(encode(FtpCommand::PWD, None).unwrap(), b"PWD\r\n");
        assert_eq!(
            encode(FtpCommand::CWD, Some("/上傳/報表")).unwrap(),
            "CWD /上傳/報表\r\n".as_bytes()
        );
        assert_eq!(encode(FtpCommand::OPTS_UTF8_ON, None).unwrap(), b"OPTS UTF8 ON\r\n");
    }

    #[test]
    fn test_encode_rejects_line_breaks() {
        for param in ["/x\r\nDELE /keep.txt", "a\nb", "a\rb", "a\0b"] {
            let err = encode(FtpCommand::CWD, Some(param)).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
    }
}
