use crate::config::{FtpConfig, DEFAULT_CONNECT_TIMEOUT_SECONDS, DEFAULT_PORT};
use crate::utils::error::{FtpError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub ftp: ServerSection,
    pub directories: Option<DirectoriesSection>,
    pub upload: Option<UploadSection>,
    pub logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoriesSection {
    pub remote: Option<String>,
    pub local: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSection {
    pub mirror_subdirs: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| FtpError::ConfigError {
            message: format!("Failed to read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| FtpError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${FTP_PASSWORD}), 未設定的變數保留原文
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::OnceLock;

        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"));

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        result.to_string()
    }

    /// 轉換成執行期使用的 FtpConfig
    pub fn to_ftp_config(&self) -> Result<FtpConfig> {
        let mut config = FtpConfig::default();

        // url 先套用, 個別欄位再覆蓋
        match &self.ftp.url {
            Some(url) => config.apply_url(url)?,
            None => {
                validation::validate_required_field("ftp.host", &self.ftp.host)?;
            }
        }
        if let Some(host) = &self.ftp.host {
            config.host = host.clone();
        }
        validation::validate_non_empty_string("ftp.host", &config.host).map_err(|_| {
            FtpError::MissingConfigError {
                field: "ftp.host".to_string(),
            }
        })?;

        config.port = self.ftp.port.unwrap_or(if self.ftp.url.is_some() {
            config.port
        } else {
            DEFAULT_PORT
        });
        if let Some(username) = &self.ftp.username {
            config.username = username.clone();
        }
        if let Some(password) = &self.ftp.password {
            config.password = password.clone();
        }
        config.connect_timeout_seconds = self
            .ftp
            .connect_timeout_seconds
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS);

        if let Some(dirs) = &self.directories {
            if let Some(remote) = &dirs.remote {
                config.remote_dir = remote.clone();
            }
            if let Some(local) = &dirs.local {
                config.local_dir = local.clone();
            }
        }

        config.mirror_subdirs = self
            .upload
            .as_ref()
            .and_then(|u| u.mirror_subdirs)
            .unwrap_or(false);

        Ok(config)
    }

    /// 取得日誌格式 (compact 或 json)
    pub fn json_logging(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.format.as_deref())
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }

    /// 取得日誌等級是否為 debug 以上
    pub fn verbose_logging(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .map(|l| matches!(l.to_ascii_lowercase().as_str(), "debug" | "trace"))
            .unwrap_or(false)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        if let Some(password) = &self.ftp.password {
            if password.starts_with("${") {
                return Err(FtpError::ConfigValidationError {
                    field: "ftp.password".to_string(),
                    message: format!("environment variable {} is not set", password),
                });
            }
        }

        if let Some(format) = self.logging.as_ref().and_then(|l| l.format.as_deref()) {
            let valid_formats = ["compact", "json"];
            if !valid_formats.contains(&format) {
                return Err(FtpError::InvalidConfigValueError {
                    field: "logging.format".to_string(),
                    value: format.to_string(),
                    reason: format!(
                        "Unsupported format. Valid formats: {}",
                        valid_formats.join(", ")
                    ),
                });
            }
        }

        self.to_ftp_config()?.validate()
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConfigProvider;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_toml_config() {
        let toml_content = r#"
[ftp]
host = "192.168.1.10"
port = 2121
username = "soldier"
password = "secret"
connect_timeout_seconds = 10

[directories]
remote = "/data/upload/"
local = "./downloads/"

[upload]
mirror_subdirs = true
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        let ftp = config.to_ftp_config().unwrap();

        assert_eq!(ftp.host(), "192.168.1.10");
        assert_eq!(ftp.port(), 2121);
        assert_eq!(ftp.remote_dir(), "/data/upload/");
        assert_eq!(ftp.local_dir(), "./downloads/");
        assert_eq!(ftp.connect_timeout().as_secs(), 10);
        assert!(ftp.mirror_subdirs());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_for_missing_sections() {
        let config = TomlConfig::from_toml_str("[ftp]\nhost = \"ftp.example.com\"\n").unwrap();
        let ftp = config.to_ftp_config().unwrap();

        assert_eq!(ftp.port, DEFAULT_PORT);
        assert_eq!(ftp.username, "anonymous");
        assert_eq!(ftp.remote_dir, "/");
        assert_eq!(ftp.local_dir, ".");
        assert!(!ftp.mirror_subdirs);
        assert!(!config.json_logging());
    }

    #[test]
    fn test_url_with_field_override() {
        let toml_content = r#"
[ftp]
url = "ftp://alice:pw@ftp.example.com:2100/incoming"
username = "bob"
"#;
        let ftp = TomlConfig::from_toml_str(toml_content)
            .unwrap()
            .to_ftp_config()
            .unwrap();

        assert_eq!(ftp.host, "ftp.example.com");
        assert_eq!(ftp.port, 2100);
        assert_eq!(ftp.username, "bob");
        assert_eq!(ftp.password, "pw");
        assert_eq!(ftp.remote_dir, "/incoming");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TEST_SMALL_FTP_PASSWORD", "from-env");

        let toml_content = r#"
[ftp]
host = "ftp.example.com"
password = "${TEST_SMALL_FTP_PASSWORD}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.ftp.password.as_deref(), Some("from-env"));

        std::env::remove_var("TEST_SMALL_FTP_PASSWORD");
    }

    #[test]
    fn test_unset_env_var_fails_validation() {
        let toml_content = r#"
[ftp]
host = "ftp.example.com"
password = "${TEST_SMALL_FTP_UNSET_VARIABLE}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_host_is_reported() {
        let config = TomlConfig::from_toml_str("[ftp]\nport = 21\n").unwrap();
        assert!(matches!(
            config.to_ftp_config(),
            Err(FtpError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_invalid_logging_format() {
        let toml_content = r#"
[ftp]
host = "ftp.example.com"

[logging]
format = "xml"
"#;
        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[ftp]
host = "file-test.example.com"

[logging]
level = "debug"
format = "json"
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.ftp.host.as_deref(), Some("file-test.example.com"));
        assert!(config.json_logging());
        assert!(config.verbose_logging());
    }
}
