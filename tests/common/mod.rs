#![allow(dead_code)]

use small_ftp::{FtpConfig, FtpTransfer, LocalStorage};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const USERNAME: &str = "soldier";
pub const PASSWORD: &str = "secret";

#[derive(Debug, Clone)]
pub struct FakeOptions {
    pub username: String,
    pub password: String,
    pub pasv_enabled: bool,
    /// MKD 一律回 550
    pub deny_mkd: bool,
}

impl Default for FakeOptions {
    fn default() -> Self {
        Self {
            username: USERNAME.to_string(),
            password: PASSWORD.to_string(),
            pasv_enabled: true,
            deny_mkd: false,
        }
    }
}

#[derive(Default)]
struct FakeState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    commands: Vec<String>,
    sessions: usize,
}

/// In-process FTP server keeping its tree in memory.
pub struct FakeFtpServer {
    pub addr: SocketAddr,
    state: Arc<Mutex<FakeState>>,
    handle: JoinHandle<()>,
}

impl Drop for FakeFtpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}

fn resolve(cwd: &str, arg: &str) -> String {
    if arg.starts_with('/') {
        normalize(arg)
    } else {
        normalize(&format!("{}/{}", cwd, arg))
    }
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl FakeFtpServer {
    pub async fn start() -> Self {
        Self::start_with(FakeOptions::default()).await
    }

    pub async fn start_with(options: FakeOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut state = FakeState::default();
        state.dirs.insert("/".to_string());
        let state = Arc::new(Mutex::new(state));

        let shared = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let state = shared.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    handle_session(socket, state, options).await;
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn config(&self, remote_dir: &str, local_dir: &Path) -> FtpConfig {
        FtpConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            username: USERNAME.to_string(),
            password: PASSWORD.to_string(),
            remote_dir: remote_dir.to_string(),
            local_dir: local_dir.to_str().unwrap().to_string(),
            connect_timeout_seconds: 5,
            mirror_subdirs: false,
        }
    }

    pub fn transfer(&self, remote_dir: &str, local_dir: &Path) -> FtpTransfer<FtpConfig, LocalStorage> {
        let config = self.config(remote_dir, local_dir);
        let storage = LocalStorage::new(config.local_dir.clone());
        FtpTransfer::new(config, storage)
    }

    /// 放入檔案並補齊上層目錄
    pub fn put_file(&self, path: &str, content: &[u8]) {
        let path = normalize(path);
        let mut state = self.state.lock().unwrap();
        let mut dir = parent_of(&path);
        while dir != "/" {
            state.dirs.insert(dir.clone());
            dir = parent_of(&dir);
        }
        state.files.insert(path, content.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn verbs(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|c| c.split(' ').next().unwrap_or("").to_string())
            .collect()
    }

    pub fn sessions(&self) -> usize {
        self.state.lock().unwrap().sessions
    }
}

async fn reply(writer: &mut OwnedWriteHalf, line: &str) {
    let _ = writer.write_all(format!("{}\r\n", line).as_bytes()).await;
}

async fn open_passive() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn accept_data(passive: &mut Option<TcpListener>) -> Option<TcpStream> {
    let listener = passive.take()?;
    listener.accept().await.ok().map(|(stream, _)| stream)
}

async fn handle_session(socket: TcpStream, state: Arc<Mutex<FakeState>>, options: FakeOptions) {
    state.lock().unwrap().sessions += 1;

    let (read_half, mut writer) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    reply(&mut writer, "220 fake ftp ready").await;

    let mut cwd = "/".to_string();
    let mut user: Option<String> = None;
    let mut logged_in = false;
    let mut passive: Option<TcpListener> = None;

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end_matches('\r').to_string();
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        state.lock().unwrap().commands.push(line.clone());

        if !logged_in && !matches!(verb.as_str(), "USER" | "PASS" | "QUIT") {
            reply(&mut writer, "530 Please login with USER and PASS").await;
            continue;
        }

        match verb.as_str() {
            "USER" => {
                user = Some(arg);
                reply(&mut writer, "331 Password required").await;
            }
            "PASS" => {
                if user.as_deref() == Some(options.username.as_str()) && arg == options.password {
                    logged_in = true;
                    reply(&mut writer, "230 Login successful").await;
                } else {
                    reply(&mut writer, "530 Login incorrect").await;
                }
            }
            "OPTS" => reply(&mut writer, "200 Always in UTF8 mode").await,
            "TYPE" => reply(&mut writer, "200 Switching to Binary mode").await,
            "PASV" => {
                if !options.pasv_enabled {
                    reply(&mut writer, "502 PASV not implemented").await;
                    continue;
                }
                let (listener, port) = open_passive().await;
                passive = Some(listener);
                reply(
                    &mut writer,
                    &format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{}).",
                        port >> 8,
                        port & 0xff
                    ),
                )
                .await;
            }
            "EPSV" => {
                let (listener, port) = open_passive().await;
                passive = Some(listener);
                reply(
                    &mut writer,
                    &format!("229 Entering Extended Passive Mode (|||{}|)", port),
                )
                .await;
            }
            "PWD" => {
                reply(
                    &mut writer,
                    &format!("257 \"{}\" is the current directory", cwd.replace('"', "\"\"")),
                )
                .await;
            }
            "CWD" => {
                let target = resolve(&cwd, &arg);
                if state.lock().unwrap().dirs.contains(&target) {
                    cwd = target;
                    reply(&mut writer, "250 Directory successfully changed").await;
                } else {
                    reply(&mut writer, "550 Failed to change directory").await;
                }
            }
            "MKD" => {
                let target = resolve(&cwd, &arg);
                let created = {
                    let mut state = state.lock().unwrap();
                    let parent_exists = state.dirs.contains(&parent_of(&target));
                    if options.deny_mkd
                        || !parent_exists
                        || state.dirs.contains(&target)
                        || state.files.contains_key(&target)
                    {
                        false
                    } else {
                        state.dirs.insert(target.clone());
                        true
                    }
                };
                if created {
                    reply(&mut writer, &format!("257 \"{}\" created", target)).await;
                } else {
                    reply(&mut writer, "550 Create directory operation failed").await;
                }
            }
            "SIZE" => {
                let target = resolve(&cwd, &arg);
                let size = state.lock().unwrap().files.get(&target).map(Vec::len);
                match size {
                    Some(size) => reply(&mut writer, &format!("213 {}", size)).await,
                    None => reply(&mut writer, "550 Could not get file size").await,
                }
            }
            "NLST" => {
                let target = if arg.is_empty() {
                    cwd.clone()
                } else {
                    resolve(&cwd, &arg)
                };
                let names = {
                    let state = state.lock().unwrap();
                    if !state.dirs.contains(&target) {
                        None
                    } else {
                        let mut names: Vec<String> = state
                            .files
                            .keys()
                            .chain(state.dirs.iter())
                            .filter(|p| p.as_str() != "/" && parent_of(p) == target)
                            .map(|p| name_of(p).to_string())
                            .collect();
                        names.sort();
                        Some(names)
                    }
                };
                let Some(names) = names else {
                    passive = None;
                    reply(&mut writer, "550 No such directory").await;
                    continue;
                };
                let Some(mut data) = accept_data(&mut passive).await else {
                    reply(&mut writer, "425 Use PASV first").await;
                    continue;
                };
                reply(&mut writer, "150 Here comes the directory listing").await;
                for name in names {
                    let _ = data.write_all(format!("{}\r\n", name).as_bytes()).await;
                }
                let _ = data.shutdown().await;
                drop(data);
                reply(&mut writer, "226 Directory send OK").await;
            }
            "RETR" => {
                let target = resolve(&cwd, &arg);
                let content = state.lock().unwrap().files.get(&target).cloned();
                let Some(content) = content else {
                    passive = None;
                    reply(&mut writer, "550 Failed to open file").await;
                    continue;
                };
                let Some(mut data) = accept_data(&mut passive).await else {
                    reply(&mut writer, "425 Use PASV first").await;
                    continue;
                };
                reply(&mut writer, "150 Opening BINARY mode data connection").await;
                let _ = data.write_all(&content).await;
                let _ = data.shutdown().await;
                drop(data);
                reply(&mut writer, "226 Transfer complete").await;
            }
            "STOR" => {
                let target = resolve(&cwd, &arg);
                if !state.lock().unwrap().dirs.contains(&parent_of(&target)) {
                    passive = None;
                    reply(&mut writer, "553 Could not create file").await;
                    continue;
                }
                let Some(mut data) = accept_data(&mut passive).await else {
                    reply(&mut writer, "425 Use PASV first").await;
                    continue;
                };
                reply(&mut writer, "150 Ok to send data").await;
                let mut content = Vec::new();
                let _ = data.read_to_end(&mut content).await;
                drop(data);
                state.lock().unwrap().files.insert(target, content);
                reply(&mut writer, "226 Transfer complete").await;
            }
            "QUIT" => {
                reply(&mut writer, "221 Goodbye").await;
                break;
            }
            _ => reply(&mut writer, "502 Command not implemented").await,
        }
    }
}
