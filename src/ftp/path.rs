//! 遠端路徑工具. 遠端一律使用 `/` 分隔, 不經過本地 `Path`.

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// 非空且不是 `.` 的路徑片段
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

fn assemble(absolute: bool, parts: &[&str]) -> String {
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// 遠端根目錄加上附加目錄, 片段之間只保留一個 `/`
pub fn join_remote(base: &str, append: &str) -> String {
    let absolute = is_absolute(base) || (base.is_empty() && is_absolute(append));
    let mut parts = segments(base);
    parts.extend(segments(append));
    assemble(absolute, &parts)
}

/// `/a/b/c` -> `/a`, `/a/b`, `/a/b/c`
pub fn prefixes(path: &str) -> Vec<String> {
    let absolute = is_absolute(path);
    let parts = segments(path);
    (1..=parts.len())
        .map(|n| assemble(absolute, &parts[..n]))
        .collect()
}

/// 拆成 (上層目錄, 檔名); 沒有上層目錄時回傳空字串
pub fn split_parent(path: &str) -> (String, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/".to_string(), &trimmed[1..]),
        Some(idx) => (trimmed[..idx].to_string(), &trimmed[idx + 1..]),
        None => (String::new(), trimmed),
    }
}

/// 清單項目可能是完整路徑, 只取最後一段比對
pub fn file_name(entry: &str) -> &str {
    let trimmed = entry.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
