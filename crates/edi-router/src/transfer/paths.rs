//! Remote path helpers shared by FTP and SFTP

/// `a\b` -> `/a/b/`; blank -> `/`
pub fn normalize_dir(dir: &str) -> String {
    if dir.trim().is_empty() {
        return "/".to_string();
    }

    let mut normalized = dir.replace('\\', "/");
    if !normalized.starts_with('/') {
        normalized.insert(0, '/');
    }
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Full remote path of `name` inside `dir`; just `name` when `dir` is unset
pub fn compose_remote_path(dir: Option<&str>, name: &str) -> String {
    match dir.filter(|d| !d.trim().is_empty()) {
        Some(dir) => format!("{}{}", normalize_dir(dir), name),
        None => name.to_string(),
    }
}

/// Child path used while walking a listing
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.trim().is_empty() {
        return name.to_string();
    }
    format!("{}/{}", dir.strip_suffix('/').unwrap_or(dir), name)
}

/// Each prefix of a normalized directory: `/a/b/` -> `["/a", "/a/b"]`
pub fn directory_prefixes(dir: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut current = String::new();

    for part in dir.split(|c: char| c == '/' || c == '\\').filter(|p| !p.trim().is_empty()) {
        current.push('/');
        current.push_str(part);
        prefixes.push(current.clone());
    }
    prefixes
}
