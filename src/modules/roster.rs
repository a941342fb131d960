// Account roster persistence: a plain JSON array on disk, loaded at start
// and rewritten on mutation. The pool is the sole writer.

use std::path::Path;

use crate::models::Account;

/// Load the roster. A missing file is an empty roster, not an error.
pub fn load(path: &Path) -> Result<Vec<Account>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read account roster: {e}"))?;
    serde_json::from_str(&content).map_err(|e| format!("failed to parse account roster: {e}"))
}

/// Rewrite the roster file. Credentials live in this file, so it is chmod
/// 0600 on unix.
pub fn save(path: &Path, accounts: &[Account]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create roster directory: {e}"))?;
    }
    let content = serde_json::to_string_pretty(accounts)
        .map_err(|e| format!("failed to serialize account roster: {e}"))?;
    std::fs::write(path, content).map_err(|e| format!("failed to write account roster: {e}"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| format!("failed to set roster permissions: {e}"))?;
    }

    Ok(())
}
