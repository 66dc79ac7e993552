//! Runtime path helpers for the contract runner.
//!
//! Backend URLs and database credentials usually live in a `.env` at the workspace root,
//! even when the binary is started from inside `runner/`.

use std::path::{Path, PathBuf};

pub fn runner_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn workspace_root() -> PathBuf {
    runner_dir()
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(runner_dir)
}

/// Candidate `.env` locations, in priority order:
/// - current working directory and its parent
/// - workspace root (one folder up from `runner/`)
/// - runner crate dir
pub fn dotenv_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(".env"));
        if let Some(parent) = cwd.parent() {
            candidates.push(parent.join(".env"));
        }
    }

    candidates.push(workspace_root().join(".env"));
    candidates.push(runner_dir().join(".env"));
    candidates.dedup();
    candidates
}

/// Load `.env` once. The first file found wins; variables already present in the
/// environment are never overridden.
pub fn load_dotenv() {
    static ONCE: std::sync::OnceLock<()> = std::sync::OnceLock::new();
    ONCE.get_or_init(|| {
        for p in dotenv_candidates() {
            if p.exists() && dotenvy::from_path(&p).is_ok() {
                tracing::debug!("[RUNNER] Loaded .env from {}", p.display());
                return;
            }
        }
    });
}
