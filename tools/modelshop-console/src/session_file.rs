//! The signed-in user, remembered between runs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use modelshop_common::chat::SessionId;
use modelshop_common::identity::UserSession;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stored {
    #[serde(default)]
    pub user: Option<UserSession>,
    #[serde(default)]
    pub chat_session: Option<SessionId>,
}

pub fn default_path() -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("modelshop").join("session.json")
}

/// Missing or unreadable files load as empty.
pub fn load(path: &Path) -> Stored {
    let Ok(data) = std::fs::read_to_string(path) else {
        return Stored::default();
    };
    match serde_json::from_str(&data) {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Ignoring unreadable session file: {e}");
            Stored::default()
        }
    }
}

pub fn save(path: &Path, stored: &Stored) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(stored)?;
    std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Session saved");
    Ok(())
}
