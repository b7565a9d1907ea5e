//! Allow-list gate deciding which conversations are forwarded to the decision service.

use crate::message::{ConversationKind, Message};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Persisted allow-list state. Names are stored trimmed and compared case-sensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowlistSnapshot {
    #[serde(default)]
    pub personal: BTreeSet<String>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
    /// Forward everything, ignoring both sets.
    #[serde(default)]
    pub turbo_mode: bool,
}

impl AllowlistSnapshot {
    pub fn allows(&self, kind: ConversationKind, name: &str) -> bool {
        if self.turbo_mode {
            return true;
        }
        let name = name.trim();
        match kind {
            ConversationKind::Personal => self.personal.contains(name),
            ConversationKind::Group => self.groups.contains(name),
        }
    }
}

pub struct AllowlistGate {
    path: Option<PathBuf>,
    state: RwLock<AllowlistSnapshot>,
    tx: watch::Sender<AllowlistSnapshot>,
}

impl AllowlistGate {
    /// Load from `path`, starting empty if the file does not exist yet.
    pub fn open(path: PathBuf) -> Result<Self> {
        let snapshot = {
            let _lock = lock_file(&path, false)?;
            read_snapshot(&path)?
        };
        info!(
            "allowlist loaded: {} contacts, {} groups, turbo={}",
            snapshot.personal.len(),
            snapshot.groups.len(),
            snapshot.turbo_mode
        );
        Ok(Self::with_snapshot(Some(path), snapshot))
    }

    /// `allowlist.json` beside the config file.
    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::utils::get_chatbridge_home()?.join("allowlist.json"))
    }

    /// Re-read the backing file and publish it if another process changed it.
    pub fn reload(&self) -> Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }
        let loaded = {
            let _lock = lock_file(path, false)?;
            read_snapshot(path)?
        };
        Ok(self.publish(loaded))
    }

    /// Replace the in-memory state and notify subscribers; false if nothing changed.
    fn publish(&self, snapshot: AllowlistSnapshot) -> bool {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state == snapshot {
            return false;
        }
        *state = snapshot.clone();
        drop(state);
        self.tx.send_replace(snapshot);
        true
    }

    /// Gate without durable backing.
    pub fn in_memory(snapshot: AllowlistSnapshot) -> Self {
        Self::with_snapshot(None, snapshot)
    }

    fn with_snapshot(path: Option<PathBuf>, snapshot: AllowlistSnapshot) -> Self {
        let (tx, _rx) = watch::channel(snapshot.clone());
        Self {
            path,
            state: RwLock::new(snapshot),
            tx,
        }
    }

    pub fn should_forward(&self, msg: &Message) -> bool {
        let Some((kind, name)) = msg.conversation() else {
            return false;
        };
        let allowed = self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .allows(kind, name);
        if !allowed {
            debug!("{} '{}' not on allowlist", kind.as_str(), name);
        }
        allowed
    }

    pub fn snapshot(&self) -> AllowlistSnapshot {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Live view of the allow-list for UI or other consumers.
    pub fn subscribe(&self) -> watch::Receiver<AllowlistSnapshot> {
        self.tx.subscribe()
    }

    pub fn add_contact(&self, name: &str) -> Result<bool> {
        self.mutate(|s| insert_trimmed(&mut s.personal, name))
    }

    pub fn remove_contact(&self, name: &str) -> Result<bool> {
        self.mutate(|s| s.personal.remove(name.trim()))
    }

    pub fn add_group(&self, name: &str) -> Result<bool> {
        self.mutate(|s| insert_trimmed(&mut s.groups, name))
    }

    pub fn remove_group(&self, name: &str) -> Result<bool> {
        self.mutate(|s| s.groups.remove(name.trim()))
    }

    pub fn set_turbo(&self, enabled: bool) -> Result<bool> {
        self.mutate(|s| std::mem::replace(&mut s.turbo_mode, enabled) != enabled)
    }

    /// Apply `f` and persist when it reports a change.
    ///
    /// With a backing file, `f` runs against the file contents read under an
    /// exclusive lock, so concurrent writers in other processes are not lost.
    fn mutate(&self, f: impl FnOnce(&mut AllowlistSnapshot) -> bool) -> Result<bool> {
        let Some(path) = &self.path else {
            let mut state = self
                .state
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !f(&mut *state) {
                return Ok(false);
            }
            let next = state.clone();
            drop(state);
            self.tx.send_replace(next);
            return Ok(true);
        };

        let _lock = lock_file(path, true)?;
        let mut next = read_snapshot(path)?;
        let changed = f(&mut next);
        if changed {
            let content = serde_json::to_string_pretty(&next)?;
            crate::utils::atomic_write(path, &content).inspect_err(|e| {
                warn!("failed to persist allowlist to {}: {}", path.display(), e);
            })?;
        }
        self.publish(next);
        Ok(changed)
    }
}

/// Lock a sibling `<file>.lock`; `atomic_write` renames over the data file itself.
/// Released when the returned file is dropped.
fn lock_file(path: &Path, exclusive: bool) -> Result<std::fs::File> {
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    let lock_path = PathBuf::from(lock_path);
    if let Some(parent) = lock_path.parent() {
        crate::utils::ensure_dir(parent)?;
    }
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("failed to open allowlist lock {}", lock_path.display()))?;
    if exclusive {
        lock_file
            .lock_exclusive()
            .with_context(|| "failed to acquire allowlist lock")?;
    } else {
        lock_file
            .lock_shared()
            .with_context(|| "failed to acquire allowlist shared lock")?;
    }
    Ok(lock_file)
}

fn read_snapshot(path: &Path) -> Result<AllowlistSnapshot> {
    if !path.exists() {
        return Ok(AllowlistSnapshot::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read allowlist at {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse allowlist at {}", path.display()))
}

fn insert_trimmed(set: &mut BTreeSet<String>, name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() {
        return false;
    }
    set.insert(name.to_string())
}
