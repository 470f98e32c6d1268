//! Identity provider.
//!
//! The signed-in principal is persisted as `~/.weekplan/identity.json` and
//! detected on startup, so a restart keeps the session without re-auth.
//! Transitions are published through a `tokio::sync::watch` channel: the
//! current value doubles as `currentUser()` for late subscribers, and each
//! change is the signed-in / signed-out event.

use std::path::PathBuf;
use std::sync::Mutex;

use tokio::sync::watch;

use crate::types::Identity;

/// Where the identity token lives (`~/.weekplan/identity.json`).
pub fn identity_token_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_default();
    home.join(".weekplan").join("identity.json")
}

/// Detect an existing identity by reading the token file.
///
/// A token file with missing or empty `uid` means auth never completed and
/// reads as signed out.
pub fn detect_identity(token_path: &PathBuf) -> Option<Identity> {
    if !token_path.exists() {
        return None;
    }
    let content = std::fs::read_to_string(token_path).ok()?;
    match serde_json::from_str::<Identity>(&content) {
        Ok(identity) if !identity.uid.is_empty() => Some(identity),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Ignoring malformed identity token: {e}");
            None
        }
    }
}

/// Holds the current identity and broadcasts sign-in/sign-out transitions.
pub struct AuthService {
    token_path: PathBuf,
    current: Mutex<Option<Identity>>,
    tx: watch::Sender<Option<Identity>>,
}

impl AuthService {
    /// Create the service with the default token location, detecting any
    /// existing sign-in.
    pub fn new() -> Self {
        Self::with_token_path(identity_token_path())
    }

    /// Create the service with an explicit token path. Useful for testing.
    pub fn with_token_path(token_path: PathBuf) -> Self {
        let detected = detect_identity(&token_path);
        if let Some(identity) = &detected {
            log::info!("Detected existing identity: {}", identity.email);
        }
        let (tx, _) = watch::channel(detected.clone());
        Self {
            token_path,
            current: Mutex::new(detected),
            tx,
        }
    }

    /// The signed-in principal, or `None`.
    pub fn current_identity(&self) -> Option<Identity> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    /// Subscribe to sign-in/sign-out transitions. The receiver's current
    /// value is the present identity.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    /// Record a completed sign-in: persist the token and broadcast.
    pub fn sign_in(&self, identity: Identity) -> Result<(), String> {
        if let Some(parent) = self.token_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create state dir: {e}"))?;
            }
        }
        let content = serde_json::to_string_pretty(&identity)
            .map_err(|e| format!("Failed to serialize identity: {e}"))?;
        std::fs::write(&self.token_path, content)
            .map_err(|e| format!("Failed to write identity token: {e}"))?;

        if let Ok(mut guard) = self.current.lock() {
            *guard = Some(identity.clone());
        }
        let _ = self.tx.send(Some(identity));
        Ok(())
    }

    /// Sign out: remove the token and broadcast. Signing out while already
    /// signed out is a no-op.
    pub fn sign_out(&self) -> Result<(), String> {
        if self.token_path.exists() {
            std::fs::remove_file(&self.token_path)
                .map_err(|e| format!("Failed to remove identity token: {e}"))?;
        }
        if let Ok(mut guard) = self.current.lock() {
            *guard = None;
        }
        let _ = self.tx.send(None);
        Ok(())
    }
}

impl Default for AuthService {
    fn default() -> Self {
        Self::new()
    }
}
