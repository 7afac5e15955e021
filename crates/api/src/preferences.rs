//! User Preferences
//!
//! Profile settings consumed by the host: who new messages are attributed
//! to, and whether temperature monitoring and its notifications are on.

use serde::{Deserialize, Serialize};

/// Name used when no username has been set
pub const ANONYMOUS_USER: &str = "Anonymous user";

/// Profile and notification preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub username: String,
    /// Reference to the profile picture; stored, never interpreted
    pub avatar_uri: Option<String>,
    /// Run the temperature monitor
    pub monitoring_enabled: bool,
    /// Host permission to show notifications
    pub notifications_allowed: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            username: ANONYMOUS_USER.to_string(),
            avatar_uri: None,
            monitoring_enabled: false,
            notifications_allowed: false,
        }
    }
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesUpdate {
    pub username: Option<String>,
    pub avatar_uri: Option<String>,
    pub monitoring_enabled: Option<bool>,
    pub notifications_allowed: Option<bool>,
}

impl Preferences {
    /// Username to attribute messages to
    pub fn display_name(&self) -> &str {
        let name = self.username.trim();
        if name.is_empty() {
            ANONYMOUS_USER
        } else {
            name
        }
    }

    /// Set the username; a blank name falls back to [`ANONYMOUS_USER`]
    pub fn set_username(&mut self, username: &str) {
        let name = username.trim();
        self.username = if name.is_empty() {
            ANONYMOUS_USER.to_string()
        } else {
            name.to_string()
        };
    }

    /// Apply a partial update. An empty avatar string clears the avatar.
    pub fn apply(&mut self, update: PreferencesUpdate) {
        if let Some(username) = update.username {
            self.set_username(&username);
        }
        if let Some(avatar) = update.avatar_uri {
            self.avatar_uri = Some(avatar).filter(|a| !a.trim().is_empty());
        }
        if let Some(enabled) = update.monitoring_enabled {
            self.monitoring_enabled = enabled;
        }
        if let Some(allowed) = update.notifications_allowed {
            self.notifications_allowed = allowed;
        }
    }
}
