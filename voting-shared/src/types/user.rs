use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{KarmaChangeSettings, UserId};

/// The slice of a user account the voting engine needs: cumulative karma,
/// admin status (admins are exempt from the default rate limits), the digest
/// schedule, and when the user last opened their digest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub karma: i64,
    pub is_admin: bool,
    pub karma_change_settings: KarmaChangeSettings,
    pub karma_changes_last_opened: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Creates a user with zero karma and default digest settings.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            karma: 0,
            is_admin: false,
            karma_change_settings: KarmaChangeSettings::default(),
            karma_changes_last_opened: None,
        }
    }
}
