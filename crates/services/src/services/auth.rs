use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The already-authenticated caller. Identity and role resolution happen
/// outside the core; by the time a service method runs, the two capabilities
/// have been decided.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub display_name: String,
    /// True for admins and for any role explicitly granted stop editing.
    pub can_edit: bool,
    pub is_admin: bool,
}

impl Principal {
    pub fn admin(id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            can_edit: true,
            is_admin: true,
        }
    }

    pub fn editor(id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            can_edit: true,
            is_admin: false,
        }
    }

    pub fn viewer(id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            can_edit: false,
            is_admin: false,
        }
    }
}
