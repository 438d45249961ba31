//! Account entity and its capabilities.
mod email;
mod manager;
mod repository;

pub use email::*;
pub use manager::*;
pub use repository::*;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{PasswordManager, is_password_usable};

/// Maximum length of `email` and `name` columns.
pub const MAX_FIELD_LENGTH: usize = 255;

/// Account as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(skip)]
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl Account {
    /// Unsaved account with default flags.
    pub(crate) fn new(email: String, name: String, password: String) -> Self {
        Self {
            id: 0,
            email,
            name,
            password,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            last_login: None,
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

/// Something that can log in.
pub trait Authenticatable {
    /// Name of the field used as login identifier.
    const USERNAME_FIELD: &'static str;

    /// Login identifier.
    fn username(&self) -> &str;

    /// Stored password, hashed or unusable.
    fn password_hash(&self) -> &str;

    fn is_active(&self) -> bool;

    fn full_display_name(&self) -> &str;

    fn short_display_name(&self) -> &str;

    fn has_usable_password(&self) -> bool {
        is_password_usable(self.password_hash())
    }

    /// Compare `password` with the stored hash.
    fn check_password(&self, pwd: &PasswordManager, password: &str) -> bool {
        pwd.verify_password(password, self.password_hash())
    }
}

/// Something that carries permission flags.
pub trait PermissionBearer {
    fn is_staff(&self) -> bool;

    fn is_superuser(&self) -> bool;

    /// Active superusers hold every permission. No other source is modeled.
    fn has_perm(&self, _perm: &str) -> bool;

    fn has_module_perms(&self, _module: &str) -> bool;
}

impl Authenticatable for Account {
    const USERNAME_FIELD: &'static str = "email";

    fn username(&self) -> &str {
        &self.email
    }

    fn password_hash(&self) -> &str {
        &self.password
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn full_display_name(&self) -> &str {
        &self.name
    }

    fn short_display_name(&self) -> &str {
        &self.name
    }
}

impl PermissionBearer for Account {
    fn is_staff(&self) -> bool {
        self.is_staff
    }

    fn is_superuser(&self) -> bool {
        self.is_superuser
    }

    fn has_perm(&self, _perm: &str) -> bool {
        self.is_active && self.is_superuser
    }

    fn has_module_perms(&self, _module: &str) -> bool {
        self.is_active && self.is_superuser
    }
}
