//! User entity definitions

use serde::{Deserialize, Serialize};

/// Organizational role. Lower levels are more privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    SubAdmin,
    CompanyManager,
    CompanySubManager,
    User,
}

impl UserRole {
    pub const fn level(self) -> i64 {
        match self {
            UserRole::Admin => 1,
            UserRole::SubAdmin => 2,
            UserRole::CompanyManager => 3,
            UserRole::CompanySubManager => 4,
            UserRole::User => 5,
        }
    }

    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            1 => Some(UserRole::Admin),
            2 => Some(UserRole::SubAdmin),
            3 => Some(UserRole::CompanyManager),
            4 => Some(UserRole::CompanySubManager),
            5 => Some(UserRole::User),
            _ => None,
        }
    }

    /// Platform operators (admins and sub-admins).
    pub const fn is_operator(self) -> bool {
        self.level() <= UserRole::SubAdmin.level()
    }

    /// Roles allowed to invite into, and accept requests for, an organization.
    pub const fn is_manager(self) -> bool {
        self.level() <= UserRole::CompanySubManager.level()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::SubAdmin => "SUB_ADMIN",
            UserRole::CompanyManager => "COMPANY_MANAGER",
            UserRole::CompanySubManager => "COMPANY_SUB_MANAGER",
            UserRole::User => "USER",
        }
    }
}

/// `{id, name}` reference to a department or team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRef {
    pub id: i64,
    pub name: String,
}

/// Full user profile as held by the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub nickname: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub image: Option<String>,
    pub birthday: Option<String>,
    pub is_subscribed: bool,
    pub company_id: Option<i64>,
    pub departments: Vec<OrgRef>,
    pub teams: Vec<OrgRef>,
    pub entry_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub is_online: bool,
}

impl UserRecord {
    pub fn in_department(&self, department_id: i64) -> bool {
        self.departments.iter().any(|dept| dept.id == department_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub nickname: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: UserRole,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub is_subscribed: bool,
    #[serde(default)]
    pub company_id: Option<i64>,
    #[serde(default)]
    pub entry_date: Option<String>,
}

impl NewUser {
    pub fn basic(name: impl Into<String>, email: impl Into<String>, role: UserRole) -> Self {
        let name = name.into();
        Self {
            nickname: name.clone(),
            name,
            email: email.into(),
            phone: None,
            role,
            image: None,
            birthday: None,
            is_subscribed: false,
            company_id: None,
            entry_date: None,
        }
    }
}

/// Profile mutation. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub is_subscribed: Option<bool>,
    #[serde(default)]
    pub entry_date: Option<String>,
    #[serde(default)]
    pub company_id: Option<i64>,
    #[serde(default)]
    pub join_department: Option<i64>,
}

impl UserUpdate {
    pub fn join_company(company_id: i64) -> Self {
        Self {
            company_id: Some(company_id),
            ..Self::default()
        }
    }

    pub fn join_department(department_id: i64) -> Self {
        Self {
            join_department: Some(department_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
