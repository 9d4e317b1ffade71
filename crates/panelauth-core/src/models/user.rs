use serde::{Deserialize, Serialize};

/// Default lifetime, in days, of a remembered session.
pub const DEFAULT_LOGIN_DAY: u32 = 7;

/// Profile record returned by `GET user/info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub uid: String,
    pub username: String,
    pub nickname: String,
    pub role_name: String,
    pub avatar: String,
    pub sex: i32,
    pub email: String,
    pub mobile: String,
    pub address: String,
    pub created_at: Option<String>,
    pub roles: Option<Vec<String>>,
    pub permissions: Option<Vec<String>>,
}

/// The signed-in identity plus the flags that govern how it is persisted.
///
/// Stored under `user-info`. `is_remembered` and `login_day` are part of the
/// persisted record so a restored session keeps its policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSession {
    pub uid: String,
    pub username: String,
    pub nickname: String,
    pub role_name: String,
    pub avatar: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub is_remembered: bool,
    pub login_day: u32,
    pub sex: i32,
    pub email: String,
    pub mobile: String,
    pub address: String,
    pub created_at: Option<String>,
}

impl Default for UserSession {
    fn default() -> Self {
        Self {
            uid: String::new(),
            username: String::new(),
            nickname: String::new(),
            role_name: String::new(),
            avatar: String::new(),
            roles: Vec::new(),
            permissions: Vec::new(),
            is_remembered: false,
            login_day: DEFAULT_LOGIN_DAY,
            sex: 0,
            email: String::new(),
            mobile: String::new(),
            address: String::new(),
            created_at: None,
        }
    }
}

impl UserSession {
    /// Merge a freshly fetched profile. Roles and permissions are only
    /// replaced when the profile carries them.
    pub fn merge_profile(&mut self, profile: UserProfile) {
        self.uid = profile.uid;
        self.username = profile.username;
        self.nickname = profile.nickname;
        self.role_name = profile.role_name;
        self.avatar = profile.avatar;
        self.sex = profile.sex;
        self.email = profile.email;
        self.mobile = profile.mobile;
        self.address = profile.address;
        self.created_at = profile.created_at;
        if let Some(roles) = profile.roles {
            self.roles = roles;
        }
        if let Some(permissions) = profile.permissions {
            self.permissions = permissions;
        }
    }

    /// Forget the identity while keeping the persistence preferences the
    /// user chose on the login form.
    pub fn clear_identity(&mut self) {
        *self = Self {
            is_remembered: self.is_remembered,
            login_day: self.login_day,
            ..Self::default()
        };
    }

    /// Name to show in prompts and status lines.
    pub fn display_name(&self) -> &str {
        if self.nickname.is_empty() {
            &self.username
        } else {
            &self.nickname
        }
    }
}
