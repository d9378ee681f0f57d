//! In-memory user directory with three unique lookup keys.
//!
//! Each user has one canonical record keyed by `user_id`. The email and
//! telephone indexes only map a key to that id, so a change made through any
//! lookup path is visible through every other one. Both indexes are re-keyed
//! whenever an upsert changes the email or telephone of a user.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use relay_common::error::AppError;
use relay_common::types::{Channel, Preferences, User, UserId};

/// Directory handle shared between the dispatcher and the HTTP layer.
pub type SharedDirectory = Arc<Mutex<UserDirectory>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("Email already exists")]
    DuplicateEmail,

    #[error("Telephone already exists")]
    DuplicateTelephone,

    #[error("{label} is required if {0} preference is true", label = contact_label(.0))]
    MissingContactForPreference(Channel),

    #[error("User must have either userId, email, or telephone")]
    MissingIdentifier,

    #[error("Cannot update user with userId {0} that does not exist")]
    UnknownUserId(UserId),
}

fn contact_label(channel: &Channel) -> &'static str {
    match channel {
        Channel::Email => "Email",
        Channel::Sms => "Telephone",
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::DuplicateEmail | DirectoryError::DuplicateTelephone => {
                AppError::Conflict(err.to_string())
            }
            DirectoryError::MissingContactForPreference(_) | DirectoryError::MissingIdentifier => {
                AppError::Validation(err.to_string())
            }
            DirectoryError::UnknownUserId(_) => AppError::NotFound(err.to_string()),
        }
    }
}

/// Fields for a brand new user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
}

/// Partial user record for [`UserDirectory::upsert`].
///
/// `email` and `telephone` distinguish "not supplied" (`None`) from
/// "explicitly cleared" (`Some(None)`, JSON `null`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default, deserialize_with = "explicit")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit")]
    pub telephone: Option<Option<String>>,
    #[serde(default)]
    pub preferences: Option<Preferences>,
}

fn explicit<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Accepts a number, a numeric string or a blank string (`?userId=`).
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(UserId),
        Text(String),
    }

    match Option::<RawId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawId::Number(id)) => Ok(Some(id)),
        Some(RawId::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(RawId::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid userId: {}", text))),
    }
}

impl UserPatch {
    fn email_key(&self) -> Option<&str> {
        non_empty(self.email.as_ref().and_then(|e| e.as_deref()))
    }

    fn telephone_key(&self) -> Option<&str> {
        non_empty(self.telephone.as_ref().and_then(|t| t.as_deref()))
    }
}

/// Lookup keys tried in priority order: `user_id`, `email`, `telephone`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
}

impl UserFilter {
    pub fn by_id(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn by_telephone(telephone: impl Into<String>) -> Self {
        Self {
            telephone: Some(telephone.into()),
            ..Self::default()
        }
    }

    /// True when no usable identifier is present. Zero ids and empty strings
    /// do not count.
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none_or(|id| id == 0)
            && non_empty(self.email.as_deref()).is_none()
            && non_empty(self.telephone.as_deref()).is_none()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn check_preferences(user: &User) -> Result<(), DirectoryError> {
    for channel in [Channel::Email, Channel::Sms] {
        if user.preferences.enabled(channel) && user.contact(channel).is_none() {
            return Err(DirectoryError::MissingContactForPreference(channel));
        }
    }
    Ok(())
}

/// Registered users plus the email and telephone indexes.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<UserId, User>,
    by_email: HashMap<String, UserId>,
    by_telephone: HashMap<String, UserId>,
    last_user_id: UserId,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedDirectory {
        Arc::new(Mutex::new(self))
    }

    /// Register a new user and assign the next id.
    pub fn create(&mut self, input: NewUser) -> Result<User, DirectoryError> {
        let email = normalize(input.email);
        let telephone = normalize(input.telephone);

        if let Some(email) = &email
            && self.by_email.contains_key(email)
        {
            return Err(DirectoryError::DuplicateEmail);
        }
        if let Some(telephone) = &telephone
            && self.by_telephone.contains_key(telephone)
        {
            return Err(DirectoryError::DuplicateTelephone);
        }

        let user = User {
            user_id: self.last_user_id + 1,
            email,
            telephone,
            preferences: input.preferences,
        };
        check_preferences(&user)?;

        if let Some(email) = &user.email {
            self.by_email.insert(email.clone(), user.user_id);
        }
        if let Some(telephone) = &user.telephone {
            self.by_telephone.insert(telephone.clone(), user.user_id);
        }
        self.users.insert(user.user_id, user.clone());
        self.last_user_id = user.user_id;

        tracing::info!(
            user_id = user.user_id,
            email_enabled = user.preferences.email,
            sms_enabled = user.preferences.sms,
            "User created"
        );

        Ok(user)
    }

    /// Merge `patch` into the user it identifies, or create a new user when
    /// nothing matches.
    ///
    /// Resolution tries `user_id`, then `email`, then `telephone`. An unknown
    /// `user_id` is an error rather than a fallthrough.
    pub fn upsert(&mut self, patch: UserPatch) -> Result<User, DirectoryError> {
        let user_id = patch.user_id.filter(|id| *id != 0);
        let email_key = patch.email_key();
        let telephone_key = patch.telephone_key();

        if user_id.is_none() && email_key.is_none() && telephone_key.is_none() {
            return Err(DirectoryError::MissingIdentifier);
        }

        let target = match user_id {
            Some(id) if self.users.contains_key(&id) => Some(id),
            Some(id) => return Err(DirectoryError::UnknownUserId(id)),
            None => email_key
                .and_then(|email| self.by_email.get(email).copied())
                .or_else(|| telephone_key.and_then(|tel| self.by_telephone.get(tel).copied())),
        };

        match target {
            Some(id) => self.update(id, patch),
            None => self.create(NewUser {
                email: patch.email.flatten(),
                telephone: patch.telephone.flatten(),
                preferences: patch.preferences.unwrap_or_default(),
            }),
        }
    }

    fn update(&mut self, user_id: UserId, patch: UserPatch) -> Result<User, DirectoryError> {
        let previous = self
            .users
            .get(&user_id)
            .cloned()
            .ok_or(DirectoryError::UnknownUserId(user_id))?;

        let mut merged = previous.clone();
        if let Some(email) = patch.email {
            merged.email = normalize(email);
        }
        if let Some(telephone) = patch.telephone {
            merged.telephone = normalize(telephone);
        }
        if let Some(preferences) = patch.preferences {
            merged.preferences = preferences;
        }

        if let Some(email) = &merged.email
            && self.by_email.get(email).is_some_and(|owner| *owner != user_id)
        {
            return Err(DirectoryError::DuplicateEmail);
        }
        if let Some(telephone) = &merged.telephone
            && self
                .by_telephone
                .get(telephone)
                .is_some_and(|owner| *owner != user_id)
        {
            return Err(DirectoryError::DuplicateTelephone);
        }
        check_preferences(&merged)?;

        if previous.email != merged.email {
            rekey(&mut self.by_email, previous.email.as_ref(), merged.email.as_ref(), user_id);
        }
        if previous.telephone != merged.telephone {
            rekey(
                &mut self.by_telephone,
                previous.telephone.as_ref(),
                merged.telephone.as_ref(),
                user_id,
            );
        }
        self.users.insert(user_id, merged.clone());

        tracing::info!(user_id, "User updated");

        Ok(merged)
    }

    /// First user matching the filter, trying `user_id`, `email`, `telephone`.
    ///
    /// A field that is absent, empty or unmatched is skipped.
    pub fn get_one(&self, filter: &UserFilter) -> Option<&User> {
        if let Some(id) = filter.user_id.filter(|id| *id != 0)
            && let Some(user) = self.users.get(&id)
        {
            return Some(user);
        }
        if let Some(email) = non_empty(filter.email.as_deref())
            && let Some(user) = self.find_by_email(email)
        {
            return Some(user);
        }
        non_empty(filter.telephone.as_deref()).and_then(|tel| self.find_by_telephone(tel))
    }

    pub fn get(&self, user_id: UserId) -> Option<&User> {
        self.users.get(&user_id)
    }

    pub fn find_by_email(&self, email: &str) -> Option<&User> {
        self.by_email.get(email).and_then(|id| self.users.get(id))
    }

    pub fn find_by_telephone(&self, telephone: &str) -> Option<&User> {
        self.by_telephone.get(telephone).and_then(|id| self.users.get(id))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn rekey(
    index: &mut HashMap<String, UserId>,
    old: Option<&String>,
    new: Option<&String>,
    user_id: UserId,
) {
    if let Some(old) = old {
        index.remove(old);
    }
    if let Some(new) = new {
        index.insert(new.clone(), user_id);
    }
}
