//! Field-level encoding of a [`UserRecord`] into a string hash.
//!
//! A cached record is authoritative only when every name in [`REQUIRED_FIELDS`]
//! is present. Values may be empty strings; absence is what matters. The online
//! flag lives in the same hash but is tracked independently of completeness.

use link_database::{OrgRef, UserRecord, UserRole, UserUpdate};

use super::CacheFields;
use crate::types::CacheError;

pub const ONLINE_FIELD: &str = "is_online";
pub const DEPARTMENTS_FIELD: &str = "departments";
const PHONE_FIELD: &str = "phone";

pub const REQUIRED_FIELDS: [&str; 14] = [
    "id",
    "name",
    "email",
    "nickname",
    "role",
    "image",
    "company_id",
    DEPARTMENTS_FIELD,
    "teams",
    "birthday",
    "is_subscribed",
    "created_at",
    "updated_at",
    "entry_date",
];

pub fn is_complete(fields: &CacheFields) -> bool {
    REQUIRED_FIELDS.iter().all(|field| fields.contains_key(*field))
}

/// Every profile field of `record`. The online flag is not included.
pub fn encode_record(record: &UserRecord) -> Result<Vec<(String, String)>, CacheError> {
    Ok(vec![
        pair("id", record.id.to_string()),
        pair("name", record.name.clone()),
        pair("email", record.email.clone()),
        pair("nickname", record.nickname.clone()),
        pair("role", record.role.level().to_string()),
        pair("image", optional(&record.image)),
        pair("company_id", record.company_id.map(|id| id.to_string()).unwrap_or_default()),
        pair(DEPARTMENTS_FIELD, encode_refs(&record.departments)?),
        pair("teams", encode_refs(&record.teams)?),
        pair("birthday", optional(&record.birthday)),
        pair("is_subscribed", encode_bool(record.is_subscribed)),
        pair("created_at", record.created_at.clone()),
        pair("updated_at", record.updated_at.clone()),
        pair("entry_date", optional(&record.entry_date)),
        pair(PHONE_FIELD, optional(&record.phone)),
    ])
}

/// Scalar fields touched by `update`, plus the new `updated_at` stamp.
///
/// Membership changes are not representable as a patch; callers drop the
/// affected list field instead.
pub fn encode_update(update: &UserUpdate, updated_at: &str) -> Vec<(String, String)> {
    let mut fields = vec![pair("updated_at", updated_at.to_string())];
    if let Some(name) = &update.name {
        fields.push(pair("name", name.clone()));
    }
    if let Some(nickname) = &update.nickname {
        fields.push(pair("nickname", nickname.clone()));
    }
    if let Some(phone) = &update.phone {
        fields.push(pair(PHONE_FIELD, phone.clone()));
    }
    if let Some(image) = &update.image {
        fields.push(pair("image", image.clone()));
    }
    if let Some(birthday) = &update.birthday {
        fields.push(pair("birthday", birthday.clone()));
    }
    if let Some(is_subscribed) = update.is_subscribed {
        fields.push(pair("is_subscribed", encode_bool(is_subscribed)));
    }
    if let Some(entry_date) = &update.entry_date {
        fields.push(pair("entry_date", entry_date.clone()));
    }
    if let Some(company_id) = update.company_id {
        fields.push(pair("company_id", company_id.to_string()));
    }
    fields
}

pub fn online_fields(online: bool) -> Vec<(String, String)> {
    vec![pair(ONLINE_FIELD, encode_bool(online))]
}

/// Rebuilds a record from a complete hash. Returns `Ok(None)` when any required field is absent.
pub fn decode_record(fields: &CacheFields) -> Result<Option<UserRecord>, CacheError> {
    if !is_complete(fields) {
        return Ok(None);
    }

    let text = |name: &str| fields.get(name).cloned().unwrap_or_default();
    let level: i64 = parse(fields, "role")?;

    Ok(Some(UserRecord {
        id: parse(fields, "id")?,
        name: text("name"),
        email: text("email"),
        nickname: text("nickname"),
        phone: non_empty(fields.get(PHONE_FIELD)),
        role: UserRole::from_level(level)
            .ok_or_else(|| CacheError::Decode(format!("unknown role level {level}")))?,
        image: non_empty(fields.get("image")),
        birthday: non_empty(fields.get("birthday")),
        is_subscribed: decode_bool(fields.get("is_subscribed").map(String::as_str)),
        company_id: match non_empty(fields.get("company_id")) {
            Some(raw) => Some(
                raw.parse()
                    .map_err(|_| CacheError::Decode(format!("company_id {raw:?}")))?,
            ),
            None => None,
        },
        departments: decode_refs(fields, DEPARTMENTS_FIELD)?,
        teams: decode_refs(fields, "teams")?,
        entry_date: non_empty(fields.get("entry_date")),
        created_at: text("created_at"),
        updated_at: text("updated_at"),
        is_online: decode_bool(fields.get(ONLINE_FIELD).map(String::as_str)),
    }))
}

pub fn decode_bool(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

fn encode_bool(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn pair(name: &str, value: String) -> (String, String) {
    (name.to_string(), value)
}

fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|raw| !raw.is_empty()).cloned()
}

fn parse<T: std::str::FromStr>(fields: &CacheFields, name: &str) -> Result<T, CacheError> {
    let raw = fields.get(name).map(String::as_str).unwrap_or_default();
    raw.parse()
        .map_err(|_| CacheError::Decode(format!("{name} {raw:?}")))
}

fn encode_refs(refs: &[OrgRef]) -> Result<String, CacheError> {
    serde_json::to_string(refs).map_err(|error| CacheError::Decode(error.to_string()))
}

fn decode_refs(fields: &CacheFields, name: &str) -> Result<Vec<OrgRef>, CacheError> {
    match fields.get(name).map(String::as_str) {
        None | Some("") => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|error| CacheError::Decode(format!("{name}: {error}"))),
    }
}
