use chrono::{NaiveDate, NaiveDateTime};

pub type DiscussionId = i64;
pub type TagId = i64;

/// Wire format for discussion timestamps, e.g. `2024-05-17 09:30:00`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Wire format for bare dates, e.g. `2024-05-17`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Discussion {
    pub id: DiscussionId,
    pub text: String,
    pub created_on: NaiveDateTime,
    pub created_on_date: NaiveDate,
    pub tag_ids: Vec<TagId>,
}

impl Discussion {
    /// The only constructor: `created_on_date` is always derived from `created_on`.
    pub fn new(id: DiscussionId, text: String, created_on: NaiveDateTime, tag_ids: Vec<TagId>) -> Self {
        Self {
            id,
            text,
            created_on,
            created_on_date: created_on.date(),
            tag_ids,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}
