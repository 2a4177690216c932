use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::client::ConfabClient;
use crate::entities::{Discussion, DiscussionId, TagId, DATETIME_FORMAT, DATE_FORMAT};
use crate::error::ConfabError;
use crate::storage::Storage;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("text search query is empty")]
    EmptySearchText,
    #[error("start date or end date is missing")]
    MissingDateBound,
    #[error("start date greater than end date")]
    StartDateAfterEndDate,
    #[error("discussion text is empty")]
    EmptyText,
    #[error("created_on timestamp is missing")]
    MissingCreatedOn,
    #[error("tag name is empty")]
    EmptyTagName,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no discussion found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] ConfabError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Text,
    Date,
    Tag,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query_type: QueryType,
    pub search_text: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    Text { search_text: String },
    Date { start_date: NaiveDate, end_date: NaiveDate },
    Tags { tag_names: Vec<String> },
}

impl SearchRequest {
    pub fn validate(self) -> Result<SearchQuery, ValidationError> {
        match self.query_type {
            QueryType::Text => {
                let search_text = self.search_text.unwrap_or_default();
                if search_text.is_empty() {
                    return Err(ValidationError::EmptySearchText);
                }
                Ok(SearchQuery::Text { search_text })
            }
            QueryType::Date => match (self.start_date, self.end_date) {
                (Some(start_date), Some(end_date)) => {
                    if start_date > end_date {
                        return Err(ValidationError::StartDateAfterEndDate);
                    }
                    Ok(SearchQuery::Date { start_date, end_date })
                }
                _ => Err(ValidationError::MissingDateBound),
            },
            QueryType::Tag => {
                let tag_names = self.tags.into_iter().filter(|x| !x.is_empty()).collect();
                Ok(SearchQuery::Tags { tag_names })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub text: Option<String>,
    pub created_on: Option<NaiveDateTime>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDiscussion {
    pub text: String,
    pub created_on: NaiveDateTime,
    pub tag_names: Vec<String>,
}

impl CreateRequest {
    pub fn validate(self) -> Result<NewDiscussion, ValidationError> {
        let text = self.text.unwrap_or_default();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let created_on = self.created_on.ok_or(ValidationError::MissingCreatedOn)?;
        if self.tags.iter().any(|x| x.is_empty()) {
            return Err(ValidationError::EmptyTagName);
        }
        Ok(NewDiscussion { text, created_on, tag_names: self.tags })
    }
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub discussion_id: DiscussionId,
    pub text: Option<String>,
    pub created_on: Option<NaiveDateTime>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscussionUpdate {
    pub discussion_id: DiscussionId,
    pub text: String,
    pub created_on: NaiveDateTime,
    pub tag_names: Vec<String>,
}

impl UpdateRequest {
    pub fn validate(self) -> Result<DiscussionUpdate, ValidationError> {
        let text = self.text.unwrap_or_default();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let created_on = self.created_on.ok_or(ValidationError::MissingCreatedOn)?;
        if self.tags.iter().any(|x| x.is_empty()) {
            return Err(ValidationError::EmptyTagName);
        }
        Ok(DiscussionUpdate {
            discussion_id: self.discussion_id,
            text,
            created_on,
            tag_names: self.tags,
        })
    }
}

#[derive(Debug)]
pub enum DiscussionRequest {
    Search(SearchRequest),
    Create(CreateRequest),
    Update(UpdateRequest),
    Delete { discussion_id: DiscussionId },
}

/// Row shape returned to callers: every column rendered as text, tag names in attach order.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DiscussionRecord {
    pub id: String,
    pub text: String,
    pub created_on: String,
    pub created_on_date: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DeleteAck {
    pub result: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DiscussionResponse {
    Discussions(Vec<DiscussionRecord>),
    Discussion(DiscussionRecord),
    Acknowledged(DeleteAck),
}

/// Serializes every mutation behind one write lock, so a lookup-or-create of the same
/// tag name cannot race itself into duplicate rows.
pub struct DiscussionService<S: Storage> {
    client: RwLock<ConfabClient<S>>,
}

impl<S: Storage> DiscussionService<S> {
    pub fn new(client: ConfabClient<S>) -> Self {
        Self { client: RwLock::new(client) }
    }

    pub async fn handle(&self, request: DiscussionRequest) -> Result<DiscussionResponse, ServiceError> {
        match request {
            DiscussionRequest::Search(request) => {
                let found = self.search(request).await?;
                Ok(DiscussionResponse::Discussions(found))
            }
            DiscussionRequest::Create(request) => {
                let record = self.create(request).await?;
                Ok(DiscussionResponse::Discussion(record))
            }
            DiscussionRequest::Update(request) => {
                let record = self.update(request).await?;
                Ok(DiscussionResponse::Discussion(record))
            }
            DiscussionRequest::Delete { discussion_id } => {
                self.delete(&discussion_id).await?;
                Ok(DiscussionResponse::Acknowledged(DeleteAck { result: true }))
            }
        }
    }

    pub async fn get(&self, discussion_id: &DiscussionId) -> Result<DiscussionRecord, ServiceError> {
        let client = self.client.read().await;
        let discussion = client.get_discussion_by_id(discussion_id).ok_or(ServiceError::NotFound)?;
        Ok(to_record(&client, &discussion))
    }

    pub async fn search(&self, request: SearchRequest) -> Result<Vec<DiscussionRecord>, ServiceError> {
        let query = request.validate()?;
        let client = self.client.read().await;
        let found = match &query {
            SearchQuery::Text { search_text } => client.search_by_text(search_text),
            SearchQuery::Date { start_date, end_date } => client.search_by_date_range(*start_date, *end_date),
            SearchQuery::Tags { tag_names } => client.search_by_tags(tag_names),
        };
        Ok(found.iter().map(|x| to_record(&client, x)).collect())
    }

    pub async fn create(&self, request: CreateRequest) -> Result<DiscussionRecord, ServiceError> {
        let new_discussion = request.validate()?;
        let mut client = self.client.write().await;
        let tag_ids = resolve_tag_ids(&mut client, &new_discussion.tag_names).await?;
        let discussion = client
            .create_discussion(new_discussion.text, new_discussion.created_on, tag_ids)
            .await?;
        Ok(to_record(&client, &discussion))
    }

    /// Validation runs before the id is resolved, and the id is resolved
    /// before any tag rows are created. A doomed update never mints tags.
    pub async fn update(&self, request: UpdateRequest) -> Result<DiscussionRecord, ServiceError> {
        let update = request.validate()?;
        let mut client = self.client.write().await;
        if client.get_discussion_by_id(&update.discussion_id).is_none() {
            return Err(ServiceError::NotFound);
        }
        let tag_ids = resolve_tag_ids(&mut client, &update.tag_names).await?;
        let discussion = client
            .update_discussion(update.discussion_id, update.text, update.created_on, tag_ids)
            .await?
            .ok_or(ServiceError::NotFound)?;
        Ok(to_record(&client, &discussion))
    }

    pub async fn delete(&self, discussion_id: &DiscussionId) -> Result<(), ServiceError> {
        let mut client = self.client.write().await;
        client.delete_discussion(discussion_id).await?.ok_or(ServiceError::NotFound)?;
        Ok(())
    }
}

// looks every name up and creates the missing ones, duplicates attach once
async fn resolve_tag_ids<S: Storage>(
    client: &mut ConfabClient<S>,
    tag_names: &[String],
) -> Result<Vec<TagId>, ServiceError> {
    let mut tag_ids: Vec<TagId> = Vec::with_capacity(tag_names.len());
    for name in tag_names {
        let tag = match client.find_tag_by_name(name) {
            Some(tag) => tag,
            None => client.create_tag(name).await?,
        };
        if !tag_ids.contains(&tag.id) {
            tag_ids.push(tag.id);
        }
    }
    Ok(tag_ids)
}

fn to_record<S: Storage>(client: &ConfabClient<S>, discussion: &Discussion) -> DiscussionRecord {
    let tags = discussion.tag_ids.iter()
        .filter_map(|id| client.get_tag_by_id(id))
        .map(|tag| tag.name)
        .collect();
    DiscussionRecord {
        id: discussion.id.to_string(),
        text: discussion.text.clone(),
        created_on: discussion.created_on.format(DATETIME_FORMAT).to_string(),
        created_on_date: discussion.created_on_date.format(DATE_FORMAT).to_string(),
        tags,
    }
}
