use axum::extract::{Extension, Path, Query};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, NaiveDateTime};

use crate::entities::{DiscussionId, DATETIME_FORMAT};
use crate::http::error::{ApiError};
use crate::http::{ApiContext, Result};
use crate::service::{
    CreateRequest, DiscussionRecord, DiscussionRequest, DiscussionResponse, QueryType,
    SearchRequest, UpdateRequest,
};

pub fn router() -> Router {
    Router::new()
        .route("/api/discussions", get(search_discussions).post(create_discussion))
        .route("/api/discussions/:discussion_id", get(get_discussion).put(update_discussion).delete(delete_discussion))
}

#[derive(serde::Deserialize, Debug)]
struct SearchParams {
    query_type: QueryType,
    search_text: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    tags: Option<String>,
}

#[derive(serde::Deserialize, Debug)]
struct DiscussionBody {
    text: Option<String>,
    created_on: Option<String>,
    tags: Option<Vec<String>>,
}

async fn search_discussions(
    ctx: Extension<ApiContext>,
    Query(params): Query<SearchParams>,
) -> Result<Json<DiscussionResponse>> {
    let request = SearchRequest {
        query_type: params.query_type,
        search_text: params.search_text,
        start_date: params.start_date,
        end_date: params.end_date,
        tags: params.tags.map(split_tag_names).unwrap_or_default(),
    };
    let response = ctx.service.handle(DiscussionRequest::Search(request)).await?;
    Ok(Json(response))
}

async fn create_discussion(
    ctx: Extension<ApiContext>,
    Json(body): Json<DiscussionBody>,
) -> Result<Json<DiscussionResponse>> {
    let request = CreateRequest {
        text: body.text,
        created_on: parse_created_on(body.created_on)?,
        tags: body.tags.unwrap_or_default(),
    };
    let response = ctx.service.handle(DiscussionRequest::Create(request)).await?;
    Ok(Json(response))
}

async fn get_discussion(
    ctx: Extension<ApiContext>,
    Path(discussion_id): Path<DiscussionId>,
) -> Result<Json<DiscussionRecord>> {
    let record = ctx.service.get(&discussion_id).await?;
    Ok(Json(record))
}

async fn update_discussion(
    ctx: Extension<ApiContext>,
    Path(discussion_id): Path<DiscussionId>,
    Json(body): Json<DiscussionBody>,
) -> Result<Json<DiscussionResponse>> {
    let request = UpdateRequest {
        discussion_id,
        text: body.text,
        created_on: parse_created_on(body.created_on)?,
        tags: body.tags.unwrap_or_default(),
    };
    let response = ctx.service.handle(DiscussionRequest::Update(request)).await?;
    Ok(Json(response))
}

async fn delete_discussion(
    ctx: Extension<ApiContext>,
    Path(discussion_id): Path<DiscussionId>,
) -> Result<Json<DiscussionResponse>> {
    let response = ctx.service.handle(DiscussionRequest::Delete { discussion_id }).await?;
    Ok(Json(response))
}

// the tags query param carries comma-separated names
fn split_tag_names(tags: String) -> Vec<String> {
    tags.split(',')
        .filter(|x| !x.is_empty())
        .map(|x| x.to_string())
        .collect()
}

fn parse_created_on(created_on: Option<String>) -> Result<Option<NaiveDateTime>> {
    match created_on {
        Some(value) => {
            let parsed = NaiveDateTime::parse_from_str(&value, DATETIME_FORMAT)
                .map_err(|_| ApiError::BadRequest(format!("invalid created_on timestamp: {}", value)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
