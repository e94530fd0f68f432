use std::collections::BTreeMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use queue_api::{
    ConsumeRequest, ConsumeResponse, CreateConsumerGroupRequest, CreateTopicRequest,
    DeliveredMessage, ErrorCode, PublishRequest, QueueError, UpdateTopicRequest,
};

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════

/// Engine error rendered as `{"error": {"code", "message"}}`.
pub struct ApiError(pub QueueError);

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        Self(e)
    }
}

pub fn status_of(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
        ErrorCode::TopicNotFound | ErrorCode::ConsumerGroupNotFound => StatusCode::NOT_FOUND,
        ErrorCode::TopicAlreadyExists | ErrorCode::ConsumerGroupAlreadyExists => StatusCode::CONFLICT,
        ErrorCode::MessageTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: ErrorCode,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(self.0.code());
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }
        let body = ErrorBody {
            error: ErrorDetail { code: self.0.code(), message: self.0.message() },
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Decode a JSON body; an empty body means `T::default()` when allowed.
fn decode<T: DeserializeOwned + Default>(body: &Bytes, allow_empty: bool) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        if allow_empty {
            return Ok(T::default());
        }
        return Err(QueueError::validation("request body is required").into());
    }
    serde_json::from_slice(body)
        .map_err(|e| QueueError::validation(format!("invalid request body: {e}")).into())
}

// ═══════════════════════════════════════════════════════════════
//  Extractors
// ═══════════════════════════════════════════════════════════════

/// `Path` whose rejection is rendered in the error envelope.
pub(crate) struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(QueueError::validation(rejection.body_text()).into()),
        }
    }
}

/// `Query` whose rejection is rendered in the error envelope.
pub(crate) struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(QueueError::validation(rejection.body_text()).into()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Payload encoding
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    #[default]
    Utf8,
    Base64,
}

impl PayloadEncoding {
    fn decode(self, payload: String) -> ApiResult<Vec<u8>> {
        match self {
            PayloadEncoding::Utf8 => Ok(payload.into_bytes()),
            PayloadEncoding::Base64 => BASE64
                .decode(payload.as_bytes())
                .map_err(|e| QueueError::validation(format!("payload is not valid base64: {e}")).into()),
        }
    }

    /// Text form of `bytes`: verbatim when valid UTF-8, base64 otherwise.
    fn encode(bytes: Vec<u8>) -> (String, PayloadEncoding) {
        match String::from_utf8(bytes) {
            Ok(text) => (text, PayloadEncoding::Utf8),
            Err(e) => (BASE64.encode(e.into_bytes()), PayloadEncoding::Base64),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  DTOs
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublishBody {
    payload: String,
    #[serde(default)]
    encoding: PayloadEncoding,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageView {
    message_id: String,
    topic_id: String,
    sequence_number: u64,
    timestamp: i64,
    content_type: String,
    size: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
    expires_at: i64,
    payload: String,
    encoding: PayloadEncoding,
}

impl From<DeliveredMessage> for MessageView {
    fn from(d: DeliveredMessage) -> Self {
        let (payload, encoding) = PayloadEncoding::encode(d.payload);
        let m = d.message;
        Self {
            message_id: m.message_id,
            topic_id: m.topic_id,
            sequence_number: m.sequence_number,
            timestamp: m.timestamp,
            content_type: m.content_type,
            size: m.size,
            metadata: m.metadata,
            expires_at: m.expires_at,
            payload,
            encoding,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConsumeView {
    messages: Vec<MessageView>,
    next_sequence_number: u64,
}

impl From<ConsumeResponse> for ConsumeView {
    fn from(r: ConsumeResponse) -> Self {
        Self {
            messages: r.messages.into_iter().map(MessageView::from).collect(),
            next_sequence_number: r.next_sequence_number,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListMessagesParams {
    after: Option<u64>,
    limit: Option<usize>,
}

// ═══════════════════════════════════════════════════════════════
//  Health
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ═══════════════════════════════════════════════════════════════
//  Topics
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_topics(State(state): State<AppState>) -> ApiResult<Response> {
    let topics = state.queue.list_topics().await?;
    Ok(Json(topics).into_response())
}

pub(crate) async fn handle_create_topic(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Response> {
    let request: CreateTopicRequest = decode(&body, false)?;
    let topic = state.queue.create_topic(request).await?;
    Ok((StatusCode::CREATED, Json(topic)).into_response())
}

pub(crate) async fn handle_get_topic_by_name(
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
) -> ApiResult<Response> {
    match state.queue.get_topic_by_name(&name).await? {
        Some(topic) => Ok(Json(topic).into_response()),
        None => Err(QueueError::new(
            ErrorCode::TopicNotFound,
            format!("topic named '{name}' not found"),
        )
        .into()),
    }
}

pub(crate) async fn handle_get_topic(
    State(state): State<AppState>,
    ApiPath(topic_id): ApiPath<String>,
) -> ApiResult<Response> {
    let topic = state.queue.get_topic(&topic_id).await?;
    Ok(Json(topic).into_response())
}

pub(crate) async fn handle_update_topic(
    State(state): State<AppState>,
    ApiPath(topic_id): ApiPath<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let request: UpdateTopicRequest = decode(&body, true)?;
    let topic = state.queue.update_topic(&topic_id, request).await?;
    Ok(Json(topic).into_response())
}

pub(crate) async fn handle_delete_topic(
    State(state): State<AppState>,
    ApiPath(topic_id): ApiPath<String>,
) -> ApiResult<Response> {
    state.queue.delete_topic(&topic_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ═══════════════════════════════════════════════════════════════
//  Messages
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_publish(
    State(state): State<AppState>,
    ApiPath(topic_id): ApiPath<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let body: PublishBody = decode(&body, false)?;
    let payload = body.encoding.decode(body.payload)?;
    let request = PublishRequest { payload, content_type: body.content_type, metadata: body.metadata };
    let receipt = state.queue.publish(&topic_id, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}

pub(crate) async fn handle_list_messages(
    State(state): State<AppState>,
    ApiPath(topic_id): ApiPath<String>,
    ApiQuery(params): ApiQuery<ListMessagesParams>,
) -> ApiResult<Response> {
    let messages = state.queue.list_messages(&topic_id, params.after, params.limit).await?;
    let views: Vec<MessageView> = messages.into_iter().map(MessageView::from).collect();
    Ok(Json(views).into_response())
}

// ═══════════════════════════════════════════════════════════════
//  Consumer groups
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_groups(
    State(state): State<AppState>,
    ApiPath(topic_id): ApiPath<String>,
) -> ApiResult<Response> {
    let groups = state.queue.list_consumer_groups(&topic_id).await?;
    Ok(Json(groups).into_response())
}

pub(crate) async fn handle_create_group(
    State(state): State<AppState>,
    ApiPath(topic_id): ApiPath<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let request: CreateConsumerGroupRequest = decode(&body, false)?;
    let group = state.queue.create_consumer_group(&topic_id, request).await?;
    Ok((StatusCode::CREATED, Json(group)).into_response())
}

pub(crate) async fn handle_get_group(
    State(state): State<AppState>,
    ApiPath((topic_id, group_id)): ApiPath<(String, String)>,
) -> ApiResult<Response> {
    let group = state.queue.get_consumer_group(&topic_id, &group_id).await?;
    Ok(Json(group).into_response())
}

pub(crate) async fn handle_delete_group(
    State(state): State<AppState>,
    ApiPath((topic_id, group_id)): ApiPath<(String, String)>,
) -> ApiResult<Response> {
    state.queue.delete_consumer_group(&topic_id, &group_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(crate) async fn handle_get_offset(
    State(state): State<AppState>,
    ApiPath((topic_id, group_id)): ApiPath<(String, String)>,
) -> ApiResult<Response> {
    let offset = state.queue.get_offset(&topic_id, &group_id).await?;
    Ok(Json(offset).into_response())
}

pub(crate) async fn handle_consume(
    State(state): State<AppState>,
    ApiPath((topic_id, group_id)): ApiPath<(String, String)>,
    body: Bytes,
) -> ApiResult<Response> {
    let request: ConsumeRequest = decode(&body, true)?;
    let response = state.queue.consume(&topic_id, &group_id, request).await?;
    Ok(Json(ConsumeView::from(response)).into_response())
}

pub(crate) async fn handle_reset_offset(
    State(state): State<AppState>,
    ApiPath((topic_id, group_id)): ApiPath<(String, String)>,
) -> ApiResult<Response> {
    let offset = state.queue.reset_offset(&topic_id, &group_id).await?;
    Ok(Json(offset).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(status_of(ErrorCode::ValidationError), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ErrorCode::ConsumerGroupNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ErrorCode::TopicAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status_of(ErrorCode::MessageTooLarge), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(status_of(ErrorCode::RateLimitExceeded), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_of(ErrorCode::ServiceUnavailable), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn payload_encoding_round_trip() {
        assert_eq!(PayloadEncoding::encode(b"hi".to_vec()), ("hi".to_string(), PayloadEncoding::Utf8));
        let (text, enc) = PayloadEncoding::encode(vec![0xff, 0x00]);
        assert_eq!(enc, PayloadEncoding::Base64);
        assert_eq!(PayloadEncoding::Base64.decode(text).ok(), Some(vec![0xff, 0x00]));
        assert!(PayloadEncoding::Base64.decode("%%%".into()).is_err());
    }

    #[test]
    fn empty_body_handling() {
        let empty = Bytes::from_static(b"  ");
        let consume: ConsumeRequest = decode(&empty, true).ok().unwrap();
        assert_eq!(consume, ConsumeRequest::default());
        assert!(decode::<CreateTopicRequest>(&empty, false).is_err());
        assert!(decode::<CreateTopicRequest>(&Bytes::from_static(b"{"), false).is_err());
    }
}
