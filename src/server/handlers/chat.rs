use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::Stream;
use serde::Deserialize;
use serde_json::json;

use crate::errors::ApiError;
use crate::rag::{AnswerResult, ChatEvent};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

fn validate_question(question: &str) -> Result<&str, ApiError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("问题不能为空".to_string()));
    }
    Ok(question)
}

pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AnswerResult>, ApiError> {
    let question = validate_question(&request.question)?;
    let result = state.engine.answer(question).await?;
    Ok(Json(result))
}

/// Streaming variant. Events are JSON payloads tagged `references` or
/// `answer`, terminated by a bare `[DONE]` data line.
pub async fn ask_stream(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let question = validate_question(&request.question)?;
    let mut events = state.engine.stream_question(question).await?;

    let stream = async_stream::stream! {
        while let Some(event) = events.recv().await {
            let sse_event = match event {
                ChatEvent::References(references) => Event::default()
                    .data(json!({ "type": "references", "data": references }).to_string()),
                ChatEvent::Answer(text) => {
                    Event::default().data(json!({ "type": "answer", "data": text }).to_string())
                }
                ChatEvent::StreamEnd => Event::default().data("[DONE]"),
            };
            yield Ok(sse_event);
        }
    };

    Ok(Sse::new(stream))
}
