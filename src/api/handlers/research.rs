use crate::{
    AppState,
    research::{
        ChannelReporter, LogReporter, ResearchError, ResearchPhase, ResearchQuery, StatusUpdate,
    },
    types::{AppError, ErrorResponse, ResearchRequest, ResearchResponse, Result},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::Serialize;
use std::convert::Infallible;
use tracing::Instrument;
use uuid::Uuid;

/// Room for every phase of one request
const STATUS_CHANNEL_CAPACITY: usize = ResearchPhase::ALL.len();

/// Run research on a query and return the full report
#[utoipa::path(
    post,
    path = "/research",
    request_body = ResearchRequest,
    responses(
        (status = 200, description = "Research completed", body = ResearchResponse),
        (status = 400, description = "Missing, blank, or invalid query", body = ErrorResponse),
        (status = 413, description = "Request body too large", body = ErrorResponse),
        (status = 500, description = "Research pipeline failed", body = ErrorResponse)
    ),
    tag = "research"
)]
pub async fn research(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ResearchRequest>, JsonRejection>,
) -> Result<Json<ResearchResponse>> {
    let query = validate_request(&state, payload)?;
    let span = request_span(&query);

    async move {
        tracing::info!("research request accepted");
        let report = state.coordinator.research(&query, &LogReporter).await?;
        Ok(Json(ResearchResponse::from(report)))
    }
    .instrument(span)
    .await
}

/// Run research on a query, streaming phase updates before the report
///
/// Emits `status` events (`{phase, message}`), then one `report` event with
/// the same body as `POST /research`, or one `error` event.
#[utoipa::path(
    post,
    path = "/research/stream",
    request_body = ResearchRequest,
    responses(
        (status = 200, description = "Server-sent event stream", body = String, content_type = "text/event-stream"),
        (status = 400, description = "Missing, blank, or invalid query", body = ErrorResponse)
    ),
    tag = "research"
)]
pub async fn research_stream(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ResearchRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let query = validate_request(&state, payload)?;
    let span = request_span(&query);
    let coordinator = state.coordinator.clone();

    let stream = async_stream::stream! {
        let (reporter, mut updates) = ChannelReporter::new(STATUS_CHANNEL_CAPACITY);
        // Dropping this future (client went away) kills the pipeline process
        let research = coordinator
            .research(&query, &reporter)
            .instrument(span.clone());
        tokio::pin!(research);

        loop {
            let step = tokio::select! {
                biased;
                Some(phase) = updates.recv() => Step::Phase(phase),
                outcome = &mut research => Step::Done(outcome),
            };

            match step {
                Step::Phase(phase) => yield Ok(status_event(phase)),
                Step::Done(outcome) => {
                    while let Ok(phase) = updates.try_recv() {
                        yield Ok(status_event(phase));
                    }
                    yield Ok(match outcome {
                        Ok(report) => json_event("report", &ResearchResponse::from(report)),
                        Err(e) => {
                            let err = AppError::from(e);
                            span.in_scope(|| tracing::error!("streamed research failed: {}", err));
                            json_event("error", &err.to_error_response())
                        }
                    });
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// List the progress phases a research request moves through
#[utoipa::path(
    get,
    path = "/research/phases",
    responses(
        (status = 200, description = "Phase vocabulary in lifecycle order", body = [StatusUpdate])
    ),
    tag = "research"
)]
pub async fn research_phases() -> Json<Vec<StatusUpdate>> {
    Json(ResearchPhase::ALL.into_iter().map(StatusUpdate::from).collect())
}

enum Step<T> {
    Phase(ResearchPhase),
    Done(T),
}

/// Turn the raw request body into a query, before anything is spawned.
///
/// Well-formed JSON whose `query` is not a string counts as a missing query.
fn validate_request(
    state: &AppState,
    payload: std::result::Result<Json<ResearchRequest>, JsonRejection>,
) -> Result<ResearchQuery> {
    let Json(request) = payload.map_err(|rejection| match rejection {
        JsonRejection::JsonDataError(_) => AppError::from(ResearchError::EmptyQuery),
        other => AppError::from(other),
    })?;
    let raw = request.query.as_deref().unwrap_or_default();
    Ok(ResearchQuery::parse(raw, state.config.pipeline.max_query_chars)?)
}

fn request_span(query: &ResearchQuery) -> tracing::Span {
    tracing::info_span!(
        "research.request",
        request_id = %Uuid::new_v4(),
        query_chars = query.as_str().chars().count()
    )
}

fn status_event(phase: ResearchPhase) -> Event {
    json_event("status", &StatusUpdate::from(phase))
}

fn json_event<T: Serialize>(name: &'static str, payload: &T) -> Event {
    match Event::default().event(name).json_data(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!("failed to encode {} event: {}", name, e);
            Event::default()
                .event("error")
                .data(r#"{"error":"Internal server error"}"#)
        }
    }
}
