pub mod config;
pub mod error;
pub mod locks;
pub mod service;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use game_core::{Game, GameError, GameEvent, Gift, Participant};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::service::{GameService, GameView, GiftDetails, NewGame};
use crate::store::{MemoryStore, Persistence};

/// Header carrying the id of the user making the request.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone, Default)]
pub struct AppState {
    pub service: GameService,
}

impl AppState {
    /// Restores the store from `path` when a snapshot exists, and saves back
    /// to it in the background after every accepted change.
    pub async fn with_persistence(path: impl Into<PathBuf>) -> Self {
        let persistence = Persistence::new(path);
        let store = match persistence.load().await {
            Some(snapshot) => {
                tracing::info!(
                    path = %persistence.path().display(),
                    games = snapshot.games.len(),
                    "restored saved state"
                );
                MemoryStore::from_snapshot(snapshot)
            }
            None => MemoryStore::default(),
        };
        Self {
            service: GameService::new(Arc::new(store)).with_persistence(persistence),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/games", post(create_game).get(list_games))
        .route("/games/:id", get(get_game))
        .route("/games/:id/join", post(join_game))
        .route("/games/:id/start", post(start_game))
        .route("/games/:id/reveal", post(reveal_gift))
        .route("/games/:id/steal", post(steal_gift))
        .route("/games/:id/end", post(end_game))
        .route("/codes/:code", get(find_game))
        .route("/gifts", post(submit_gift))
        .route(
            "/gifts/:id",
            get(get_gift).put(update_gift).delete(delete_gift),
        )
        .with_state(state)
}

fn acting_user(headers: &HeaderMap) -> Result<String, ServiceError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ServiceError::Core(GameError::Unauthorized))
}

#[derive(Serialize)]
struct GameResponse {
    game: Game,
}

#[derive(Serialize)]
struct GamesResponse {
    games: Vec<Game>,
}

#[derive(Serialize)]
struct ParticipantResponse {
    participant: Participant,
}

#[derive(Serialize)]
struct GiftResponse {
    gift: Gift,
}

#[derive(Serialize)]
struct EventsResponse {
    events: Vec<GameEvent>,
}

#[derive(Deserialize)]
struct JoinRequest {
    code: String,
}

#[derive(Deserialize)]
struct GiftTarget {
    gift_id: String,
}

#[derive(Deserialize)]
struct SubmitGiftRequest {
    game_id: String,
    #[serde(flatten)]
    details: GiftDetails,
}

#[derive(Deserialize)]
struct StartParams {
    seed: Option<u64>,
}

async fn create_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewGame>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = acting_user(&headers)?;
    let game = state.service.create_game(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(GameResponse { game })))
}

async fn list_games(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<GamesResponse>, ServiceError> {
    let actor = acting_user(&headers)?;
    Ok(Json(GamesResponse {
        games: state.service.list_games(&actor),
    }))
}

async fn get_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<GameView>, ServiceError> {
    let actor = acting_user(&headers)?;
    Ok(Json(state.service.game_view(&game_id, &actor)?))
}

async fn find_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<GameResponse>, ServiceError> {
    acting_user(&headers)?;
    Ok(Json(GameResponse {
        game: state.service.find_by_code(&code)?,
    }))
}

async fn join_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<JoinRequest>,
) -> Result<Json<ParticipantResponse>, ServiceError> {
    let actor = acting_user(&headers)?;
    let participant = state
        .service
        .join_game(&game_id, &actor, &request.code)
        .await?;
    Ok(Json(ParticipantResponse { participant }))
}

async fn start_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<StartParams>,
) -> Result<Json<EventsResponse>, ServiceError> {
    let actor = acting_user(&headers)?;
    let events = state
        .service
        .start_game(&game_id, &actor, params.seed)
        .await?;
    Ok(Json(EventsResponse { events }))
}

async fn reveal_gift(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    headers: HeaderMap,
    Json(target): Json<GiftTarget>,
) -> Result<Json<EventsResponse>, ServiceError> {
    let actor = acting_user(&headers)?;
    let events = state
        .service
        .reveal(&game_id, &actor, &target.gift_id)
        .await?;
    Ok(Json(EventsResponse { events }))
}

async fn steal_gift(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    headers: HeaderMap,
    Json(target): Json<GiftTarget>,
) -> Result<Json<EventsResponse>, ServiceError> {
    let actor = acting_user(&headers)?;
    let events = state
        .service
        .steal(&game_id, &actor, &target.gift_id)
        .await?;
    Ok(Json(EventsResponse { events }))
}

async fn end_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<EventsResponse>, ServiceError> {
    let actor = acting_user(&headers)?;
    let events = state.service.end_game(&game_id, &actor).await?;
    Ok(Json(EventsResponse { events }))
}

async fn submit_gift(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubmitGiftRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = acting_user(&headers)?;
    let gift = state
        .service
        .submit_gift(&request.game_id, &actor, request.details)
        .await?;
    Ok((StatusCode::CREATED, Json(GiftResponse { gift })))
}

async fn get_gift(
    State(state): State<AppState>,
    Path(gift_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<GiftResponse>, ServiceError> {
    let actor = acting_user(&headers)?;
    Ok(Json(GiftResponse {
        gift: state.service.get_gift(&actor, &gift_id)?,
    }))
}

async fn update_gift(
    State(state): State<AppState>,
    Path(gift_id): Path<String>,
    headers: HeaderMap,
    Json(details): Json<GiftDetails>,
) -> Result<Json<GiftResponse>, ServiceError> {
    let actor = acting_user(&headers)?;
    let gift = state.service.update_gift(&actor, &gift_id, details).await?;
    Ok(Json(GiftResponse { gift }))
}

async fn delete_gift(
    State(state): State<AppState>,
    Path(gift_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ServiceError> {
    let actor = acting_user(&headers)?;
    state.service.delete_gift(&actor, &gift_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
