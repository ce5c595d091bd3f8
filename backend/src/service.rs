//! Request orchestration over the store.
//!
//! Every mutation of a game runs under that game's lock from the first read
//! to the commit. Game rule checks are delegated to `game_core`; a rejected
//! request commits nothing. Saving to disk happens off the request path.

use std::sync::Arc;

use game_core::{
    end_game, generate_game_code, now_millis, ready_to_end, reveal, start_game, steal, Entity,
    Game, GameError, GameEvent, GameRules, GameState, GameStatus, Gift, Participant, UserId,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::locks::{GameGuard, GameLocks};
use crate::store::{EntityStore, MemoryStore, Persistence, SnapshotWriter};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewGame {
    pub name: String,
    pub description: Option<String>,
    pub deadline: Option<u64>,
    pub max_steals_per_gift: Option<u32>,
    pub allow_immediate_steal_back: Option<bool>,
    pub final_steal_round: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GiftDetails {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameView {
    pub game: Game,
    pub participants: Vec<Participant>,
    pub gifts: Vec<Gift>,
    pub turn_order: Vec<UserId>,
    pub rules: GameRules,
    pub is_organizer: bool,
    pub current_player_number: Option<u32>,
    pub ready_to_end: bool,
}

#[derive(Clone)]
pub struct GameService {
    store: Arc<dyn EntityStore>,
    locks: GameLocks,
    create_lock: Arc<Mutex<()>>,
    writer: Option<SnapshotWriter>,
}

impl Default for GameService {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }
}

impl GameService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            locks: GameLocks::default(),
            create_lock: Arc::new(Mutex::new(())),
            writer: None,
        }
    }

    /// Snapshots the store to `persistence` in the background after every
    /// accepted change. Must be called from within a tokio runtime.
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.writer = Some(SnapshotWriter::spawn(persistence, self.store.clone()));
        self
    }

    /// Waits until every accepted change so far has been written out.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    pub fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_game(&self, actor: &str, request: NewGame) -> Result<Game, ServiceError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ServiceError::InvalidInput("game name is required"));
        }
        let defaults = GameRules::default();
        let rules = GameRules {
            max_steals_per_gift: request
                .max_steals_per_gift
                .unwrap_or(defaults.max_steals_per_gift),
            allow_immediate_steal_back: request
                .allow_immediate_steal_back
                .unwrap_or(defaults.allow_immediate_steal_back),
            final_steal_round: request.final_steal_round.unwrap_or(defaults.final_steal_round),
        };
        if rules.max_steals_per_gift < 1 {
            return Err(ServiceError::InvalidInput(
                "max_steals_per_gift must be at least 1",
            ));
        }

        let game = {
            let _guard = self.create_lock.lock().await;
            let code = self.unused_code()?;
            let mut game = Game::new(Uuid::new_v4().to_string(), actor, name, code, rules);
            game.description = non_blank(request.description.clone());
            game.deadline = request.deadline;
            self.store
                .insert_game(game.clone(), Participant::new(game.id.clone(), actor));
            game
        };

        info!(game_id = %game.id, code = %game.code, "game created");
        self.persist();
        Ok(game)
    }

    fn unused_code(&self) -> Result<String, GameError> {
        generate_game_code(&mut rand::thread_rng(), |code| {
            self.store.game_by_code(code).is_some()
        })
    }

    #[instrument(skip(self, code))]
    pub async fn join_game(
        &self,
        game_id: &str,
        actor: &str,
        code: &str,
    ) -> Result<Participant, ServiceError> {
        let _guard = self.lock_game(game_id).await?;
        let game = self
            .store
            .game(game_id)
            .ok_or(GameError::NotFound(Entity::Game))?;

        if !game.code.eq_ignore_ascii_case(code.trim()) {
            return Err(ServiceError::InvalidGameCode);
        }
        if game.status != GameStatus::Waiting {
            return Err(GameError::AlreadyStarted.into());
        }
        if self
            .store
            .participants(game_id)
            .iter()
            .any(|p| p.user_id == actor)
        {
            return Err(ServiceError::AlreadyParticipant);
        }

        let participant = Participant::new(game_id, actor);
        self.store.put_participant(participant.clone());
        info!("participant joined");
        self.persist();
        Ok(participant)
    }

    pub fn find_by_code(&self, code: &str) -> Result<Game, ServiceError> {
        self.store
            .game_by_code(&code.trim().to_ascii_uppercase())
            .ok_or_else(|| GameError::NotFound(Entity::Game).into())
    }

    pub fn list_games(&self, actor: &str) -> Vec<Game> {
        self.store.games_for_user(actor)
    }

    #[instrument(skip(self, details))]
    pub async fn submit_gift(
        &self,
        game_id: &str,
        actor: &str,
        details: GiftDetails,
    ) -> Result<Gift, ServiceError> {
        let url = required_url(&details)?;
        let _guard = self.lock_game(game_id).await?;
        let game = self
            .store
            .game(game_id)
            .ok_or(GameError::NotFound(Entity::Game))?;

        if game.status != GameStatus::Waiting {
            return Err(ServiceError::SubmissionsClosed);
        }
        if !self
            .store
            .participants(game_id)
            .iter()
            .any(|p| p.user_id == actor)
        {
            return Err(GameError::Forbidden.into());
        }
        if game.deadline.is_some_and(|deadline| now_millis() > deadline) {
            return Err(ServiceError::DeadlinePassed);
        }

        let mut gift = Gift::new(Uuid::new_v4().to_string(), game_id, actor, url);
        gift.title = non_blank(details.title);
        gift.description = non_blank(details.description);
        gift.image_url = non_blank(details.image_url);
        self.store.put_gift(gift.clone());

        debug!(gift_id = %gift.id, "gift submitted");
        self.persist();
        Ok(gift)
    }

    /// Only the submitter may look at a gift outside the game view.
    pub fn get_gift(&self, actor: &str, gift_id: &str) -> Result<Gift, ServiceError> {
        let gift = self
            .store
            .gift(gift_id)
            .ok_or(GameError::NotFound(Entity::Gift))?;
        if gift.submitter_id != actor {
            return Err(GameError::Forbidden.into());
        }
        Ok(gift)
    }

    #[instrument(skip(self, details))]
    pub async fn update_gift(
        &self,
        actor: &str,
        gift_id: &str,
        details: GiftDetails,
    ) -> Result<Gift, ServiceError> {
        let url = required_url(&details)?;
        let game_id = self.get_gift(actor, gift_id)?.game_id;
        let _guard = self.locks.acquire(&game_id).await;
        let mut gift = self.editable_gift(actor, gift_id)?;

        gift.url = url;
        gift.title = non_blank(details.title);
        gift.description = non_blank(details.description);
        gift.image_url = non_blank(details.image_url);
        self.store.put_gift(gift.clone());

        debug!("gift updated");
        self.persist();
        Ok(gift)
    }

    #[instrument(skip(self))]
    pub async fn delete_gift(&self, actor: &str, gift_id: &str) -> Result<(), ServiceError> {
        let game_id = self.get_gift(actor, gift_id)?.game_id;
        let _guard = self.locks.acquire(&game_id).await;
        self.editable_gift(actor, gift_id)?;

        self.store.remove_gift(gift_id);
        debug!("gift deleted");
        self.persist();
        Ok(())
    }

    /// Re-reads the gift under its game's lock and checks it may still change.
    fn editable_gift(&self, actor: &str, gift_id: &str) -> Result<Gift, ServiceError> {
        let gift = self.get_gift(actor, gift_id)?;
        let game = self
            .store
            .game(&gift.game_id)
            .ok_or(GameError::NotFound(Entity::Game))?;
        if game.status != GameStatus::Waiting {
            return Err(ServiceError::SubmissionsClosed);
        }
        Ok(gift)
    }

    /// Starts the game. `seed` pins the shuffle for reproducible turn orders.
    #[instrument(skip(self))]
    pub async fn start_game(
        &self,
        game_id: &str,
        actor: &str,
        seed: Option<u64>,
    ) -> Result<Vec<GameEvent>, ServiceError> {
        let mut rng = seed
            .map(ChaCha8Rng::seed_from_u64)
            .unwrap_or_else(ChaCha8Rng::from_entropy);
        self.apply(game_id, actor, "start", |state| {
            start_game(state, actor, &mut rng)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn reveal(
        &self,
        game_id: &str,
        actor: &str,
        gift_id: &str,
    ) -> Result<Vec<GameEvent>, ServiceError> {
        self.apply(game_id, actor, "reveal", |state| reveal(state, actor, gift_id))
            .await
    }

    #[instrument(skip(self))]
    pub async fn steal(
        &self,
        game_id: &str,
        actor: &str,
        gift_id: &str,
    ) -> Result<Vec<GameEvent>, ServiceError> {
        self.apply(game_id, actor, "steal", |state| steal(state, actor, gift_id))
            .await
    }

    #[instrument(skip(self))]
    pub async fn end_game(&self, game_id: &str, actor: &str) -> Result<Vec<GameEvent>, ServiceError> {
        self.apply(game_id, actor, "end", |state| end_game(state, actor))
            .await
    }

    pub fn game_view(&self, game_id: &str, actor: &str) -> Result<GameView, ServiceError> {
        let state = self
            .store
            .load(game_id)
            .ok_or(GameError::NotFound(Entity::Game))?;

        let is_organizer = state.game.organizer_id == actor;
        let current_player_number = match state.participant(actor) {
            Some(participant) => participant.player_number,
            None if is_organizer => None,
            None => return Err(GameError::Forbidden.into()),
        };

        let ready = ready_to_end(&state);
        let GameState {
            game,
            mut participants,
            gifts,
            ..
        } = state;
        participants.sort_by_key(|p| (p.player_number.unwrap_or(u32::MAX), p.joined_at));

        Ok(GameView {
            turn_order: game.turn_order.clone(),
            rules: game.rules.clone(),
            game,
            participants,
            gifts,
            is_organizer,
            current_player_number,
            ready_to_end: ready,
        })
    }

    async fn apply<F>(
        &self,
        game_id: &str,
        actor: &str,
        operation: &'static str,
        op: F,
    ) -> Result<Vec<GameEvent>, ServiceError>
    where
        F: FnOnce(&mut GameState) -> Result<Vec<GameEvent>, GameError> + Send,
    {
        let _guard = self.lock_game(game_id).await?;
        let mut state = self
            .store
            .load(game_id)
            .ok_or(GameError::NotFound(Entity::Game))?;
        let logged = state.actions.len();

        let events = match op(&mut state) {
            Ok(events) => events,
            Err(err) => {
                warn!(game_id, actor, operation, kind = err.kind(), "request rejected");
                return Err(err.into());
            }
        };

        self.store.commit(&state, &state.actions[logged..]);
        log_events(game_id, &events);
        self.persist();
        Ok(events)
    }

    /// Only known games get a lock entry, so made-up ids cannot grow the
    /// registry.
    async fn lock_game(&self, game_id: &str) -> Result<GameGuard, ServiceError> {
        if self.store.game(game_id).is_none() {
            return Err(GameError::NotFound(Entity::Game).into());
        }
        Ok(self.locks.acquire(game_id).await)
    }

    fn persist(&self) {
        if let Some(writer) = &self.writer {
            writer.request();
        }
    }
}

fn log_events(game_id: &str, events: &[GameEvent]) {
    for event in events {
        match event {
            GameEvent::GameStarted { turn_order } => {
                info!(game_id, players = turn_order.len(), "game started")
            }
            GameEvent::GameEnded { automatic } => info!(game_id, automatic, "game ended"),
            GameEvent::GiftStolen {
                from: None,
                to,
                gift_id,
            } => warn!(
                game_id,
                %gift_id,
                %to,
                "stole a revealed gift that had no recorded owner"
            ),
            other => debug!(game_id, event = ?other, "game event"),
        }
    }
}

fn required_url(details: &GiftDetails) -> Result<String, ServiceError> {
    let url = details.url.trim();
    if url.is_empty() {
        return Err(ServiceError::InvalidInput("gift url is required"));
    }
    Ok(url.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
