//! Entity storage: the [`EntityStore`] seam, an in-memory implementation and
//! JSON file persistence.
//!
//! Records on disk keep a flat row shape, one table per entity. Flags may
//! arrive as JSON booleans or as 0/1 integers; both are normalized to `bool`
//! here so nothing past this module ever sees an integer flag.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use game_core::{
    Action, Game, GameId, GameRules, GameState, GameStatus, Gift, GiftId, Participant, UserId,
};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::watch;

pub trait EntityStore: Send + Sync {
    fn game(&self, game_id: &str) -> Option<Game>;
    fn game_by_code(&self, code: &str) -> Option<Game>;
    /// Games the user organizes or plays in, newest first.
    fn games_for_user(&self, user_id: &str) -> Vec<Game>;
    /// In join order.
    fn participants(&self, game_id: &str) -> Vec<Participant>;
    /// In submission order.
    fn gifts(&self, game_id: &str) -> Vec<Gift>;
    fn gift(&self, gift_id: &str) -> Option<Gift>;
    /// In log order.
    fn actions(&self, game_id: &str) -> Vec<Action>;

    /// Creates the game together with its organizer's participant row.
    fn insert_game(&self, game: Game, organizer: Participant);
    fn put_participant(&self, participant: Participant);
    fn put_gift(&self, gift: Gift);
    fn remove_gift(&self, gift_id: &str) -> bool;

    /// Writes back the game row, its participants and gifts, and appends
    /// `appended` to its action log, as one atomic step.
    fn commit(&self, state: &GameState, appended: &[Action]);

    fn export(&self) -> StoreSnapshot;

    fn load(&self, game_id: &str) -> Option<GameState> {
        let game = self.game(game_id)?;
        Some(GameState {
            participants: self.participants(game_id),
            gifts: self.gifts(game_id),
            actions: self.actions(game_id),
            game,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    pub organizer_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub game_code: String,
    pub status: GameStatus,
    #[serde(default)]
    pub turn_order: Vec<UserId>,
    pub current_turn: Option<u32>,
    #[serde(default)]
    pub max_steals_per_gift: u32,
    #[serde(default = "default_true", deserialize_with = "flag")]
    pub allow_immediate_steal_back: bool,
    #[serde(default, deserialize_with = "flag")]
    pub final_steal_round: bool,
    pub deadline: Option<u64>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GiftRecord {
    pub id: GiftId,
    pub game_id: GameId,
    pub user_id: UserId,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub is_revealed: bool,
    pub current_owner_id: Option<UserId>,
    pub previous_owner_id: Option<UserId>,
    #[serde(default)]
    pub steal_count: u32,
    pub created_at: u64,
}

fn default_true() -> bool {
    true
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Int(value) => value != 0,
    })
}

impl From<Game> for GameRecord {
    fn from(game: Game) -> Self {
        Self {
            id: game.id,
            organizer_id: game.organizer_id,
            name: game.name,
            description: game.description,
            game_code: game.code,
            status: game.status,
            turn_order: game.turn_order,
            current_turn: game.current_turn,
            max_steals_per_gift: game.rules.max_steals_per_gift,
            allow_immediate_steal_back: game.rules.allow_immediate_steal_back,
            final_steal_round: game.rules.final_steal_round,
            deadline: game.deadline,
            created_at: game.created_at,
            started_at: game.started_at,
            ended_at: game.ended_at,
        }
    }
}

impl From<GameRecord> for Game {
    fn from(record: GameRecord) -> Self {
        let max_steals_per_gift = match record.max_steals_per_gift {
            0 => GameRules::default().max_steals_per_gift,
            n => n,
        };
        Self {
            id: record.id,
            organizer_id: record.organizer_id,
            name: record.name,
            description: record.description,
            code: record.game_code,
            status: record.status,
            turn_order: record.turn_order,
            current_turn: record.current_turn,
            rules: GameRules {
                max_steals_per_gift,
                allow_immediate_steal_back: record.allow_immediate_steal_back,
                final_steal_round: record.final_steal_round,
            },
            deadline: record.deadline,
            created_at: record.created_at,
            started_at: record.started_at,
            ended_at: record.ended_at,
        }
    }
}

impl From<Gift> for GiftRecord {
    fn from(gift: Gift) -> Self {
        Self {
            id: gift.id,
            game_id: gift.game_id,
            user_id: gift.submitter_id,
            url: gift.url,
            title: gift.title,
            description: gift.description,
            image_url: gift.image_url,
            is_revealed: gift.is_revealed,
            current_owner_id: gift.current_owner_id,
            previous_owner_id: gift.previous_owner_id,
            steal_count: gift.steal_count,
            created_at: gift.created_at,
        }
    }
}

impl From<GiftRecord> for Gift {
    fn from(record: GiftRecord) -> Self {
        Self {
            id: record.id,
            game_id: record.game_id,
            submitter_id: record.user_id,
            url: record.url,
            title: record.title,
            description: record.description,
            image_url: record.image_url,
            is_revealed: record.is_revealed,
            current_owner_id: record.current_owner_id,
            previous_owner_id: record.previous_owner_id,
            steal_count: record.steal_count,
            created_at: record.created_at,
        }
    }
}

/// Full dump of a store, as written to the persistence file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub games: Vec<GameRecord>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub gifts: Vec<GiftRecord>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Default)]
struct Tables {
    games: HashMap<GameId, Game>,
    participants: Vec<Participant>,
    gifts: Vec<Gift>,
    actions: Vec<Action>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let tables = Tables {
            games: snapshot
                .games
                .into_iter()
                .map(|record| (record.id.clone(), Game::from(record)))
                .collect(),
            participants: snapshot.participants,
            gifts: snapshot.gifts.into_iter().map(Gift::from).collect(),
            actions: snapshot.actions,
        };
        Self {
            tables: RwLock::new(tables),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Tables {
    fn state(&self, game_id: &str) -> Option<GameState> {
        let game = self.games.get(game_id)?.clone();
        let mut actions: Vec<Action> = self
            .actions
            .iter()
            .filter(|a| a.game_id == game_id)
            .cloned()
            .collect();
        actions.sort_by_key(|a| a.seq);
        Some(GameState {
            game,
            participants: self
                .participants
                .iter()
                .filter(|p| p.game_id == game_id)
                .cloned()
                .collect(),
            gifts: self
                .gifts
                .iter()
                .filter(|g| g.game_id == game_id)
                .cloned()
                .collect(),
            actions,
        })
    }
}

impl EntityStore for MemoryStore {
    fn game(&self, game_id: &str) -> Option<Game> {
        self.read().games.get(game_id).cloned()
    }

    fn game_by_code(&self, code: &str) -> Option<Game> {
        self.read().games.values().find(|g| g.code == code).cloned()
    }

    fn games_for_user(&self, user_id: &str) -> Vec<Game> {
        let tables = self.read();
        let mut games: Vec<Game> = tables
            .games
            .values()
            .filter(|g| {
                g.organizer_id == user_id
                    || tables
                        .participants
                        .iter()
                        .any(|p| p.game_id == g.id && p.user_id == user_id)
            })
            .cloned()
            .collect();
        games.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        games
    }

    fn participants(&self, game_id: &str) -> Vec<Participant> {
        self.read()
            .participants
            .iter()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect()
    }

    fn gifts(&self, game_id: &str) -> Vec<Gift> {
        self.read()
            .gifts
            .iter()
            .filter(|g| g.game_id == game_id)
            .cloned()
            .collect()
    }

    fn gift(&self, gift_id: &str) -> Option<Gift> {
        self.read().gifts.iter().find(|g| g.id == gift_id).cloned()
    }

    fn actions(&self, game_id: &str) -> Vec<Action> {
        let mut actions: Vec<Action> = self
            .read()
            .actions
            .iter()
            .filter(|a| a.game_id == game_id)
            .cloned()
            .collect();
        actions.sort_by_key(|a| a.seq);
        actions
    }

    fn insert_game(&self, game: Game, organizer: Participant) {
        let mut tables = self.write();
        tables.games.insert(game.id.clone(), game);
        tables.participants.push(organizer);
    }

    fn put_participant(&self, participant: Participant) {
        let mut tables = self.write();
        let existing = tables
            .participants
            .iter()
            .position(|p| p.game_id == participant.game_id && p.user_id == participant.user_id);
        match existing {
            Some(index) => tables.participants[index] = participant,
            None => tables.participants.push(participant),
        }
    }

    fn put_gift(&self, gift: Gift) {
        let mut tables = self.write();
        match tables.gifts.iter().position(|g| g.id == gift.id) {
            Some(index) => tables.gifts[index] = gift,
            None => tables.gifts.push(gift),
        }
    }

    fn remove_gift(&self, gift_id: &str) -> bool {
        let mut tables = self.write();
        let before = tables.gifts.len();
        tables.gifts.retain(|g| g.id != gift_id);
        tables.gifts.len() != before
    }

    fn commit(&self, state: &GameState, appended: &[Action]) {
        let mut tables = self.write();
        tables
            .games
            .insert(state.game.id.clone(), state.game.clone());
        for participant in &state.participants {
            if let Some(existing) = tables
                .participants
                .iter_mut()
                .find(|p| p.game_id == participant.game_id && p.user_id == participant.user_id)
            {
                *existing = participant.clone();
            }
        }
        for gift in &state.gifts {
            if let Some(existing) = tables.gifts.iter_mut().find(|g| g.id == gift.id) {
                *existing = gift.clone();
            }
        }
        tables.actions.extend_from_slice(appended);
    }

    fn export(&self) -> StoreSnapshot {
        let tables = self.read();
        let mut games: Vec<GameRecord> = tables.games.values().cloned().map(GameRecord::from).collect();
        games.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        StoreSnapshot {
            games,
            participants: tables.participants.clone(),
            gifts: tables.gifts.iter().cloned().map(GiftRecord::from).collect(),
            actions: tables.actions.clone(),
        }
    }

    fn load(&self, game_id: &str) -> Option<GameState> {
        self.read().state(game_id)
    }
}

/// The JSON file a store is restored from and snapshotted to.
pub struct Persistence {
    path: PathBuf,
}

impl Persistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads a previously saved snapshot. A missing or unreadable file yields
    /// `None` and the caller starts empty. A file that does not parse is
    /// moved aside to `<path>.corrupt` so the next save cannot clobber it.
    pub async fn load(&self) -> Option<StoreSnapshot> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "could not read saved state");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                let quarantine = self.quarantine_path();
                tracing::warn!(
                    path = %self.path.display(),
                    moved_to = %quarantine.display(),
                    %err,
                    "malformed saved state"
                );
                if let Err(err) = tokio::fs::rename(&self.path, &quarantine).await {
                    tracing::error!(%err, "could not move malformed state aside");
                }
                None
            }
        }
    }

    fn quarantine_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".corrupt");
        PathBuf::from(name)
    }

    pub async fn save(&self, store: &dyn EntityStore) {
        let snapshot = store.export();
        let json = match serde_json::to_vec_pretty(&snapshot) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(%err, "could not serialize state");
                return;
            }
        };
        if let Err(err) = tokio::fs::write(&self.path, json).await {
            tracing::error!(path = %self.path.display(), %err, "persist error");
        }
    }
}

/// Background task that owns the persistence file.
///
/// Requests only bump a version counter; the task wakes, exports the whole
/// store and writes it, so bursts of changes collapse into one write and no
/// request ever waits on disk.
#[derive(Clone)]
pub struct SnapshotWriter {
    requested: Arc<watch::Sender<u64>>,
    written: watch::Receiver<u64>,
}

impl SnapshotWriter {
    /// Must be called from within a tokio runtime.
    pub fn spawn(persistence: Persistence, store: Arc<dyn EntityStore>) -> Self {
        let (requested, mut pending) = watch::channel(0u64);
        let (done, written) = watch::channel(0u64);
        tokio::spawn(async move {
            while pending.changed().await.is_ok() {
                let version = *pending.borrow_and_update();
                persistence.save(store.as_ref()).await;
                done.send_replace(version);
            }
        });
        Self {
            requested: Arc::new(requested),
            written,
        }
    }

    pub fn request(&self) {
        self.requested.send_modify(|version| *version += 1);
    }

    /// Waits until every change requested so far is on disk.
    pub async fn flush(&self) {
        let target = *self.requested.borrow();
        let mut written = self.written.clone();
        if written.wait_for(|version| *version >= target).await.is_err() {
            tracing::error!("snapshot writer stopped before flushing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_flags_normalize_to_bool() {
        let gift: GiftRecord = serde_json::from_value(json!({
            "id": "g1",
            "game_id": "game",
            "user_id": "alice",
            "url": "https://example.com",
            "title": null,
            "description": null,
            "image_url": null,
            "is_revealed": 1,
            "current_owner_id": "bob",
            "previous_owner_id": null,
            "steal_count": 2,
            "created_at": 0
        }))
        .unwrap();
        assert!(Gift::from(gift).is_revealed);

        let game: GameRecord = serde_json::from_value(json!({
            "id": "game",
            "organizer_id": "alice",
            "name": "party",
            "description": null,
            "game_code": "ABC234",
            "status": "waiting",
            "current_turn": null,
            "max_steals_per_gift": 0,
            "allow_immediate_steal_back": 0,
            "final_steal_round": true,
            "deadline": null,
            "created_at": 0,
            "started_at": null,
            "ended_at": null
        }))
        .unwrap();
        let game = Game::from(game);
        assert!(!game.rules.allow_immediate_steal_back);
        assert!(game.rules.final_steal_round);
        assert_eq!(game.rules.max_steals_per_gift, 3);
    }

    #[test]
    fn commit_appends_actions_and_replaces_rows() {
        let store = MemoryStore::default();
        let game = Game::new("game", "alice", "party", "ABC234", GameRules::default());
        store.insert_game(game, Participant::new("game", "alice"));
        store.put_participant(Participant::new("game", "bob"));
        store.put_gift(Gift::new("g1", "game", "alice", "https://example.com/1"));

        let mut state = store.load("game").unwrap();
        assert_eq!(state.participants.len(), 2);
        state.game.status = GameStatus::Active;
        state.gifts[0].is_revealed = true;
        state.gifts[0].current_owner_id = Some("bob".into());
        let action = Action {
            id: "a1".into(),
            game_id: "game".into(),
            seq: 1,
            user_id: "bob".into(),
            action_type: game_core::ActionType::Reveal,
            gift_id: "g1".into(),
            previous_owner_id: None,
            timestamp: 0,
        };
        state.actions.push(action.clone());
        store.commit(&state, &[action]);

        let reloaded = store.load("game").unwrap();
        assert_eq!(reloaded, state);
        assert_eq!(store.games_for_user("bob").len(), 1);
        assert!(store.games_for_user("carol").is_empty());
    }

    #[test]
    fn snapshot_round_trip_restores_store() {
        let store = MemoryStore::default();
        let game = Game::new("game", "alice", "party", "ABC234", GameRules::default());
        store.insert_game(game, Participant::new("game", "alice"));
        store.put_gift(Gift::new("g1", "game", "alice", "https://example.com/1"));

        let json = serde_json::to_vec(&store.export()).unwrap();
        let restored = MemoryStore::from_snapshot(serde_json::from_slice(&json).unwrap());

        assert_eq!(restored.load("game"), store.load("game"));
        assert_eq!(restored.game_by_code("ABC234").map(|g| g.id), Some("game".into()));
        assert!(restored.remove_gift("g1"));
        assert!(!restored.remove_gift("g1"));
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("white_elephant_store_{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn malformed_file_is_moved_aside() {
        let path = temp_path();
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let persistence = Persistence::new(&path);

        assert!(persistence.load().await.is_none());
        assert!(tokio::fs::metadata(&path).await.is_err());
        let quarantine = persistence.quarantine_path();
        assert_eq!(tokio::fs::read(&quarantine).await.unwrap(), b"{ not json");

        let _ = tokio::fs::remove_file(&quarantine).await;
    }

    #[tokio::test]
    async fn writer_flushes_latest_snapshot() {
        let path = temp_path();
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::default());
        let writer = SnapshotWriter::spawn(Persistence::new(&path), store.clone());

        let game = Game::new("game", "alice", "party", "ABC234", GameRules::default());
        store.insert_game(game, Participant::new("game", "alice"));
        writer.request();
        store.put_gift(Gift::new("g1", "game", "alice", "https://example.com/1"));
        writer.request();
        writer.flush().await;

        let snapshot = Persistence::new(&path).load().await.unwrap();
        assert_eq!(snapshot.games.len(), 1);
        assert_eq!(snapshot.gifts.len(), 1);

        let _ = tokio::fs::remove_file(&path).await;
    }
}
