use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::rules;

pub type UserId = String;
pub type GameId = String;
pub type GiftId = String;
pub type ActionId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Active,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameRules {
    pub max_steals_per_gift: u32,
    pub allow_immediate_steal_back: bool,
    pub final_steal_round: bool,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            max_steals_per_gift: 3,
            allow_immediate_steal_back: true,
            final_steal_round: false,
        }
    }
}

/// A single white elephant game.
///
/// `turn_order` is empty and `current_turn` is `None` until the game is
/// started; both are written once at that transition and the order is never
/// rearranged afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Game {
    pub id: GameId,
    pub organizer_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub code: String,
    pub status: GameStatus,
    pub turn_order: Vec<UserId>,
    /// 1-indexed player number whose turn it is.
    pub current_turn: Option<u32>,
    pub rules: GameRules,
    pub deadline: Option<u64>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
}

impl Game {
    pub fn new(
        id: impl Into<GameId>,
        organizer_id: impl Into<UserId>,
        name: impl Into<String>,
        code: impl Into<String>,
        rules: GameRules,
    ) -> Self {
        Self {
            id: id.into(),
            organizer_id: organizer_id.into(),
            name: name.into(),
            description: None,
            code: code.into(),
            status: GameStatus::Waiting,
            turn_order: Vec::new(),
            current_turn: None,
            rules,
            deadline: None,
            created_at: now_millis(),
            started_at: None,
            ended_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub game_id: GameId,
    pub user_id: UserId,
    pub player_number: Option<u32>,
    pub joined_at: u64,
}

impl Participant {
    pub fn new(game_id: impl Into<GameId>, user_id: impl Into<UserId>) -> Self {
        Self {
            game_id: game_id.into(),
            user_id: user_id.into(),
            player_number: None,
            joined_at: now_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gift {
    pub id: GiftId,
    pub game_id: GameId,
    pub submitter_id: UserId,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub is_revealed: bool,
    pub current_owner_id: Option<UserId>,
    pub previous_owner_id: Option<UserId>,
    pub steal_count: u32,
    pub created_at: u64,
}

impl Gift {
    pub fn new(
        id: impl Into<GiftId>,
        game_id: impl Into<GameId>,
        submitter_id: impl Into<UserId>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            game_id: game_id.into(),
            submitter_id: submitter_id.into(),
            url: url.into(),
            title: None,
            description: None,
            image_url: None,
            is_revealed: false,
            current_owner_id: None,
            previous_owner_id: None,
            steal_count: 0,
            created_at: now_millis(),
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.current_owner_id.as_deref() == Some(user_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Reveal,
    Steal,
}

/// Append-only audit record. `seq` orders the log within a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Action {
    pub id: ActionId,
    pub game_id: GameId,
    pub seq: u64,
    pub user_id: UserId,
    pub action_type: ActionType,
    pub gift_id: GiftId,
    pub previous_owner_id: Option<UserId>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum GameEvent {
    GameStarted {
        turn_order: Vec<UserId>,
    },
    GiftRevealed {
        player_id: UserId,
        gift_id: GiftId,
    },
    GiftStolen {
        from: Option<UserId>,
        to: UserId,
        gift_id: GiftId,
    },
    GiftExchanged {
        from: UserId,
        to: UserId,
        gift_id: GiftId,
    },
    TurnChanged {
        player_number: u32,
        player_id: UserId,
    },
    GameEnded {
        automatic: bool,
    },
}

/// Everything the engine needs to validate and apply one request against a
/// game: the game row plus its participants (join order), gifts (creation
/// order) and action log (sequence order).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub game: Game,
    pub participants: Vec<Participant>,
    pub gifts: Vec<Gift>,
    pub actions: Vec<Action>,
}

impl GameState {
    pub fn new(game: Game) -> Self {
        Self {
            game,
            participants: Vec::new(),
            gifts: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn player_number(&self, user_id: &str) -> Option<u32> {
        self.participant(user_id).and_then(|p| p.player_number)
    }

    pub fn player_one(&self) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.player_number == Some(1))
    }

    pub fn user_at(&self, player_number: u32) -> Option<&UserId> {
        self.participants
            .iter()
            .find(|p| p.player_number == Some(player_number))
            .map(|p| &p.user_id)
    }

    pub fn gift(&self, gift_id: &str) -> Option<&Gift> {
        self.gifts.iter().find(|g| g.id == gift_id)
    }

    pub fn gift_index(&self, gift_id: &str) -> Option<usize> {
        self.gifts.iter().position(|g| g.id == gift_id)
    }

    /// Index of a gift currently held by `user_id`, ignoring `except`.
    pub fn owned_gift_index(&self, user_id: &str, except: Option<&str>) -> Option<usize> {
        self.gifts
            .iter()
            .position(|g| g.is_owned_by(user_id) && Some(g.id.as_str()) != except)
    }

    pub fn unrevealed_gifts(&self) -> Vec<&Gift> {
        self.gifts.iter().filter(|g| !g.is_revealed).collect()
    }

    pub fn all_revealed(&self) -> bool {
        rules::all_revealed(&self.gifts)
    }

    pub fn last_action(&self) -> Option<&Action> {
        self.actions.iter().max_by_key(|a| a.seq)
    }

    pub(crate) fn record_action(
        &mut self,
        user_id: &str,
        action_type: ActionType,
        gift_id: &str,
        previous_owner_id: Option<UserId>,
    ) {
        let seq = self.last_action().map(|a| a.seq + 1).unwrap_or(1);
        self.actions.push(Action {
            id: uuid::Uuid::new_v4().to_string(),
            game_id: self.game.id.clone(),
            seq,
            user_id: user_id.to_string(),
            action_type,
            gift_id: gift_id.to_string(),
            previous_owner_id,
            timestamp: now_millis(),
        });
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
