pub mod actions;
pub mod error;
pub mod lifecycle;
pub mod rules;
pub mod turn;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use actions::{reveal, steal};
pub use error::{Entity, GameError};
pub use lifecycle::{end_game, generate_game_code, ready_to_end, start_game};
pub use types::{
    now_millis, Action, ActionId, ActionType, Game, GameEvent, GameId, GameRules, GameState,
    GameStatus, Gift, GiftId, Participant, UserId,
};
