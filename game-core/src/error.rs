use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Game,
    Gift,
    Participant,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Game => f.write_str("game"),
            Entity::Gift => f.write_str("gift"),
            Entity::Participant => f.write_str("participant"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("{0} not found")]
    NotFound(Entity),
    #[error("forbidden")]
    Forbidden,
    #[error("unauthorized")]
    Unauthorized,
    #[error("not your turn")]
    NotYourTurn,
    #[error("game is not active")]
    GameNotActive,
    #[error("game has ended")]
    GameEnded,
    #[error("game has already started")]
    AlreadyStarted,
    #[error("game has already ended")]
    AlreadyEnded,
    #[error("cannot start game: {0}")]
    PreconditionFailed(String),
    #[error("game is not ready to end: all gifts must be revealed and player 1 must finish their final turn")]
    NotReady,
    #[error("gift already revealed")]
    AlreadyRevealed,
    #[error("you cannot reveal your own gift")]
    CannotRevealOwnGift,
    #[error("you already own a gift; steal a gift to exchange it")]
    AlreadyOwnsGift,
    #[error("your gift was stolen; reveal a new gift before stealing")]
    MustRevealFirst,
    #[error("cannot steal this gift")]
    CannotSteal,
    #[error("immediate steal back not allowed")]
    StealBackNotAllowed,
    #[error("could not generate a unique game code after {0} attempts")]
    CodeGenerationExhausted(u32),
}

impl GameError {
    pub fn kind(&self) -> &'static str {
        match self {
            GameError::NotFound(_) => "not_found",
            GameError::Forbidden => "forbidden",
            GameError::Unauthorized => "unauthorized",
            GameError::NotYourTurn => "not_your_turn",
            GameError::GameNotActive => "game_not_active",
            GameError::GameEnded => "game_ended",
            GameError::AlreadyStarted => "already_started",
            GameError::AlreadyEnded => "already_ended",
            GameError::PreconditionFailed(_) => "precondition_failed",
            GameError::NotReady => "not_ready",
            GameError::AlreadyRevealed => "already_revealed",
            GameError::CannotRevealOwnGift => "cannot_reveal_own_gift",
            GameError::AlreadyOwnsGift => "already_owns_gift",
            GameError::MustRevealFirst => "must_reveal_first",
            GameError::CannotSteal => "cannot_steal",
            GameError::StealBackNotAllowed => "steal_back_not_allowed",
            GameError::CodeGenerationExhausted(_) => "code_generation_exhausted",
        }
    }
}
