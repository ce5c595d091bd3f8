//! Game-level transitions: waiting -> active -> ended.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::GameError;
use crate::rules;
use crate::types::{now_millis, GameEvent, GameState, GameStatus, UserId};

pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 6;
pub const MAX_CODE_ATTEMPTS: u32 = 10;

pub fn start_game<R: Rng + ?Sized>(
    state: &mut GameState,
    actor: &str,
    rng: &mut R,
) -> Result<Vec<GameEvent>, GameError> {
    if state.game.organizer_id != actor {
        return Err(GameError::Forbidden);
    }
    if state.game.status != GameStatus::Waiting {
        return Err(GameError::AlreadyStarted);
    }
    if state.participants.len() < 2 {
        return Err(GameError::PreconditionFailed(
            "need at least 2 participants to start".into(),
        ));
    }

    let missing = state
        .participants
        .iter()
        .filter(|p| !state.gifts.iter().any(|g| g.submitter_id == p.user_id))
        .count();
    if missing > 0 {
        return Err(GameError::PreconditionFailed(format!(
            "all participants must submit gifts; {missing} participant(s) still need to"
        )));
    }

    let mut turn_order: Vec<UserId> = state.participants.iter().map(|p| p.user_id.clone()).collect();
    turn_order.shuffle(rng);

    for participant in state.participants.iter_mut() {
        participant.player_number = turn_order
            .iter()
            .position(|id| *id == participant.user_id)
            .map(|index| index as u32 + 1);
    }

    state.game.status = GameStatus::Active;
    state.game.turn_order = turn_order.clone();
    state.game.current_turn = Some(1);
    state.game.started_at = Some(now_millis());

    let first = turn_order[0].clone();
    Ok(vec![
        GameEvent::GameStarted { turn_order },
        GameEvent::TurnChanged {
            player_number: 1,
            player_id: first,
        },
    ])
}

pub fn end_game(state: &mut GameState, actor: &str) -> Result<Vec<GameEvent>, GameError> {
    if state.game.organizer_id != actor {
        return Err(GameError::Forbidden);
    }
    if state.game.status == GameStatus::Ended {
        return Err(GameError::AlreadyEnded);
    }
    if !ready_to_end(state) {
        return Err(GameError::NotReady);
    }

    state.game.status = GameStatus::Ended;
    state.game.ended_at = Some(now_millis());
    Ok(vec![GameEvent::GameEnded { automatic: false }])
}

/// Whether the organizer may end the game now.
///
/// Requires an active game with every gift revealed, and player 1 to have
/// had their final say: either they made the latest move, or the turn sits
/// with them and there is nothing left for them to do.
pub fn ready_to_end(state: &GameState) -> bool {
    if state.game.status != GameStatus::Active || !state.all_revealed() {
        return false;
    }
    let Some(first) = state.player_one() else {
        return false;
    };

    if state
        .last_action()
        .is_some_and(|action| action.user_id == first.user_id)
    {
        return true;
    }
    if state.game.current_turn != Some(1) {
        return false;
    }

    let rules = &state.game.rules;
    if !rules.final_steal_round {
        return true;
    }
    !state
        .gifts
        .iter()
        .any(|gift| rules::can_steal(gift, &first.user_id, rules))
}

/// Draws join codes until `taken` rejects none, giving up after
/// [`MAX_CODE_ATTEMPTS`] collisions.
pub fn generate_game_code<R, F>(rng: &mut R, taken: F) -> Result<String, GameError>
where
    R: Rng,
    F: Fn(&str) -> bool,
{
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code: String = (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        if !taken(&code) {
            return Ok(code);
        }
    }
    Err(GameError::CodeGenerationExhausted(MAX_CODE_ATTEMPTS))
}
