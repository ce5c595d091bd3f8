//! Turn pointer bookkeeping.

use crate::types::{GameEvent, GameState, UserId};

/// Moves the turn on after `actor` has acted.
///
/// While gifts remain wrapped the next player is the one after `actor` in
/// turn order, or after `stealer` when `actor` was using a make-up turn, so
/// the usual cadence picks up where the steal interrupted it. Once every
/// gift is revealed the final-turn policy applies instead.
pub fn advance_turn(
    state: &mut GameState,
    actor: &str,
    stealer: Option<&str>,
    events: &mut Vec<GameEvent>,
) {
    if state.all_revealed() {
        pin_final_turn(state, actor, events);
        return;
    }

    let anchor = stealer.unwrap_or(actor);
    let Some(next) = next_in_order(&state.game.turn_order, anchor).cloned() else {
        return;
    };
    if let Some(number) = state.player_number(&next) {
        set_turn(state, number, next, events);
    }
}

/// Gives the turn to `user_id` out of sequence. Returns false when that user
/// holds no player number.
pub fn pin_turn_to(state: &mut GameState, user_id: &str, events: &mut Vec<GameEvent>) -> bool {
    match state.player_number(user_id) {
        Some(number) => {
            set_turn(state, number, user_id.to_string(), events);
            true
        }
        None => false,
    }
}

/// With everything revealed player 1 always gets the last word. Under a
/// final steal round the turn returns to them after every action; otherwise
/// only when someone else made the closing move.
pub fn pin_final_turn(state: &mut GameState, actor: &str, events: &mut Vec<GameEvent>) {
    let actor_is_first = state.player_number(actor) == Some(1);
    if !state.game.rules.final_steal_round && actor_is_first {
        return;
    }
    if let Some(first) = state.user_at(1).cloned() {
        set_turn(state, 1, first, events);
    }
}

fn next_in_order<'a>(turn_order: &'a [UserId], anchor: &str) -> Option<&'a UserId> {
    let index = turn_order.iter().position(|id| id == anchor)?;
    turn_order.get((index + 1) % turn_order.len())
}

fn set_turn(state: &mut GameState, number: u32, player_id: UserId, events: &mut Vec<GameEvent>) {
    state.game.current_turn = Some(number);
    events.push(GameEvent::TurnChanged {
        player_number: number,
        player_id,
    });
}
