//! Fixture builders shared by the unit tests.

use crate::types::{Game, GameRules, GameState, GameStatus, Gift, Participant};

pub fn unopened_gift(id: &str, submitter: &str) -> Gift {
    Gift {
        url: format!("https://example.com/{id}"),
        title: Some(format!("gift-{id}")),
        ..Gift::new(id, "game", submitter, "")
    }
}

pub fn opened_gift(id: &str, submitter: &str, owner: &str) -> Gift {
    Gift {
        is_revealed: true,
        current_owner_id: Some(owner.to_string()),
        ..unopened_gift(id, submitter)
    }
}

pub fn participant(user: &str, number: Option<u32>) -> Participant {
    Participant {
        player_number: number,
        ..Participant::new("game", user)
    }
}

/// Waiting game organised by `p1` where each listed player has submitted
/// one gift named `g<player>`.
pub fn waiting_state(players: &[&str]) -> GameState {
    let mut state = GameState::new(Game::new("game", "p1", "party", "ABC234", GameRules::default()));
    for player in players {
        state.participants.push(participant(player, None));
        state.gifts.push(unopened_gift(&format!("g{player}"), player));
    }
    state
}

pub fn active_state(players: &[&str], rules: GameRules) -> GameState {
    let mut state = waiting_state(players);
    state.game.rules = rules;
    state.game.status = GameStatus::Active;
    state.game.turn_order = players.iter().map(|p| p.to_string()).collect();
    state.game.current_turn = Some(1);
    for (index, p) in state.participants.iter_mut().enumerate() {
        p.player_number = Some(index as u32 + 1);
    }
    state
}
