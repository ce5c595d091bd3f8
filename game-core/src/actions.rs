//! Reveal and steal: validate against the snapshot, then mutate it.
//!
//! Every check runs before the first write, so an `Err` always leaves the
//! `GameState` exactly as it was passed in.

use crate::error::{Entity, GameError};
use crate::rules;
use crate::turn;
use crate::types::{ActionType, GameEvent, GameState, GameStatus, UserId};

pub fn reveal(state: &mut GameState, actor: &str, gift_id: &str) -> Result<Vec<GameEvent>, GameError> {
    ensure_active(state)?;
    ensure_turn(state, actor)?;

    let index = state
        .gift_index(gift_id)
        .ok_or(GameError::NotFound(Entity::Gift))?;
    let gift = &state.gifts[index];
    if gift.is_revealed {
        return Err(GameError::AlreadyRevealed);
    }

    let unrevealed = state.unrevealed_gifts();
    let only_own_remains = rules::only_own_gift_remains(&unrevealed, actor);
    if !rules::can_reveal(gift, actor, &unrevealed) {
        return Err(GameError::CannotRevealOwnGift);
    }
    if state.owned_gift_index(actor, Some(gift_id)).is_some() && !only_own_remains {
        return Err(GameError::AlreadyOwnsGift);
    }

    // Read before this reveal lands in the log.
    let stealer = make_up_stealer(state, actor);

    let gift = &mut state.gifts[index];
    gift.is_revealed = true;
    gift.current_owner_id = Some(actor.to_string());
    state.record_action(actor, ActionType::Reveal, gift_id, None);

    let mut events = vec![GameEvent::GiftRevealed {
        player_id: actor.to_string(),
        gift_id: gift_id.to_string(),
    }];
    turn::advance_turn(state, actor, stealer.as_deref(), &mut events);
    Ok(events)
}

pub fn steal(state: &mut GameState, actor: &str, gift_id: &str) -> Result<Vec<GameEvent>, GameError> {
    ensure_active(state)?;
    ensure_turn(state, actor)?;

    let unrevealed_count = state.unrevealed_gifts().len();
    if rules::must_reveal_before_steal(actor, &state.gifts, unrevealed_count) {
        return Err(GameError::MustRevealFirst);
    }

    let index = state
        .gift_index(gift_id)
        .ok_or(GameError::NotFound(Entity::Gift))?;
    let target = &state.gifts[index];
    if !rules::can_steal(target, actor, &state.game.rules) {
        return Err(GameError::CannotSteal);
    }
    if !state.game.rules.allow_immediate_steal_back
        && rules::is_immediate_steal_back(state.last_action(), actor, target)
    {
        return Err(GameError::StealBackNotAllowed);
    }

    let previous_owner = target.current_owner_id.clone();
    let mut events = Vec::new();

    // Swap rather than drop: whatever the stealer held goes to the victim.
    if let Some(victim) = &previous_owner {
        if let Some(held) = state.owned_gift_index(actor, Some(gift_id)) {
            let gift = &mut state.gifts[held];
            gift.current_owner_id = Some(victim.clone());
            gift.previous_owner_id = Some(actor.to_string());
            events.push(GameEvent::GiftExchanged {
                from: actor.to_string(),
                to: victim.clone(),
                gift_id: gift.id.clone(),
            });
        }
    }

    let target = &mut state.gifts[index];
    target.current_owner_id = Some(actor.to_string());
    target.previous_owner_id = previous_owner.clone();
    target.steal_count += 1;
    state.record_action(actor, ActionType::Steal, gift_id, previous_owner.clone());
    events.insert(
        0,
        GameEvent::GiftStolen {
            from: previous_owner.clone(),
            to: actor.to_string(),
            gift_id: gift_id.to_string(),
        },
    );

    match previous_owner {
        Some(victim) if state.owned_gift_index(&victim, None).is_none() => {
            // Empty-handed victim reveals next.
            if !turn::pin_turn_to(state, &victim, &mut events) {
                turn::advance_turn(state, actor, None, &mut events);
            }
        }
        Some(_) => turn::advance_turn(state, actor, None, &mut events),
        // A revealed gift always has an owner; reaching this arm means the
        // stored state is inconsistent. `GiftStolen { from: None }` reports it.
        None => turn::advance_turn(state, actor, None, &mut events),
    }

    if state.all_revealed() && state.player_number(actor) == Some(1) {
        state.game.status = GameStatus::Ended;
        state.game.ended_at = Some(crate::types::now_millis());
        events.push(GameEvent::GameEnded { automatic: true });
    }

    Ok(events)
}

fn ensure_active(state: &GameState) -> Result<(), GameError> {
    match state.game.status {
        GameStatus::Active => Ok(()),
        GameStatus::Ended => Err(GameError::GameEnded),
        GameStatus::Waiting => Err(GameError::GameNotActive),
    }
}

fn ensure_turn(state: &GameState, actor: &str) -> Result<(), GameError> {
    match (state.player_number(actor), state.game.current_turn) {
        (Some(number), Some(current)) if number == current => Ok(()),
        _ => Err(GameError::NotYourTurn),
    }
}

/// The stealer whose previous steal handed `actor` this turn, if any.
fn make_up_stealer(state: &GameState, actor: &str) -> Option<UserId> {
    state
        .last_action()
        .filter(|a| a.action_type == ActionType::Steal)
        .filter(|a| a.previous_owner_id.as_deref() == Some(actor))
        .map(|a| a.user_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{active_state, opened_gift};
    use crate::types::GameRules;

    fn turn_of(state: &GameState) -> Option<&str> {
        state
            .game
            .current_turn
            .and_then(|n| state.user_at(n))
            .map(String::as_str)
    }

    #[test]
    fn reveal_assigns_owner_and_advances() {
        let mut state = active_state(&["p1", "p2", "p3"], GameRules::default());

        let events = reveal(&mut state, "p1", "gp2").unwrap();

        let gift = state.gift("gp2").unwrap();
        assert!(gift.is_revealed);
        assert_eq!(gift.current_owner_id.as_deref(), Some("p1"));
        assert_eq!(turn_of(&state), Some("p2"));
        assert_eq!(state.actions.len(), 1);
        assert_eq!(
            events,
            vec![
                GameEvent::GiftRevealed {
                    player_id: "p1".into(),
                    gift_id: "gp2".into()
                },
                GameEvent::TurnChanged {
                    player_number: 2,
                    player_id: "p2".into()
                }
            ]
        );
    }

    #[test]
    fn two_player_game_runs_to_the_end_policy() {
        let mut state = active_state(&["p1", "p2"], GameRules::default());

        reveal(&mut state, "p1", "gp2").unwrap();
        assert_eq!(state.game.current_turn, Some(2));

        reveal(&mut state, "p2", "gp1").unwrap();
        assert!(state.all_revealed());
        assert_eq!(state.game.current_turn, Some(1));
        assert_eq!(state.game.status, GameStatus::Active);
    }

    #[test]
    fn last_gift_self_reveal_is_allowed() {
        let mut state = active_state(&["p1", "p2"], GameRules::default());
        reveal(&mut state, "p1", "gp2").unwrap();
        steal(&mut state, "p2", "gp2").unwrap();
        assert_eq!(state.game.current_turn, Some(1));

        // Only p1's own gift is left, so p1 may open it.
        let events = reveal(&mut state, "p1", "gp1").unwrap();
        assert!(state.all_revealed());
        assert_eq!(state.gift("gp1").unwrap().current_owner_id.as_deref(), Some("p1"));
        // Player 1 made the closing move; the turn stays with them.
        assert_eq!(events.len(), 1);
        assert_eq!(state.game.current_turn, Some(1));
    }

    #[test]
    fn own_gift_reveal_rejected_while_others_remain() {
        let mut state = active_state(&["p1", "p2", "p3"], GameRules::default());
        let before = state.clone();

        let err = reveal(&mut state, "p1", "gp1").unwrap_err();
        assert_eq!(err, GameError::CannotRevealOwnGift);
        assert_eq!(state, before);
    }

    #[test]
    fn second_reveal_of_same_gift_fails_without_change() {
        let mut state = active_state(&["p1", "p2", "p3"], GameRules::default());
        reveal(&mut state, "p1", "gp2").unwrap();
        state.game.current_turn = Some(1);
        let before = state.clone();

        let err = reveal(&mut state, "p1", "gp2").unwrap_err();
        assert_eq!(err, GameError::AlreadyRevealed);
        assert_eq!(state, before);
    }

    #[test]
    fn holder_cannot_reveal_another() {
        let mut state = active_state(&["p1", "p2", "p3"], GameRules::default());
        reveal(&mut state, "p1", "gp2").unwrap();
        state.game.current_turn = Some(1);

        let err = reveal(&mut state, "p1", "gp3").unwrap_err();
        assert_eq!(err, GameError::AlreadyOwnsGift);
    }

    #[test]
    fn holder_may_still_reveal_own_last_gift() {
        let mut state = active_state(&["p1", "p2"], GameRules::default());
        reveal(&mut state, "p1", "gp2").unwrap();
        state.game.current_turn = Some(1);

        reveal(&mut state, "p1", "gp1").unwrap();
        let held = state.gifts.iter().filter(|g| g.is_owned_by("p1")).count();
        assert_eq!(held, 2);
    }

    #[test]
    fn rejects_wrong_turn_or_status() {
        let mut state = active_state(&["p1", "p2"], GameRules::default());
        assert_eq!(reveal(&mut state, "p2", "gp1").unwrap_err(), GameError::NotYourTurn);
        assert_eq!(reveal(&mut state, "zed", "gp1").unwrap_err(), GameError::NotYourTurn);
        assert_eq!(
            reveal(&mut state, "p1", "missing").unwrap_err(),
            GameError::NotFound(Entity::Gift)
        );

        state.game.status = GameStatus::Waiting;
        assert_eq!(reveal(&mut state, "p1", "gp2").unwrap_err(), GameError::GameNotActive);
        assert_eq!(steal(&mut state, "p1", "gp2").unwrap_err(), GameError::GameNotActive);

        state.game.status = GameStatus::Ended;
        assert_eq!(reveal(&mut state, "p1", "gp2").unwrap_err(), GameError::GameEnded);
        assert_eq!(steal(&mut state, "p1", "gp2").unwrap_err(), GameError::GameEnded);
    }

    #[test]
    fn steal_from_empty_handed_victim_pins_turn_and_forces_reveal() {
        let mut state = active_state(&["p1", "p2", "p3"], GameRules::default());
        reveal(&mut state, "p1", "gp2").unwrap();
        state.gifts[1].steal_count = 1;

        let events = steal(&mut state, "p2", "gp2").unwrap();
        let gift = state.gift("gp2").unwrap();
        assert_eq!(gift.current_owner_id.as_deref(), Some("p2"));
        assert_eq!(gift.previous_owner_id.as_deref(), Some("p1"));
        assert_eq!(gift.steal_count, 2);
        assert_eq!(turn_of(&state), Some("p1"));
        assert_eq!(
            events[0],
            GameEvent::GiftStolen {
                from: Some("p1".into()),
                to: "p2".into(),
                gift_id: "gp2".into()
            }
        );

        let before = state.clone();
        assert_eq!(steal(&mut state, "p1", "gp2").unwrap_err(), GameError::MustRevealFirst);
        assert_eq!(state, before);

        // Make-up reveal hands the turn to the player after the stealer.
        reveal(&mut state, "p1", "gp3").unwrap();
        assert_eq!(turn_of(&state), Some("p3"));
    }

    #[test]
    fn steal_while_holding_swaps_gifts() {
        let mut state = active_state(&["p1", "p2", "p3"], GameRules::default());
        state.gifts[1] = opened_gift("gp2", "p2", "p1");
        state.gifts[2] = opened_gift("gp3", "p3", "p2");
        state.game.current_turn = Some(2);

        let events = steal(&mut state, "p2", "gp2").unwrap();

        let swapped = state.gift("gp3").unwrap();
        assert_eq!(swapped.current_owner_id.as_deref(), Some("p1"));
        assert_eq!(swapped.previous_owner_id.as_deref(), Some("p2"));
        assert_eq!(swapped.steal_count, 0);
        assert_eq!(state.gift("gp2").unwrap().current_owner_id.as_deref(), Some("p2"));
        assert!(events.contains(&GameEvent::GiftExchanged {
            from: "p2".into(),
            to: "p1".into(),
            gift_id: "gp3".into()
        }));
        // Victim still holds something, so the normal order resumes.
        assert_eq!(turn_of(&state), Some("p3"));
    }

    #[test]
    fn steal_at_limit_is_rejected() {
        let mut state = active_state(&["p1", "p2", "p3"], GameRules::default());
        state.gifts[1] = opened_gift("gp2", "p2", "p1");
        state.gifts[1].steal_count = 3;
        state.game.current_turn = Some(2);
        let before = state.clone();

        assert_eq!(steal(&mut state, "p2", "gp2").unwrap_err(), GameError::CannotSteal);
        assert_eq!(state, before);
    }

    #[test]
    fn immediate_steal_back_only_blocked_when_disabled() {
        let rules = GameRules {
            allow_immediate_steal_back: false,
            ..GameRules::default()
        };
        let mut state = active_state(&["p1", "p2", "p3"], rules);
        state.gifts[0] = opened_gift("gp1", "p1", "p3");
        state.gifts[1] = opened_gift("gp2", "p2", "p1");
        state.game.current_turn = Some(2);

        // Hand p1 a gift again so only the steal-back rule stands in the way.
        steal(&mut state, "p2", "gp2").unwrap();
        state.gifts[2] = opened_gift("gp3", "p3", "p1");
        state.game.current_turn = Some(1);

        assert_eq!(
            steal(&mut state, "p1", "gp2").unwrap_err(),
            GameError::StealBackNotAllowed
        );

        state.game.rules.allow_immediate_steal_back = true;
        steal(&mut state, "p1", "gp2").unwrap();
    }

    #[test]
    fn steal_by_player_one_after_all_revealed_ends_game() {
        let mut state = active_state(&["p1", "p2"], GameRules::default());
        state.gifts[0] = opened_gift("gp1", "p1", "p2");
        state.gifts[1] = opened_gift("gp2", "p2", "p1");

        let events = steal(&mut state, "p1", "gp1").unwrap();
        assert_eq!(state.game.status, GameStatus::Ended);
        assert!(state.game.ended_at.is_some());
        assert_eq!(events.last(), Some(&GameEvent::GameEnded { automatic: true }));
    }

    #[test]
    fn ownerless_revealed_gift_advances_like_an_exchange() {
        let mut exchanged = active_state(&["p1", "p2", "p3"], GameRules::default());
        exchanged.gifts[0] = opened_gift("gp1", "p1", "p1");
        exchanged.gifts[1] = opened_gift("gp2", "p2", "p2");
        exchanged.game.current_turn = Some(2);
        let mut ownerless = exchanged.clone();
        ownerless.gifts[0].current_owner_id = None;

        steal(&mut exchanged, "p2", "gp1").unwrap();
        let events = steal(&mut ownerless, "p2", "gp1").unwrap();

        assert_eq!(exchanged.game.current_turn, ownerless.game.current_turn);
        assert_eq!(turn_of(&ownerless), Some("p3"));
        assert_eq!(
            events[0],
            GameEvent::GiftStolen {
                from: None,
                to: "p2".into(),
                gift_id: "gp1".into()
            }
        );
    }
}
