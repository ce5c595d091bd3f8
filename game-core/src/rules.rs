//! Side-effect free legality checks over entity snapshots.

use crate::types::{Action, ActionType, GameRules, Gift};

/// A revealed gift may be stolen by anyone except its current holder until
/// it hits the configured steal limit. Having originally submitted the gift
/// does not matter.
pub fn can_steal(gift: &Gift, actor: &str, rules: &GameRules) -> bool {
    if gift.is_owned_by(actor) {
        return false;
    }
    if gift.steal_count >= rules.max_steals_per_gift {
        return false;
    }
    gift.is_revealed
}

pub fn all_revealed(gifts: &[Gift]) -> bool {
    gifts.iter().all(|g| g.is_revealed)
}

pub fn only_own_gift_remains(unrevealed: &[&Gift], actor: &str) -> bool {
    matches!(unrevealed, [last] if last.submitter_id == actor)
}

pub fn can_reveal(gift: &Gift, actor: &str, unrevealed: &[&Gift]) -> bool {
    gift.submitter_id != actor || only_own_gift_remains(unrevealed, actor)
}

/// A player whose gift was taken and who now holds nothing has to reveal a
/// replacement while any gift is still wrapped.
pub fn must_reveal_before_steal(actor: &str, gifts: &[Gift], unrevealed_count: usize) -> bool {
    let holds_gift = gifts.iter().any(|g| g.is_owned_by(actor));
    let was_stolen_from = gifts
        .iter()
        .any(|g| g.previous_owner_id.as_deref() == Some(actor));
    !holds_gift && was_stolen_from && unrevealed_count > 0
}

/// True when `gift` was taken from `actor` by the most recent action.
pub fn is_immediate_steal_back(last_action: Option<&Action>, actor: &str, gift: &Gift) -> bool {
    last_action
        .map(|action| {
            action.action_type == ActionType::Steal
                && action.gift_id == gift.id
                && action.previous_owner_id.as_deref() == Some(actor)
                && gift.is_owned_by(&action.user_id)
        })
        .unwrap_or(false)
}
