use std::collections::HashMap;
use crate::types::State;
use crate::events::Event;

pub type TransitionTable = HashMap<(State, Event), State>;

/// Builds the default ReAct transition table.
///
/// Any (State, Event) pair missing here is illegal and makes
/// `AgentEngine::step()` return `AgentError::InvalidTransition`.
pub fn build_transition_table() -> TransitionTable {
    let mut t = HashMap::new();

    // ── IDLE ─────────────────────────────────────────────
    t.insert((State::idle(),       Event::start()),            State::reasoning());
    t.insert((State::idle(),       Event::plan_requested()),   State::planning());

    // ── PLANNING ─────────────────────────────────────────
    t.insert((State::planning(),   Event::plan_ready()),       State::reasoning());

    // ── REASONING ────────────────────────────────────────
    t.insert((State::reasoning(),  Event::final_answer()),     State::done());
    t.insert((State::reasoning(),  Event::action_requested()), State::acting());
    t.insert((State::reasoning(),  Event::no_action()),        State::reasoning());
    t.insert((State::reasoning(),  Event::needs_reflection()), State::reflecting());
    t.insert((State::reasoning(),  Event::budget_exhausted()), State::error());
    t.insert((State::reasoning(),  Event::fatal_error()),      State::error());

    // ── REFLECTING ───────────────────────────────────────
    t.insert((State::reflecting(), Event::stalled()),          State::replanning());
    t.insert((State::reflecting(), Event::final_answer()),     State::done());
    t.insert((State::reflecting(), Event::action_requested()), State::acting());
    t.insert((State::reflecting(), Event::no_action()),        State::reasoning());

    // ── REPLANNING ───────────────────────────────────────
    t.insert((State::replanning(), Event::final_answer()),     State::done());
    t.insert((State::replanning(), Event::action_requested()), State::acting());
    t.insert((State::replanning(), Event::no_action()),        State::reasoning());

    // ── ACTING ───────────────────────────────────────────
    t.insert((State::acting(),     Event::tool_success()),     State::observing());
    t.insert((State::acting(),     Event::tool_failure()),     State::observing());
    t.insert((State::acting(),     Event::tool_not_found()),   State::observing());
    t.insert((State::acting(),     Event::tool_denied()),      State::observing());
    t.insert((State::acting(),     Event::fatal_error()),      State::error());

    // ── OBSERVING ────────────────────────────────────────
    t.insert((State::observing(),  Event::r#continue()),       State::reasoning());

    // DONE and ERROR are terminal: no outgoing transitions.

    t
}

pub fn is_valid_transition(table: &TransitionTable, state: &State, event: &Event) -> bool {
    table.contains_key(&(state.clone(), event.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        let table = build_transition_table();
        assert!(table.keys().all(|(from, _)| !from.is_terminal()));
    }

    #[test]
    fn every_target_state_is_reachable_from_idle() {
        let table = build_transition_table();
        let mut seen = vec![State::idle()];
        let mut i = 0;
        while i < seen.len() {
            let from = seen[i].clone();
            for ((src, _), dst) in &table {
                if *src == from && !seen.contains(dst) {
                    seen.push(dst.clone());
                }
            }
            i += 1;
        }
        for state in [State::planning(), State::reasoning(), State::reflecting(), State::replanning(),
                      State::acting(), State::observing(), State::done(), State::error()] {
            assert!(seen.contains(&state), "{} unreachable", state);
        }
    }

    #[test]
    fn observing_continues_into_reasoning() {
        let table = build_transition_table();
        assert!(is_valid_transition(&table, &State::observing(), &Event::r#continue()));
        assert!(!is_valid_transition(&table, &State::done(), &Event::start()));
    }
}
