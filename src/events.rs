use serde::{Deserialize, Serialize};

/// A named event emitted by a state handler to drive transitions.
///
/// Events are identified by their string name; custom handlers may emit
/// their own as long as the transition table knows them.
///
/// ```
/// use reactsm::Event;
/// let evt = Event::new("NeedsVerification");
/// assert_eq!(evt.as_str(), "NeedsVerification");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event(pub String);

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // ── Well-known built-in event constructors ──────────────────────────

    // Lifecycle
    pub fn start()             -> Self { Self::new("Start") }
    pub fn plan_requested()    -> Self { Self::new("PlanRequested") }
    pub fn plan_ready()        -> Self { Self::new("PlanReady") }

    // Reasoning outcomes (also emitted after reflection / replanning)
    pub fn final_answer()      -> Self { Self::new("FinalAnswer") }
    pub fn action_requested()  -> Self { Self::new("ActionRequested") }
    pub fn no_action()         -> Self { Self::new("NoAction") }
    pub fn needs_reflection()  -> Self { Self::new("NeedsReflection") }
    pub fn budget_exhausted()  -> Self { Self::new("BudgetExhausted") }
    pub fn fatal_error()       -> Self { Self::new("FatalError") }

    // Reflection outcomes
    pub fn stalled()           -> Self { Self::new("Stalled") }

    // Acting outcomes
    pub fn tool_success()      -> Self { Self::new("ToolSuccess") }
    pub fn tool_failure()      -> Self { Self::new("ToolFailure") }
    pub fn tool_not_found()    -> Self { Self::new("ToolNotFound") }
    pub fn tool_denied()       -> Self { Self::new("ToolDenied") }

    // Observing outcomes
    pub fn r#continue()        -> Self { Self::new("Continue") }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
