use crate::command::{CommandText, MessageId};
use crate::config::GameConfig;
use crate::state::{Location, Money, PlayerId};

/// Per-instance execution bookkeeping threaded through dispatch, the
/// executor and every handler.
///
/// Depth is zero between independent top-level dispatches. Depth one marks
/// the outermost call, the only one that checks affordability and settles
/// funds.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    depth: u32,
    current_player: PlayerId,
    last_error: Option<MessageId>,
    additional_cash_required: Money,
    text: Option<CommandText>,
    last_build: [Option<Location>; GameConfig::MAX_PLAYERS],
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            depth: 0,
            current_player: PlayerId::SPECTATOR,
            last_error: None,
            additional_cash_required: 0,
            text: None,
            last_build: [None; GameConfig::MAX_PLAYERS],
        }
    }

    pub const fn depth(&self) -> u32 {
        self.depth
    }

    pub const fn current_player(&self) -> PlayerId {
        self.current_player
    }

    pub fn set_current_player(&mut self, player: PlayerId) {
        self.current_player = player;
    }

    /// Message of the most recent failure since the last top-level call.
    pub const fn last_error(&self) -> Option<MessageId> {
        self.last_error
    }

    /// Funds the last failed affordability check asked for.
    pub const fn additional_cash_required(&self) -> Money {
        self.additional_cash_required
    }

    /// Text payload of the command being executed.
    pub fn text(&self) -> Option<&str> {
        self.text.as_ref().map(|text| text.as_str())
    }

    pub fn set_text(&mut self, text: Option<CommandText>) {
        self.text = text;
    }

    /// Last location a participant acted on, for UI purposes.
    pub fn last_build(&self, player: PlayerId) -> Option<Location> {
        player.index().and_then(|index| self.last_build[index])
    }

    pub(crate) fn enter(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn leave(&mut self) {
        debug_assert!(self.depth > 0, "execution depth underflow");
        self.depth = self.depth.saturating_sub(1);
    }

    /// Resets per-call slots at the start of a top-level call.
    pub(crate) fn begin_top_level(&mut self, location: Location) {
        self.last_error = None;
        self.additional_cash_required = 0;
        self.record_last_build(location);
    }

    pub(crate) fn record_last_build(&mut self, location: Location) {
        if !location.is_none()
            && let Some(index) = self.current_player.index()
        {
            self.last_build[index] = Some(location);
        }
    }

    pub(crate) fn record_error(&mut self, message: Option<MessageId>) {
        if message.is_some() {
            self.last_error = message;
        }
    }

    pub(crate) fn record_shortfall(&mut self, required: Money) {
        self.additional_cash_required = required;
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
