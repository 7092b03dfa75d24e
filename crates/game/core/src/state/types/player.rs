use super::Money;

/// Per-participant bookkeeping replicated on every instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlayerState {
    /// Slot is in use. Inactive slots cannot act or receive transfers.
    pub active: bool,
    pub money: Money,
}

impl PlayerState {
    pub const fn active(money: Money) -> Self {
        Self {
            active: true,
            money,
        }
    }
}
