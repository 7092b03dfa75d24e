use bitflags::bitflags;

bitflags! {
    /// Flags passed to a handler for one invocation.
    ///
    /// Without [`ExecFlags::EXEC`] the call is a trial: it validates and
    /// prices the command and must not touch state.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ExecFlags: u8 {
        /// Commit: apply the command to world state.
        const EXEC       = 1 << 0;
        /// Clear obstacles owned by the acting party where possible.
        const AUTO       = 1 << 1;
        /// Compute the cost only; skip the affordability check.
        const QUERY_COST = 1 << 2;
        /// Refuse to build on water.
        const NO_WATER   = 1 << 3;
        /// Run a trial pass even when nested.
        const FORCE_TEST = 1 << 4;
    }
}

bitflags! {
    /// Static capabilities of a registered command.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct CommandFlags: u16 {
        /// Only the authority's own participant may issue it.
        const SERVER       = 1 << 0;
        /// Spectators may issue it.
        const SPECTATOR    = 1 << 1;
        /// Only outside a networked session.
        const OFFLINE      = 1 << 2;
        /// Always executed with [`ExecFlags::AUTO`].
        const AUTO         = 1 << 3;
        /// Always executed with [`ExecFlags::NO_WATER`].
        const NO_WATER     = 1 << 4;
        /// Trial result is not reliable: skip the trial pass at dispatch and
        /// do not compare trial and commit costs.
        const NO_TEST      = 1 << 5;
        /// May be issued while a networked session is paused.
        const PAUSE_EXEMPT = 1 << 6;
    }
}

bitflags! {
    /// Per-call options chosen by whoever dispatches a command.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct DispatchOptions: u8 {
        /// Execute locally even when networked.
        const DONT_NETWORK  = 1 << 0;
        /// Safe to apply without a trial when networked.
        const ASYNC         = 1 << 1;
        /// Skip the trial pass for this call.
        const NO_TEST       = 1 << 2;
        /// Preview the cost; never commit or queue.
        const ESTIMATE_ONLY = 1 << 3;
        /// Request [`ExecFlags::AUTO`].
        const AUTO          = 1 << 4;
        /// Request [`ExecFlags::NO_WATER`].
        const NO_WATER      = 1 << 5;
    }
}

impl ExecFlags {
    /// Trial variant of these flags.
    pub fn trial(self) -> Self {
        self - Self::EXEC
    }

    /// Commit variant of these flags.
    pub fn commit(self) -> Self {
        self | Self::EXEC
    }

    /// Execution flags implied by a command's capabilities and the caller's options.
    pub fn resolve(command: CommandFlags, options: DispatchOptions) -> Self {
        let mut flags = Self::empty();
        if command.contains(CommandFlags::AUTO) || options.contains(DispatchOptions::AUTO) {
            flags |= Self::AUTO;
        }
        if command.contains(CommandFlags::NO_WATER) || options.contains(DispatchOptions::NO_WATER)
        {
            flags |= Self::NO_WATER;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_clears_only_exec() {
        let flags = ExecFlags::EXEC | ExecFlags::AUTO;
        assert_eq!(flags.trial(), ExecFlags::AUTO);
        assert_eq!(flags.trial().commit(), flags);
    }

    #[test]
    fn resolve_merges_registry_and_caller_flags() {
        let flags = ExecFlags::resolve(CommandFlags::NO_WATER, DispatchOptions::AUTO);
        assert_eq!(flags, ExecFlags::AUTO | ExecFlags::NO_WATER);
        assert!(!flags.contains(ExecFlags::EXEC));
    }
}
