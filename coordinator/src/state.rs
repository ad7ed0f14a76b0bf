use std::fmt;

/// What the coordinator is doing right now, published on a watch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CoordinatorState {
    #[default]
    Idle,
    AwaitingHeight {
        name: String,
        height: u64,
    },
    Swapping {
        name: String,
    },
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorState::Idle => write!(f, "idle"),
            CoordinatorState::AwaitingHeight { name, height } => {
                write!(f, "awaiting height {height} for {name}")
            }
            CoordinatorState::Swapping { name } => write!(f, "swapping to {name}"),
        }
    }
}

/// Emitted once per applied upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub name: String,
    pub height: u64,
    /// False when restart-after-upgrade is off and the node was left stopped.
    pub relaunched: bool,
}
