use soroban_sdk::{contracttype, Address, Bytes, Symbol};

/// Contract call a thread performs each time it runs.
///
/// The target function receives the thread address as its only argument.
#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct ThreadInstruction {
    pub program_id: Address,
    pub function: Symbol,
}

/// When a thread becomes runnable
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[contracttype]
pub enum Trigger {
    /// Runnable once, right away.
    Now,
    /// Runnable once, at or after the given ledger timestamp.
    Timestamp(u64),
    /// Runnable every N seconds; missed periods collapse into a single run.
    Interval(u64),
}

/// Scheduling-task record owned by the thread program
#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct Thread {
    pub authority: Address,
    pub id: Bytes,
    pub instruction: ThreadInstruction,
    pub trigger: Trigger,
    pub paused: bool,
    pub balance: i128,
    pub created_at: u64,
    pub last_exec_at: Option<u64>,
    pub exec_count: u64,
}

/// Thread lifecycle events
#[contracttype]
#[derive(Clone)]
pub enum ThreadEvent {
    Created,
    Paused,
    Resumed,
    Deleted,
    Executed,
}
