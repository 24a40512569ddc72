//! Client side of the thread program.
//!
//! These types mirror the thread program's own definitions field for field,
//! so values encode identically on both sides of a call.

use soroban_sdk::{contractclient, contracttype, Address, Bytes, BytesN, Env, Symbol};

#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct ThreadInstruction {
    pub program_id: Address,
    pub function: Symbol,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[contracttype]
pub enum Trigger {
    Now,
    Timestamp(u64),
    Interval(u64),
}

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

#[contractclient(name = "SchedulerClient")]
pub trait ThreadProgramInterface {
    fn thread_pubkey(env: Env, authority: Address, id: Bytes) -> BytesN<32>;
    fn thread_create(
        env: Env,
        payer: Address,
        authority: Address,
        id: Bytes,
        amount: i128,
        instruction: ThreadInstruction,
        trigger: Trigger,
    ) -> BytesN<32>;
    fn thread_pause(env: Env, authority: Address, thread: BytesN<32>);
    fn thread_resume(env: Env, authority: Address, thread: BytesN<32>);
    fn thread_delete(env: Env, authority: Address, close_to: Address, thread: BytesN<32>);
    fn get_thread(env: Env, thread: BytesN<32>) -> Option<Thread>;
}
