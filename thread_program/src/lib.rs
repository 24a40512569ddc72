#![no_std]
use soroban_sdk::{
    contract, contracterror, contractimpl, symbol_short, token::TokenClient, vec, xdr::ToXdr,
    Address, Bytes, BytesN, Env, IntoVal, Map, Val, Vec,
};

mod state;

pub use state::*;

// Storage TTL constants for active data
const INSTANCE_LIFETIME_THRESHOLD: u32 = 17280; // ~1 day
const INSTANCE_BUMP_AMOUNT: u32 = 518400; // ~30 days

/// Seed prefix for thread addresses.
pub const SEED_THREAD: &[u8] = b"thread";

/// Thread ids are capped the same way account seeds are.
pub const MAX_THREAD_ID_LEN: u32 = 32;

/// Default fee paid to the worker for each run, in stroops.
pub const EXEC_FEE: i128 = 1_000;

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    NotConfigured = 1,
    ThreadExists = 2,
    ThreadNotFound = 3,
    InvalidThreadId = 4,
    InvalidAmount = 5,
    InvalidTrigger = 6,
    Unauthorized = 7,
    ThreadPaused = 8,
    TriggerNotReady = 9,
    TriggerConsumed = 10,
    InsufficientFunds = 11,
}

/// Derive the address of the thread `id` owned by `authority`.
pub fn thread_address(env: &Env, authority: &Address, id: &Bytes) -> BytesN<32> {
    let mut preimage = Bytes::from_slice(env, SEED_THREAD);
    preimage.append(&authority.clone().to_xdr(env));
    preimage.append(id);
    env.crypto().sha256(&preimage).into()
}

#[contract]
pub struct ThreadProgram;

#[contractimpl]
impl ThreadProgram {
    /// Configure the asset used to fund threads.
    ///
    /// # Arguments
    /// * `admin` - Address allowed to tune the exec fee (must authorize)
    /// * `token` - Asset contract holding thread balances
    pub fn init(env: Env, admin: Address, token: Address) -> bool {
        admin.require_auth();

        let existing: Option<Address> = env.storage().instance().get(&symbol_short!("ADMIN"));
        if existing.is_some() {
            panic!("Contract already initialized");
        }

        Self::extend_instance_ttl(&env);
        env.storage().instance().set(&symbol_short!("ADMIN"), &admin);
        env.storage().instance().set(&symbol_short!("TOKEN"), &token);

        true
    }

    /// Update the per-run worker fee (admin only).
    pub fn set_exec_fee(env: Env, caller: Address, fee: i128) -> Result<(), Error> {
        caller.require_auth();

        let admin: Address = env
            .storage()
            .instance()
            .get(&symbol_short!("ADMIN"))
            .ok_or(Error::NotConfigured)?;
        if caller != admin {
            return Err(Error::Unauthorized);
        }
        if fee < 0 {
            return Err(Error::InvalidAmount);
        }

        Self::extend_instance_ttl(&env);
        env.storage().instance().set(&symbol_short!("EXEC_FEE"), &fee);

        Ok(())
    }

    pub fn get_exec_fee(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&symbol_short!("EXEC_FEE"))
            .unwrap_or(EXEC_FEE)
    }

    pub fn get_token(env: Env) -> Option<Address> {
        env.storage().instance().get(&symbol_short!("TOKEN"))
    }

    /// Address a thread `id` owned by `authority` lives at.
    pub fn thread_pubkey(env: Env, authority: Address, id: Bytes) -> BytesN<32> {
        thread_address(&env, &authority, &id)
    }

    /// Create a funded thread.
    ///
    /// # Arguments
    /// * `payer` - Funds the thread balance (must authorize)
    /// * `authority` - Owner of the thread (must authorize)
    /// * `id` - Thread id, 1 to 32 bytes, unique per authority
    /// * `amount` - Initial balance moved from `payer`
    /// * `instruction` - Call performed on each run
    /// * `trigger` - When the thread becomes runnable
    ///
    /// # Returns
    /// The thread address
    ///
    /// # Errors
    /// * `InvalidThreadId` - If `id` is empty or too long
    /// * `InvalidAmount` - If `amount` is negative
    /// * `InvalidTrigger` - If the trigger is a zero-length interval
    /// * `ThreadExists` - If the address is already taken
    pub fn thread_create(
        env: Env,
        payer: Address,
        authority: Address,
        id: Bytes,
        amount: i128,
        instruction: ThreadInstruction,
        trigger: Trigger,
    ) -> Result<BytesN<32>, Error> {
        authority.require_auth();
        if payer != authority {
            payer.require_auth();
        }

        if id.is_empty() || id.len() > MAX_THREAD_ID_LEN {
            return Err(Error::InvalidThreadId);
        }
        if amount < 0 {
            return Err(Error::InvalidAmount);
        }
        if trigger == Trigger::Interval(0) {
            return Err(Error::InvalidTrigger);
        }

        Self::extend_instance_ttl(&env);
        let token = Self::token(&env)?;
        let mut threads = Self::load_threads(&env);

        let key = thread_address(&env, &authority, &id);
        if threads.contains_key(key.clone()) {
            return Err(Error::ThreadExists);
        }

        if amount > 0 {
            TokenClient::new(&env, &token).transfer(
                &payer,
                &env.current_contract_address(),
                &amount,
            );
        }

        let thread = Thread {
            authority: authority.clone(),
            id,
            instruction,
            trigger,
            paused: false,
            balance: amount,
            created_at: env.ledger().timestamp(),
            last_exec_at: None,
            exec_count: 0,
        };
        threads.set(key.clone(), thread);
        Self::save_threads(&env, &threads);

        env.events().publish(
            (symbol_short!("thread"), ThreadEvent::Created),
            (key.clone(), authority),
        );

        Ok(key)
    }

    /// Stop a thread from running. Pausing a paused thread is a no-op.
    pub fn thread_pause(env: Env, authority: Address, thread: BytesN<32>) -> Result<(), Error> {
        Self::set_paused(&env, authority, thread, true)
    }

    /// Let a paused thread run again.
    pub fn thread_resume(env: Env, authority: Address, thread: BytesN<32>) -> Result<(), Error> {
        Self::set_paused(&env, authority, thread, false)
    }

    /// Delete a thread and refund its balance.
    ///
    /// # Arguments
    /// * `authority` - Owner of the thread (must authorize)
    /// * `close_to` - Receives the remaining balance
    /// * `thread` - Thread address
    ///
    /// # Errors
    /// * `ThreadNotFound` - If no thread lives at `thread`
    /// * `Unauthorized` - If `authority` does not own the thread
    pub fn thread_delete(
        env: Env,
        authority: Address,
        close_to: Address,
        thread: BytesN<32>,
    ) -> Result<(), Error> {
        authority.require_auth();

        Self::extend_instance_ttl(&env);
        let mut threads = Self::load_threads(&env);
        let record = threads.get(thread.clone()).ok_or(Error::ThreadNotFound)?;
        if record.authority != authority {
            return Err(Error::Unauthorized);
        }

        threads.remove(thread.clone());
        Self::save_threads(&env, &threads);

        if record.balance > 0 {
            let token = Self::token(&env)?;
            TokenClient::new(&env, &token).transfer(
                &env.current_contract_address(),
                &close_to,
                &record.balance,
            );
        }

        env.events().publish(
            (symbol_short!("thread"), ThreadEvent::Deleted),
            (thread, close_to, record.balance),
        );

        Ok(())
    }

    /// Run a due thread. The caller acts as the worker and collects the fee.
    ///
    /// # Errors
    /// * `ThreadNotFound` - If no thread lives at `thread`
    /// * `ThreadPaused` - If the thread is paused
    /// * `TriggerNotReady` - If the trigger is not due yet
    /// * `TriggerConsumed` - If a one-shot trigger already fired
    /// * `InsufficientFunds` - If the balance cannot cover the fee
    pub fn thread_exec(env: Env, worker: Address, thread: BytesN<32>) -> Result<(), Error> {
        worker.require_auth();

        Self::extend_instance_ttl(&env);
        let mut threads = Self::load_threads(&env);
        let mut record = threads.get(thread.clone()).ok_or(Error::ThreadNotFound)?;
        if record.paused {
            return Err(Error::ThreadPaused);
        }

        let now = env.ledger().timestamp();
        if now < Self::next_due(&record)? {
            return Err(Error::TriggerNotReady);
        }

        let fee = Self::get_exec_fee(env.clone());
        if record.balance < fee {
            return Err(Error::InsufficientFunds);
        }

        record.balance -= fee;
        record.last_exec_at = Some(now);
        record.exec_count += 1;
        let instruction = record.instruction.clone();
        threads.set(thread.clone(), record);
        Self::save_threads(&env, &threads);

        if fee > 0 {
            let token = Self::token(&env)?;
            TokenClient::new(&env, &token).transfer(
                &env.current_contract_address(),
                &worker,
                &fee,
            );
        }

        let args: Vec<Val> = vec![&env, thread.clone().into_val(&env)];
        let _: Val = env.invoke_contract(&instruction.program_id, &instruction.function, args);

        env.events().publish(
            (symbol_short!("thread"), ThreadEvent::Executed),
            (thread, worker),
        );

        Ok(())
    }

    /// Get a thread by address
    pub fn get_thread(env: Env, thread: BytesN<32>) -> Option<Thread> {
        Self::load_threads(&env).get(thread)
    }

    fn set_paused(
        env: &Env,
        authority: Address,
        thread: BytesN<32>,
        paused: bool,
    ) -> Result<(), Error> {
        authority.require_auth();

        Self::extend_instance_ttl(env);
        let mut threads = Self::load_threads(env);
        let mut record = threads.get(thread.clone()).ok_or(Error::ThreadNotFound)?;
        if record.authority != authority {
            return Err(Error::Unauthorized);
        }
        if record.paused == paused {
            return Ok(());
        }

        record.paused = paused;
        threads.set(thread.clone(), record);
        Self::save_threads(env, &threads);

        let event = if paused {
            ThreadEvent::Paused
        } else {
            ThreadEvent::Resumed
        };
        env.events()
            .publish((symbol_short!("thread"), event), (thread, authority));

        Ok(())
    }

    /// Earliest timestamp the thread may run at.
    fn next_due(thread: &Thread) -> Result<u64, Error> {
        match thread.trigger {
            Trigger::Now if thread.exec_count == 0 => Ok(thread.created_at),
            Trigger::Timestamp(at) if thread.exec_count == 0 => Ok(at),
            Trigger::Now | Trigger::Timestamp(_) => Err(Error::TriggerConsumed),
            Trigger::Interval(seconds) => Ok(thread
                .last_exec_at
                .unwrap_or(thread.created_at)
                .saturating_add(seconds)),
        }
    }

    fn token(env: &Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&symbol_short!("TOKEN"))
            .ok_or(Error::NotConfigured)
    }

    fn load_threads(env: &Env) -> Map<BytesN<32>, Thread> {
        env.storage()
            .instance()
            .get(&symbol_short!("THREADS"))
            .unwrap_or_else(|| Map::new(env))
    }

    fn save_threads(env: &Env, threads: &Map<BytesN<32>, Thread>) {
        env.storage()
            .instance()
            .set(&symbol_short!("THREADS"), threads);
    }

    /// Extend the TTL of instance storage
    fn extend_instance_ttl(env: &Env) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
    }
}
