#![no_std]
use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, token::TokenClient,
    xdr::ToXdr, Address, Bytes, BytesN, Env, Symbol,
};

mod scheduler;

pub use scheduler::{SchedulerClient, Thread, ThreadInstruction, ThreadProgramInterface, Trigger};

// Storage TTL constants for active data
const INSTANCE_LIFETIME_THRESHOLD: u32 = 17280; // ~1 day
const INSTANCE_BUMP_AMOUNT: u32 = 518400; // ~30 days

/// Seed for the counter record address.
/// Clients derive the same address on their side, so keep them in sync.
pub const SEED_COUNTER: &[u8] = b"ClockTest";

/// Suffix mixed into every derived address.
pub const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

pub const STROOPS_PER_UNIT: i128 = 10_000_000;

/// Balance handed to the thread on creation.
pub const THREAD_FUNDING: i128 = STROOPS_PER_UNIT / 10;

/// Held while the counter record exists, refunded on close.
pub const RECORD_DEPOSIT: i128 = STROOPS_PER_UNIT / 100;

pub const COUNTER_INTERVAL_SECS: u64 = 10;

/// Derive an address from `seeds` and the owning program.
pub fn derive_address(env: &Env, seeds: &[&[u8]], program_id: &Address) -> BytesN<32> {
    let mut preimage = Bytes::new(env);
    for seed in seeds {
        preimage.extend_from_slice(seed);
    }
    preimage.append(&program_id.clone().to_xdr(env));
    preimage.extend_from_slice(PDA_MARKER);
    env.crypto().sha256(&preimage).into()
}

/// Address of the counter record owned by `program_id`.
pub fn derive_record_address(env: &Env, program_id: &Address) -> BytesN<32> {
    derive_address(env, &[SEED_COUNTER], program_id)
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    NotConfigured = 1,
    AlreadyInitialized = 2,
    NotInitialized = 3,
    InvalidRecord = 4,
    InvalidThread = 5,
    Unauthorized = 6,
    CounterOverflow = 7,
    ThreadActive = 8,
}

/// Addresses the program talks to
#[contracttype]
#[derive(Clone)]
pub struct ProgramConfig {
    pub admin: Address,
    pub scheduler: Address,
    pub token: Address,
}

/// Data record at the derived counter address
#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct CounterRecord {
    pub address: BytesN<32>,
    pub counter: u32,
    pub payer: Address,
    pub thread: BytesN<32>,
    pub thread_id: Bytes,
    pub created_at: u64,
}

/// Events emitted by the counter program
#[contracttype]
#[derive(Clone)]
pub enum CounterEvent {
    Initialized,
    Incremented,
    Paused,
    Resumed,
    Deleted,
    Closed,
}

#[contract]
pub struct ThreadCounter;

#[contractimpl]
impl ThreadCounter {
    /// Point the program at its scheduler and funding asset
    pub fn init(env: Env, admin: Address, scheduler: Address, token: Address) -> bool {
        admin.require_auth();

        if env.storage().instance().has(&symbol_short!("CONFIG")) {
            panic!("Contract already initialized");
        }

        Self::extend_instance_ttl(&env);
        env.storage().instance().set(
            &symbol_short!("CONFIG"),
            &ProgramConfig {
                admin,
                scheduler,
                token,
            },
        );

        true
    }

    /// Create the counter record and a thread that increments it every
    /// `COUNTER_INTERVAL_SECS` seconds.
    ///
    /// # Arguments
    /// * `payer` - Funds the record deposit and the thread (must authorize)
    /// * `thread_id` - Id of the thread to create
    /// * `thread` - Thread address, as derived by the scheduler
    /// * `record` - Counter record address, as derived from `SEED_COUNTER`
    ///
    /// # Errors
    /// * `InvalidRecord` - If `record` is not the derived record address
    /// * `AlreadyInitialized` - If the record already exists
    /// * `NotConfigured` - If `init` was never called
    /// * `InvalidThread` - If `thread` does not match `thread_id`
    pub fn initialize(
        env: Env,
        payer: Address,
        thread_id: Bytes,
        thread: BytesN<32>,
        record: BytesN<32>,
    ) -> Result<(), Error> {
        payer.require_auth();

        Self::check_record(&env, &record)?;
        if env.storage().instance().has(&symbol_short!("RECORD")) {
            return Err(Error::AlreadyInitialized);
        }

        let config = Self::config(&env)?;
        let scheduler = SchedulerClient::new(&env, &config.scheduler);
        let authority = env.current_contract_address();
        if scheduler.thread_pubkey(&authority, &thread_id) != thread {
            return Err(Error::InvalidThread);
        }

        Self::extend_instance_ttl(&env);
        TokenClient::new(&env, &config.token).transfer(&payer, &authority, &RECORD_DEPOSIT);

        let target = ThreadInstruction {
            program_id: authority.clone(),
            function: Symbol::new(&env, "increment"),
        };
        scheduler.thread_create(
            &payer,
            &authority,
            &thread_id,
            &THREAD_FUNDING,
            &target,
            &Trigger::Interval(COUNTER_INTERVAL_SECS),
        );

        let counter = CounterRecord {
            address: record.clone(),
            counter: 0,
            payer: payer.clone(),
            thread: thread.clone(),
            thread_id,
            created_at: env.ledger().timestamp(),
        };
        env.storage()
            .instance()
            .set(&symbol_short!("RECORD"), &counter);

        env.events().publish(
            (symbol_short!("counter"), CounterEvent::Initialized),
            (record, thread, payer),
        );

        Ok(())
    }

    /// Run by the thread on each tick. Only the scheduler may call it.
    ///
    /// # Errors
    /// * `NotInitialized` - If the record is gone
    /// * `InvalidThread` - If `thread` is not the thread this record owns
    /// * `CounterOverflow` - If the counter is already at its maximum
    pub fn increment(env: Env, thread: BytesN<32>) -> Result<u32, Error> {
        let config = Self::config(&env)?;
        config.scheduler.require_auth();

        let mut record = Self::load_record(&env)?;
        if record.thread != thread {
            return Err(Error::InvalidThread);
        }

        record.counter = record
            .counter
            .checked_add(1)
            .ok_or(Error::CounterOverflow)?;
        let counter = record.counter;

        Self::extend_instance_ttl(&env);
        env.storage()
            .instance()
            .set(&symbol_short!("RECORD"), &record);

        env.events().publish(
            (symbol_short!("counter"), CounterEvent::Incremented),
            counter,
        );

        Ok(counter)
    }

    /// Pause the thread. The original payer must authorize.
    pub fn pause(env: Env, thread: BytesN<32>, record: BytesN<32>) -> Result<(), Error> {
        let counter = Self::owned_thread(&env, &thread, &record)?;
        counter.payer.require_auth();

        let config = Self::config(&env)?;
        SchedulerClient::new(&env, &config.scheduler)
            .thread_pause(&env.current_contract_address(), &thread);

        env.events()
            .publish((symbol_short!("counter"), CounterEvent::Paused), thread);

        Ok(())
    }

    /// Resume a paused thread. The original payer must authorize.
    pub fn resume(env: Env, thread: BytesN<32>, record: BytesN<32>) -> Result<(), Error> {
        let counter = Self::owned_thread(&env, &thread, &record)?;
        counter.payer.require_auth();

        let config = Self::config(&env)?;
        SchedulerClient::new(&env, &config.scheduler)
            .thread_resume(&env.current_contract_address(), &thread);

        env.events()
            .publish((symbol_short!("counter"), CounterEvent::Resumed), thread);

        Ok(())
    }

    /// Delete the thread, refunding its balance to `user`.
    ///
    /// # Arguments
    /// * `user` - The original payer (must authorize)
    /// * `thread` - Thread address
    /// * `record` - Counter record address
    ///
    /// # Errors
    /// * `Unauthorized` - If `user` did not pay for the record
    pub fn delete(
        env: Env,
        user: Address,
        thread: BytesN<32>,
        record: BytesN<32>,
    ) -> Result<(), Error> {
        user.require_auth();

        let counter = Self::owned_thread(&env, &thread, &record)?;
        if counter.payer != user {
            return Err(Error::Unauthorized);
        }

        let config = Self::config(&env)?;
        SchedulerClient::new(&env, &config.scheduler).thread_delete(
            &env.current_contract_address(),
            &user,
            &thread,
        );

        env.events().publish(
            (symbol_short!("counter"), CounterEvent::Deleted),
            (thread, user),
        );

        Ok(())
    }

    /// Close the counter record and refund its deposit to `destination`.
    ///
    /// # Errors
    /// * `InvalidRecord` - If `record` is not the derived record address
    /// * `NotInitialized` - If there is no record to close
    /// * `Unauthorized` - If `destination` did not pay for the record
    /// * `ThreadActive` - If the record's thread has not been deleted
    pub fn close_account(env: Env, destination: Address, record: BytesN<32>) -> Result<(), Error> {
        destination.require_auth();

        Self::check_record(&env, &record)?;
        let counter = Self::load_record(&env)?;
        if counter.payer != destination {
            return Err(Error::Unauthorized);
        }

        let config = Self::config(&env)?;
        if SchedulerClient::new(&env, &config.scheduler)
            .get_thread(&counter.thread)
            .is_some()
        {
            return Err(Error::ThreadActive);
        }

        env.storage().instance().remove(&symbol_short!("RECORD"));
        TokenClient::new(&env, &config.token).transfer(
            &env.current_contract_address(),
            &destination,
            &RECORD_DEPOSIT,
        );

        env.events().publish(
            (symbol_short!("counter"), CounterEvent::Closed),
            (record, destination),
        );

        Ok(())
    }

    pub fn get_record(env: Env) -> Option<CounterRecord> {
        env.storage().instance().get(&symbol_short!("RECORD"))
    }

    /// Current counter value, 0 when there is no record.
    pub fn get_counter(env: Env) -> u32 {
        Self::get_record(env).map(|r| r.counter).unwrap_or(0)
    }

    pub fn record_address(env: Env) -> BytesN<32> {
        derive_record_address(&env, &env.current_contract_address())
    }

    /// The program itself owns and signs for its thread.
    pub fn thread_authority(env: Env) -> Address {
        env.current_contract_address()
    }

    fn check_record(env: &Env, record: &BytesN<32>) -> Result<(), Error> {
        if *record != derive_record_address(env, &env.current_contract_address()) {
            return Err(Error::InvalidRecord);
        }
        Ok(())
    }

    /// Load the record at `record` and check it owns `thread`.
    fn owned_thread(
        env: &Env,
        thread: &BytesN<32>,
        record: &BytesN<32>,
    ) -> Result<CounterRecord, Error> {
        Self::check_record(env, record)?;
        let counter = Self::load_record(env)?;
        if counter.thread != *thread {
            return Err(Error::InvalidThread);
        }
        Self::extend_instance_ttl(env);
        Ok(counter)
    }

    fn load_record(env: &Env) -> Result<CounterRecord, Error> {
        env.storage()
            .instance()
            .get(&symbol_short!("RECORD"))
            .ok_or(Error::NotInitialized)
    }

    fn config(env: &Env) -> Result<ProgramConfig, Error> {
        env.storage()
            .instance()
            .get(&symbol_short!("CONFIG"))
            .ok_or(Error::NotConfigured)
    }

    /// Extend the TTL of instance storage
    fn extend_instance_ttl(env: &Env) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
    }
}

mod test;
