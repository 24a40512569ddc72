//! In-process ledger for driving the thread counter program end to end.
//!
//! `Localnet` plays the role of a provider: it owns the environment, a funded
//! wallet that signs every call, and the deployed programs. Each submitted
//! call is followed by `confirm`, which closes a ledger and hands back a
//! transaction id for logging.

use std::cell::Cell;
use std::fmt;

use soroban_sdk::{
    testutils::{Address as _, Ledger},
    token::{StellarAssetClient, TokenClient},
    Address, Bytes, BytesN, Env,
};
use thread_counter::{derive_record_address, ThreadCounter, ThreadCounterClient, STROOPS_PER_UNIT};
use thread_program::{ThreadProgram, ThreadProgramClient};

/// Seconds between ledger closes.
pub const LEDGER_CLOSE_SECS: u64 = 5;

/// One unit of the test asset.
pub const AIRDROP_AMOUNT: i128 = STROOPS_PER_UNIT;

/// Thread id the counter program schedules itself under.
pub const THREAD_ID: &str = "counter";

/// Identifier of a confirmed call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxId([u8; 32]);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

pub struct Localnet<'a> {
    pub env: Env,
    /// Signs and pays for every lifecycle call.
    pub wallet: Address,
    /// Cranks due threads and collects their fees.
    pub worker: Address,
    pub token: TokenClient<'a>,
    pub scheduler: ThreadProgramClient<'a>,
    pub program: ThreadCounterClient<'a>,
    token_admin: StellarAssetClient<'a>,
    nonce: Cell<u64>,
}

impl<'a> Localnet<'a> {
    /// Deploy the asset, the thread program and the counter program.
    pub fn start() -> Self {
        let env = Env::default();
        env.mock_all_auths();

        let admin = Address::generate(&env);
        let wallet = Address::generate(&env);
        let worker = Address::generate(&env);

        let sac = env.register_stellar_asset_contract_v2(admin.clone());
        let token = TokenClient::new(&env, &sac.address());
        let token_admin = StellarAssetClient::new(&env, &sac.address());

        let scheduler_id = env.register_contract(None, ThreadProgram);
        let scheduler = ThreadProgramClient::new(&env, &scheduler_id);
        scheduler.init(&admin, &sac.address());

        let program_id = env.register_contract(None, ThreadCounter);
        let program = ThreadCounterClient::new(&env, &program_id);
        program.init(&admin, &scheduler_id, &sac.address());

        Localnet {
            env,
            wallet,
            worker,
            token,
            scheduler,
            program,
            token_admin,
            nonce: Cell::new(0),
        }
    }

    /// Mint `amount` of the test asset to `to` and wait for confirmation.
    pub fn airdrop(&self, to: &Address, amount: i128) -> TxId {
        self.token_admin.mint(to, &amount);
        self.confirm("airdrop")
    }

    /// Close the ledger holding the last call and return its id.
    pub fn confirm(&self, label: &str) -> TxId {
        self.env.ledger().with_mut(|li| {
            li.sequence_number += 1;
            li.timestamp += LEDGER_CLOSE_SECS;
        });

        let nonce = self.nonce.get();
        self.nonce.set(nonce + 1);

        let mut preimage = Bytes::from_slice(&self.env, label.as_bytes());
        preimage.extend_from_slice(&self.env.ledger().sequence().to_be_bytes());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let digest: BytesN<32> = self.env.crypto().sha256(&preimage).into();
        TxId(digest.to_array())
    }

    /// Move the clock forward without closing a ledger.
    pub fn warp(&self, seconds: u64) {
        self.env.ledger().with_mut(|li| li.timestamp += seconds);
    }

    /// Run the thread as the worker and wait for confirmation.
    pub fn crank(&self, thread: &BytesN<32>) -> TxId {
        self.scheduler.thread_exec(&self.worker, thread);
        self.confirm("crank")
    }

    pub fn thread_id(&self, id: &str) -> Bytes {
        Bytes::from_slice(&self.env, id.as_bytes())
    }

    /// The counter program signs for its own thread.
    pub fn thread_authority(&self) -> Address {
        self.program.address.clone()
    }

    /// Address of thread `id`, as the thread program derives it.
    pub fn thread_address(&self, id: &str) -> BytesN<32> {
        self.scheduler
            .thread_pubkey(&self.thread_authority(), &self.thread_id(id))
    }

    /// Address of the counter record, derived on the client side.
    pub fn record_address(&self) -> BytesN<32> {
        derive_record_address(&self.env, &self.program.address)
    }
}
