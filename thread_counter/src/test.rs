#![cfg(test)]

use super::*;
use soroban_sdk::{
    testutils::{Address as _, Events, Ledger, MockAuth, MockAuthInvoke},
    token::{StellarAssetClient, TokenClient},
    vec, IntoVal,
};
use thread_program::{ThreadProgram, ThreadProgramClient};

struct Setup<'a> {
    env: Env,
    contract_id: Address,
    client: ThreadCounterClient<'a>,
    scheduler: ThreadProgramClient<'a>,
    token: TokenClient<'a>,
    admin: Address,
    payer: Address,
}

fn setup<'a>() -> Setup<'a> {
    let env = Env::default();
    env.mock_all_auths();
    env.ledger().with_mut(|li| li.timestamp = 1_000);

    let admin = Address::generate(&env);
    let payer = Address::generate(&env);

    let sac = env.register_stellar_asset_contract_v2(admin.clone());
    let token = TokenClient::new(&env, &sac.address());
    StellarAssetClient::new(&env, &sac.address()).mint(&payer, &STROOPS_PER_UNIT);

    let scheduler_id = env.register_contract(None, ThreadProgram);
    let scheduler = ThreadProgramClient::new(&env, &scheduler_id);
    scheduler.init(&admin, &sac.address());

    let contract_id = env.register_contract(None, ThreadCounter);
    let client = ThreadCounterClient::new(&env, &contract_id);
    client.init(&admin, &scheduler_id, &sac.address());

    Setup {
        env,
        contract_id,
        client,
        scheduler,
        token,
        admin,
        payer,
    }
}

fn thread_id(env: &Env) -> Bytes {
    Bytes::from_slice(env, b"counter")
}

fn thread_key(s: &Setup) -> BytesN<32> {
    s.scheduler.thread_pubkey(&s.contract_id, &thread_id(&s.env))
}

fn record_key(s: &Setup) -> BytesN<32> {
    derive_record_address(&s.env, &s.contract_id)
}

fn initialize(s: &Setup) -> (BytesN<32>, BytesN<32>) {
    let thread = thread_key(s);
    let record = record_key(s);
    s.client
        .initialize(&s.payer, &thread_id(&s.env), &thread, &record);
    (thread, record)
}

fn warp(env: &Env, seconds: u64) {
    env.ledger().with_mut(|li| li.timestamp += seconds);
}

#[test]
fn test_derive_record_address() {
    let s = setup();
    let other_program = Address::generate(&s.env);

    let record = record_key(&s);
    assert_eq!(record, s.client.record_address());
    assert_eq!(record, derive_record_address(&s.env, &s.contract_id));
    assert_ne!(record, derive_record_address(&s.env, &other_program));
    assert_ne!(
        record,
        derive_address(&s.env, &[b"authority".as_slice()], &s.contract_id)
    );
}

#[test]
fn test_thread_authority_is_program() {
    let s = setup();
    assert_eq!(s.client.thread_authority(), s.contract_id);
}

#[test]
fn test_initialize() {
    let s = setup();
    let (thread, record) = initialize(&s);

    let counter = s.client.get_record().unwrap();
    assert_eq!(counter.address, record);
    assert_eq!(counter.counter, 0);
    assert_eq!(counter.payer, s.payer);
    assert_eq!(counter.thread, thread);
    assert_eq!(counter.thread_id, thread_id(&s.env));
    assert_eq!(counter.created_at, 1_000);

    let created = s.scheduler.get_thread(&thread).unwrap();
    assert_eq!(created.authority, s.contract_id);
    assert_eq!(created.balance, THREAD_FUNDING);
    assert_eq!(
        created.trigger,
        thread_program::Trigger::Interval(COUNTER_INTERVAL_SECS)
    );
    assert!(!created.paused);

    assert_eq!(
        s.token.balance(&s.payer),
        STROOPS_PER_UNIT - THREAD_FUNDING - RECORD_DEPOSIT
    );
    assert_eq!(s.token.balance(&s.contract_id), RECORD_DEPOSIT);
}

#[test]
fn test_initialize_emits_event() {
    let s = setup();
    let (thread, record) = initialize(&s);

    let events = s.env.events().all();
    let last = events.last().unwrap();

    let expected_topics = vec![
        &s.env,
        symbol_short!("counter").into_val(&s.env),
        CounterEvent::Initialized.into_val(&s.env),
    ];
    assert_eq!(last.0, s.contract_id.clone());
    assert_eq!(last.1, expected_topics);

    let data: (BytesN<32>, BytesN<32>, Address) =
        soroban_sdk::FromVal::from_val(&s.env, &last.2);
    assert_eq!(data, (record, thread, s.payer.clone()));
}

#[test]
fn test_initialize_invalid_record() {
    let s = setup();
    let wrong = derive_address(&s.env, &[b"Dummyy".as_slice()], &s.contract_id);

    let result =
        s.client
            .try_initialize(&s.payer, &thread_id(&s.env), &thread_key(&s), &wrong);
    assert_eq!(result, Err(Ok(Error::InvalidRecord)));
    assert!(s.client.get_record().is_none());
}

#[test]
fn test_initialize_invalid_thread() {
    let s = setup();
    let other = s
        .scheduler
        .thread_pubkey(&s.contract_id, &Bytes::from_slice(&s.env, b"other"));

    let result =
        s.client
            .try_initialize(&s.payer, &thread_id(&s.env), &other, &record_key(&s));
    assert_eq!(result, Err(Ok(Error::InvalidThread)));
    assert_eq!(s.token.balance(&s.payer), STROOPS_PER_UNIT);
}

#[test]
fn test_initialize_twice() {
    let s = setup();
    let (thread, record) = initialize(&s);

    let result = s
        .client
        .try_initialize(&s.payer, &thread_id(&s.env), &thread, &record);
    assert_eq!(result, Err(Ok(Error::AlreadyInitialized)));
}

#[test]
fn test_initialize_not_configured() {
    let env = Env::default();
    env.mock_all_auths();
    let contract_id = env.register_contract(None, ThreadCounter);
    let client = ThreadCounterClient::new(&env, &contract_id);
    let payer = Address::generate(&env);

    let result = client.try_initialize(
        &payer,
        &thread_id(&env),
        &BytesN::from_array(&env, &[0u8; 32]),
        &derive_record_address(&env, &contract_id),
    );
    assert_eq!(result, Err(Ok(Error::NotConfigured)));
}

#[test]
#[should_panic(expected = "Contract already initialized")]
fn test_init_twice() {
    let s = setup();
    let scheduler = s.scheduler.address.clone();
    let token = s.token.address.clone();
    s.client.init(&s.admin, &scheduler, &token);
}

#[test]
fn test_thread_increments_counter() {
    let s = setup();
    let (thread, _) = initialize(&s);
    let worker = Address::generate(&s.env);

    warp(&s.env, COUNTER_INTERVAL_SECS);
    s.scheduler.thread_exec(&worker, &thread);
    assert_eq!(s.client.get_counter(), 1);

    warp(&s.env, COUNTER_INTERVAL_SECS);
    s.scheduler.thread_exec(&worker, &thread);
    assert_eq!(s.client.get_counter(), 2);
}

#[test]
fn test_increment_rejects_foreign_thread() {
    let s = setup();
    initialize(&s);
    let foreign = BytesN::from_array(&s.env, &[9u8; 32]);

    let result = s.client.try_increment(&foreign);
    assert_eq!(result, Err(Ok(Error::InvalidThread)));
    assert_eq!(s.client.get_counter(), 0);
}

#[test]
fn test_increment_without_record() {
    let s = setup();
    let result = s.client.try_increment(&thread_key(&s));
    assert_eq!(result, Err(Ok(Error::NotInitialized)));
}

#[test]
fn test_pause_and_resume() {
    let s = setup();
    let (thread, record) = initialize(&s);
    let worker = Address::generate(&s.env);

    s.client.pause(&thread, &record);
    assert!(s.scheduler.get_thread(&thread).unwrap().paused);

    warp(&s.env, COUNTER_INTERVAL_SECS);
    let result = s.scheduler.try_thread_exec(&worker, &thread);
    assert_eq!(result, Err(Ok(thread_program::Error::ThreadPaused)));
    assert_eq!(s.client.get_counter(), 0);

    s.client.resume(&thread, &record);
    assert!(!s.scheduler.get_thread(&thread).unwrap().paused);

    s.scheduler.thread_exec(&worker, &thread);
    assert_eq!(s.client.get_counter(), 1);
}

#[test]
fn test_pause_wrong_addresses() {
    let s = setup();
    let (thread, record) = initialize(&s);
    let bogus = BytesN::from_array(&s.env, &[1u8; 32]);

    let result = s.client.try_pause(&bogus, &record);
    assert_eq!(result, Err(Ok(Error::InvalidThread)));

    let result = s.client.try_pause(&thread, &bogus);
    assert_eq!(result, Err(Ok(Error::InvalidRecord)));
}

#[test]
fn test_delete_refunds_thread_balance() {
    let s = setup();
    let (thread, record) = initialize(&s);
    let before = s.token.balance(&s.payer);

    let stranger = Address::generate(&s.env);
    let result = s.client.try_delete(&stranger, &thread, &record);
    assert_eq!(result, Err(Ok(Error::Unauthorized)));

    s.client.delete(&s.payer, &thread, &record);
    assert!(s.scheduler.get_thread(&thread).is_none());
    assert_eq!(s.token.balance(&s.payer), before + THREAD_FUNDING);

    // the record outlives its thread until closed
    assert!(s.client.get_record().is_some());
}

#[test]
fn test_close_account() {
    let s = setup();
    let (thread, record) = initialize(&s);
    s.client.delete(&s.payer, &thread, &record);

    let stranger = Address::generate(&s.env);
    let result = s.client.try_close_account(&stranger, &record);
    assert_eq!(result, Err(Ok(Error::Unauthorized)));

    s.client.close_account(&s.payer, &record);
    assert!(s.client.get_record().is_none());
    assert_eq!(s.client.get_counter(), 0);
    assert_eq!(s.token.balance(&s.payer), STROOPS_PER_UNIT);
    assert_eq!(s.token.balance(&s.contract_id), 0);

    let result = s.client.try_close_account(&s.payer, &record);
    assert_eq!(result, Err(Ok(Error::NotInitialized)));
}

#[test]
fn test_close_account_while_thread_active() {
    let s = setup();
    let (thread, record) = initialize(&s);

    let result = s.client.try_close_account(&s.payer, &record);
    assert_eq!(result, Err(Ok(Error::ThreadActive)));

    // nothing moved, and the thread can still be deleted
    assert!(s.client.get_record().is_some());
    assert_eq!(s.token.balance(&s.contract_id), RECORD_DEPOSIT);
    assert_eq!(s.scheduler.get_thread(&thread).unwrap().balance, THREAD_FUNDING);

    s.client.delete(&s.payer, &thread, &record);
    s.client.close_account(&s.payer, &record);
    assert_eq!(s.token.balance(&s.payer), STROOPS_PER_UNIT);
}

#[test]
fn test_increment_overflow() {
    let s = setup();
    let (thread, _) = initialize(&s);

    s.env.as_contract(&s.contract_id, || {
        let mut record: CounterRecord = s
            .env
            .storage()
            .instance()
            .get(&symbol_short!("RECORD"))
            .unwrap();
        record.counter = u32::MAX;
        s.env
            .storage()
            .instance()
            .set(&symbol_short!("RECORD"), &record);
    });

    let result = s.client.try_increment(&thread);
    assert_eq!(result, Err(Ok(Error::CounterOverflow)));
    assert_eq!(s.client.get_counter(), u32::MAX);
}

#[test]
#[should_panic]
fn test_increment_requires_scheduler_auth() {
    let s = setup();
    let (thread, _) = initialize(&s);
    let caller = Address::generate(&s.env);

    s.env.mock_auths(&[MockAuth {
        address: &caller,
        invoke: &MockAuthInvoke {
            contract: &s.contract_id,
            fn_name: "increment",
            args: (thread.clone(),).into_val(&s.env),
            sub_invokes: &[],
        },
    }]);

    s.client.increment(&thread);
}

#[test]
#[should_panic]
fn test_pause_requires_payer_auth() {
    let s = setup();
    let (thread, record) = initialize(&s);
    let stranger = Address::generate(&s.env);

    s.env.mock_auths(&[MockAuth {
        address: &stranger,
        invoke: &MockAuthInvoke {
            contract: &s.contract_id,
            fn_name: "pause",
            args: (thread.clone(), record.clone()).into_val(&s.env),
            sub_invokes: &[],
        },
    }]);

    s.client.pause(&thread, &record);
}

#[test]
#[should_panic]
fn test_resume_requires_payer_auth() {
    let s = setup();
    let (thread, record) = initialize(&s);
    s.client.pause(&thread, &record);
    let stranger = Address::generate(&s.env);

    s.env.mock_auths(&[MockAuth {
        address: &stranger,
        invoke: &MockAuthInvoke {
            contract: &s.contract_id,
            fn_name: "resume",
            args: (thread.clone(), record.clone()).into_val(&s.env),
            sub_invokes: &[],
        },
    }]);

    s.client.resume(&thread, &record);
}

#[test]
fn test_pause_and_resume_with_payer_auth() {
    let s = setup();
    let (thread, record) = initialize(&s);

    s.env.mock_auths(&[MockAuth {
        address: &s.payer,
        invoke: &MockAuthInvoke {
            contract: &s.contract_id,
            fn_name: "pause",
            args: (thread.clone(), record.clone()).into_val(&s.env),
            sub_invokes: &[],
        },
    }]);
    s.client.pause(&thread, &record);
    assert!(s.scheduler.get_thread(&thread).unwrap().paused);

    s.env.mock_auths(&[MockAuth {
        address: &s.payer,
        invoke: &MockAuthInvoke {
            contract: &s.contract_id,
            fn_name: "resume",
            args: (thread.clone(), record.clone()).into_val(&s.env),
            sub_invokes: &[],
        },
    }]);
    s.client.resume(&thread, &record);
    assert!(!s.scheduler.get_thread(&thread).unwrap().paused);
}
