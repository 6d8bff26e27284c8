//! End-to-end orchestration tests over a scripted engine and a paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use litewallet_sync::engine::{EngineConnector, EngineError, EngineGateway};
use litewallet_sync::transaction::SendItem;
use litewallet_sync::wallet::{
    RefreshScheduler, SchedulerConfig, SendError, SendMonitor, SyncConfig, SyncOrchestrator,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine double: per-command response queues, the last entry repeating
/// once the queue is drained. Unknown commands answer `{}`.
struct ScriptedEngine {
    responses: Mutex<HashMap<String, VecDeque<String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn script(&self, command: &str, responses: &[&str]) {
        self.responses.lock().unwrap().insert(
            command.to_string(),
            responses.iter().map(|r| r.to_string()).collect(),
        );
    }

    fn count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == command)
            .count()
    }
}

#[async_trait]
impl EngineConnector for ScriptedEngine {
    async fn execute(&self, command: &str, _arg: &str) -> Result<String, EngineError> {
        self.calls.lock().unwrap().push(command.to_string());
        let mut responses = self.responses.lock().unwrap();
        Ok(match responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| "{}".to_string()),
            None => "{}".to_string(),
        })
    }
}

/// Wrapper that yields before answering, so two callers awaiting engine
/// commands actually interleave on the test runtime.
struct InterleavedEngine {
    inner: Arc<ScriptedEngine>,
}

#[async_trait]
impl EngineConnector for InterleavedEngine {
    async fn execute(&self, command: &str, arg: &str) -> Result<String, EngineError> {
        tokio::task::yield_now().await;
        self.inner.execute(command, arg).await
    }
}

fn orchestrator_over(engine: &Arc<ScriptedEngine>) -> Arc<SyncOrchestrator> {
    let gateway = Arc::new(EngineGateway::new(Arc::clone(engine) as Arc<dyn EngineConnector>));
    SyncOrchestrator::new(gateway, SyncConfig::default())
}

fn scripted_chain(engine: &ScriptedEngine, wallet_height: u64, server_height: u64) {
    engine.script(
        "height",
        &[
            &format!(r#"{{"height":{wallet_height}}}"#),
            &format!(r#"{{"height":{server_height}}}"#),
        ],
    );
    engine.script(
        "info",
        &[&format!(
            r#"{{"chain_name":"main","latest_block_height":{server_height},"server_uri":"https://lwd.example:9067","vendor":"zingolib","git_commit":"abcdef123456","version":"1.0.0"}}"#
        )],
    );
    engine.script("defaultfee", &[r#"{"defaultfee":10000}"#]);
    engine.script("seed", &[r#"{"seed":"stub words","birthday":50}"#]);
    engine.script(
        "balance",
        &[r#"{"orchard_balance":100000000,"sapling_balance":0,"transparent_balance":0,"spendable_orchard_balance":100000000,"spendable_sapling_balance":0}"#],
    );
    engine.script("notes", &[r#"{"pending_orchard_notes":[],"pending_sapling_notes":[],"pending_utxos":[],"unspent_orchard_notes":[],"unspent_sapling_notes":[],"unspent_utxos":[]}"#]);
    engine.script(
        "addresses",
        &[r#"[{"address":"u1main","receivers":{"transparent":"t1main","sapling":"zs1main","orchard_exists":true}}]"#],
    );
    engine.script("summaries", &["[]"]);
    engine.script("getoption", &[r#"{"download_memos":"wallet"}"#]);
    engine.script("save", &["saved"]);
    engine.script("sync", &["{}"]);
}

#[tokio::test(start_paused = true)]
async fn refresh_drives_a_run_to_terminal_progress() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 100, 300);
    engine.script(
        "syncstatus",
        &[
            r#"{"in_progress":true,"sync_id":7,"batch_num":0,"batch_total":2,"end_block":100,"synced_blocks":50,"trial_decryptions_blocks":50,"witnesses_updated":50}"#,
            r#"{"in_progress":true,"sync_id":7,"batch_num":1,"batch_total":2,"end_block":200,"synced_blocks":20,"trial_decryptions_blocks":20,"witnesses_updated":20}"#,
            r#"{"in_progress":false,"sync_id":7}"#,
        ],
    );

    let orchestrator = orchestrator_over(&engine);
    orchestrator.refresh(false, false).await;

    let progress = orchestrator.sync_progress();
    assert!(!progress.in_progress);
    assert!(!progress.stalled);
    assert_eq!(progress.sync_id, 7);
    assert_eq!(progress.last_block_wallet, 300);
    assert_eq!(progress.last_block_server, 300);
    assert_eq!(progress.current_block, 300);
    assert!(!orchestrator.is_refreshing());

    // One save at the batch boundary plus one at the end of the run.
    assert_eq!(engine.count("sync"), 1);
    assert!(engine.count("save") >= 2);
    assert_eq!(orchestrator.wallet_height(), 300);
    assert_eq!(orchestrator.info().unwrap().currency_name, "ZEC");
    assert_eq!(
        orchestrator.total_balance().orchard,
        rust_decimal::Decimal::ONE
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_refreshes_run_a_single_sync() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 100, 300);
    engine.script("syncstatus", &[r#"{"in_progress":false,"sync_id":1}"#]);

    let orchestrator = orchestrator_over(&engine);
    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.refresh(false, false).await })
    };
    let second = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.refresh(false, false).await })
    };
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(engine.count("sync"), 1);
    assert!(!orchestrator.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn refresh_is_deferred_while_the_server_height_is_unknown() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 100, 300);
    engine.script(
        "info",
        &[r#"{"chain_name":"main","latest_block_height":0,"vendor":"zingolib","git_commit":"abcdef123456","version":"1.0.0"}"#],
    );

    let orchestrator = orchestrator_over(&engine);
    orchestrator.refresh(false, false).await;

    assert_eq!(engine.count("sync"), 0);
    assert!(!orchestrator.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn refresh_is_a_no_op_at_the_chain_tip() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 300, 300);
    engine.script("height", &[r#"{"height":300}"#]);

    let orchestrator = orchestrator_over(&engine);
    orchestrator.refresh(false, false).await;

    assert_eq!(engine.count("sync"), 0);
    let progress = orchestrator.sync_progress();
    assert!(!progress.in_progress);
    assert_eq!(progress.last_block_wallet, 300);
    assert_eq!(progress.current_block, 300);
}

#[tokio::test(start_paused = true)]
async fn send_resolves_once_with_the_new_txid() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 300, 300);
    engine.script("syncstatus", &[r#"{"in_progress":false,"sync_id":1}"#]);
    engine.script("send", &["sent"]);
    engine.script(
        "sendprogress",
        &[
            r#"{"id":4,"sending":false}"#,
            r#"{"id":4,"sending":true}"#,
            r#"{"id":5,"sending":false,"txid":"deadbeef"}"#,
        ],
    );

    let gateway = Arc::new(EngineGateway::new(
        Arc::clone(&engine) as Arc<dyn EngineConnector>
    ));
    let orchestrator = SyncOrchestrator::new(Arc::clone(&gateway), SyncConfig::default());
    let monitor = SendMonitor::new(gateway, Arc::clone(&orchestrator));

    let payload = vec![SendItem {
        address: "zs1dest".to_string(),
        amount: 10_000,
        memo: None,
    }];
    let txid = monitor.send(&payload).await.unwrap();
    assert_eq!(txid, "deadbeef");
    assert_eq!(engine.count("send"), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_send_surfaces_the_engine_message() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 300, 300);
    engine.script("send", &["sent"]);
    engine.script(
        "sendprogress",
        &[
            r#"{"id":4,"sending":false}"#,
            r#"{"id":5,"sending":false,"error":"insufficient funds"}"#,
        ],
    );

    let gateway = Arc::new(EngineGateway::new(
        Arc::clone(&engine) as Arc<dyn EngineConnector>
    ));
    let orchestrator = SyncOrchestrator::new(Arc::clone(&gateway), SyncConfig::default());
    let monitor = SendMonitor::new(gateway, Arc::clone(&orchestrator));

    let payload = vec![SendItem {
        address: "zs1dest".to_string(),
        amount: 10_000,
        memo: None,
    }];
    match monitor.send(&payload).await {
        Err(SendError::Rejected(message)) => assert_eq!(message, "insufficient funds"),
        other => panic!("expected rejection, got {other:?}"),
    }
    // No refresh is kicked off for a failed send.
    assert_eq!(engine.count("sync"), 0);
}

#[tokio::test(start_paused = true)]
async fn second_send_is_refused_while_one_is_in_flight() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 300, 300);
    engine.script("send", &["sent"]);
    // Never reaches a terminal state: the id the monitor saw before
    // submitting keeps coming back.
    engine.script("sendprogress", &[r#"{"id":4,"sending":true}"#]);

    let gateway = Arc::new(EngineGateway::new(
        Arc::clone(&engine) as Arc<dyn EngineConnector>
    ));
    let orchestrator = SyncOrchestrator::new(Arc::clone(&gateway), SyncConfig::default());
    let monitor = Arc::new(SendMonitor::new(gateway, Arc::clone(&orchestrator)));

    let payload = vec![SendItem {
        address: "zs1dest".to_string(),
        amount: 10_000,
        memo: None,
    }];
    let stuck = {
        let monitor = Arc::clone(&monitor);
        let payload = payload.clone();
        tokio::spawn(async move { monitor.send(&payload).await })
    };
    tokio::task::yield_now().await;

    match monitor.send(&payload).await {
        Err(SendError::SendInFlight) => {}
        other => panic!("expected in-flight refusal, got {other:?}"),
    }
    stuck.abort();
}

#[tokio::test(start_paused = true)]
async fn update_data_refreshes_cached_state() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 300, 300);

    let orchestrator = orchestrator_over(&engine);
    orchestrator.update_data().await;

    assert_eq!(orchestrator.wallet_height(), 300);
    assert_eq!(
        orchestrator.total_balance().orchard,
        rust_decimal::Decimal::ONE
    );
    assert_eq!(orchestrator.wallet_settings().download_memos, "wallet");
    assert_eq!(orchestrator.addresses().len(), 3);
    assert_eq!(engine.count("sync"), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_update_data_runs_a_single_reload() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 300, 300);

    let gateway = Arc::new(EngineGateway::new(Arc::new(InterleavedEngine {
        inner: Arc::clone(&engine),
    }) as Arc<dyn EngineConnector>));
    let orchestrator = SyncOrchestrator::new(gateway, SyncConfig::default());

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.update_data().await })
    };
    // Let the first call claim the busy flag and park inside a fetch.
    tokio::task::yield_now().await;
    orchestrator.update_data().await;
    first.await.unwrap();

    assert_eq!(engine.count("height"), 1);
    assert_eq!(engine.count("balance"), 1);
    assert_eq!(orchestrator.wallet_height(), 300);
}

#[tokio::test(start_paused = true)]
async fn update_data_throttles_to_every_fifth_call_during_a_send() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 300, 300);
    engine.script("send", &["sent"]);
    // Keeps reporting the pre-submit id, so the send never terminates and
    // its guard stays held for the whole test.
    engine.script("sendprogress", &[r#"{"id":4,"sending":true}"#]);

    let gateway = Arc::new(EngineGateway::new(
        Arc::clone(&engine) as Arc<dyn EngineConnector>
    ));
    let orchestrator = SyncOrchestrator::new(Arc::clone(&gateway), SyncConfig::default());
    let monitor = Arc::new(SendMonitor::new(gateway, Arc::clone(&orchestrator)));

    let payload = vec![SendItem {
        address: "zs1dest".to_string(),
        amount: 10_000,
        memo: None,
    }];
    let stuck = {
        let monitor = Arc::clone(&monitor);
        let payload = payload.clone();
        tokio::spawn(async move { monitor.send(&payload).await })
    };
    tokio::task::yield_now().await;

    for _ in 0..4 {
        orchestrator.update_data().await;
    }
    assert_eq!(engine.count("height"), 0);

    orchestrator.update_data().await;
    assert_eq!(engine.count("height"), 1);

    stuck.abort();
}

#[tokio::test(start_paused = true)]
async fn submit_time_engine_rejection_surfaces_as_rejected() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 300, 300);
    engine.script("send", &["Error: insufficient funds"]);
    engine.script("sendprogress", &[r#"{"id":4,"sending":false}"#]);

    let gateway = Arc::new(EngineGateway::new(
        Arc::clone(&engine) as Arc<dyn EngineConnector>
    ));
    let orchestrator = SyncOrchestrator::new(Arc::clone(&gateway), SyncConfig::default());
    let monitor = SendMonitor::new(gateway, Arc::clone(&orchestrator));

    let payload = vec![SendItem {
        address: "zs1dest".to_string(),
        amount: 10_000,
        memo: None,
    }];
    match monitor.send(&payload).await {
        Err(SendError::Rejected(message)) => assert!(message.contains("insufficient funds")),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(engine.count("sync"), 0);

    // The guard is released, so the next attempt is judged on its own.
    match monitor.send(&payload).await {
        Err(SendError::Rejected(_)) => {}
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn stop_sync_process_interrupts_and_rearms() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 100, 300);
    engine.script(
        "syncstatus",
        &[
            r#"{"in_progress":true,"sync_id":3,"batch_num":1,"batch_total":5}"#,
            r#"{"in_progress":false,"sync_id":3}"#,
        ],
    );

    let orchestrator = orchestrator_over(&engine);
    orchestrator.stop_sync_process().await;

    // One interrupt request while the run was live, one to re-arm.
    assert_eq!(engine.count("interrupt_sync_after_batch"), 2);
}

#[tokio::test(start_paused = true)]
async fn scheduler_start_is_idempotent_and_shutdown_stops_it() {
    init_tracing();
    let engine = ScriptedEngine::new();
    scripted_chain(&engine, 300, 300);

    let orchestrator = orchestrator_over(&engine);
    let scheduler = RefreshScheduler::new(orchestrator, SchedulerConfig::default());
    assert!(!scheduler.is_running());

    scheduler.start();
    assert!(scheduler.is_running());
    scheduler.start();
    assert!(scheduler.is_running());

    scheduler.shutdown();
    assert!(!scheduler.is_running());
}
