mod common;

use std::time::Duration;

use common::*;
use master::Scheduler;
use protocol::FunctionRef;
use serde::{Deserialize, Serialize};
use worker::{
    functions::FunctionRegistry,
    worker::{connect_until_success, run_session, WorkerConfig},
};

/// Stand-in for a candidate's weight vector plus the number of games to play.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct Candidate {
    weights: Vec<f64>,
    games: u32,
}

fn fitness_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register_map("fitness", "score", |c: Candidate| {
        c.weights.iter().sum::<f64>() * c.games as f64
    });
    registry
}

#[tokio::test]
async fn workers_download_then_compute() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("tetris")).unwrap();
    std::fs::write(root.path().join("candidate.bin"), vec![7u8; 1000]).unwrap();
    std::fs::write(root.path().join("tetris/board.bin"), b"board").unwrap();

    let mut cfg = config(root.path());
    cfg.required_dirs = vec!["tetris".to_string()];
    cfg.required_files = vec!["candidate.bin".to_string(), "tetris/board.bin".to_string()];
    let mut scheduler = Scheduler::start(&cfg).await.unwrap();

    let mut sessions = vec![];
    let mut stagings = vec![];
    for capacity in [2, 3] {
        let staging = tempfile::tempdir().unwrap();
        let worker_cfg = WorkerConfig {
            master_addr: scheduler.local_addr().to_string(),
            staging_dir: staging.path().join("downloaded"),
            capacity: Some(capacity),
            idle_timeout_ms: 50,
            handshake_timeout_ms: 2000,
            ..Default::default()
        };
        stagings.push(staging);
        sessions.push(tokio::spawn(async move {
            let registry = fitness_registry();
            let mut conn = connect_until_success(&worker_cfg.master_addr).await;
            run_session(&mut conn, &worker_cfg, &registry).await
        }));
    }
    wait_for_workers(&scheduler, 2).await;

    let candidates: Vec<Candidate> = (0..10)
        .map(|i| Candidate {
            weights: vec![i as f64, 0.5],
            games: 2,
        })
        .collect();
    let mut results: Vec<(u64, f64)> = scheduler
        .dispatch_typed(&candidates, &FunctionRef::new("fitness", "score"))
        .await
        .unwrap();
    results.sort_by_key(|(id, _)| *id);

    assert_eq!(results.len(), 10);
    for (id, score) in &results {
        assert_eq!(*score, (*id as f64 + 0.5) * 2.0);
    }

    scheduler.shutdown().await.unwrap();
    for session in sessions {
        tokio::time::timeout(Duration::from_secs(5), session)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    for staging in &stagings {
        let dir = staging.path().join("downloaded");
        assert_eq!(std::fs::read(dir.join("candidate.bin")).unwrap(), vec![7u8; 1000]);
        assert_eq!(std::fs::read(dir.join("tetris/board.bin")).unwrap(), b"board");
    }
}

#[tokio::test]
async fn unknown_function_costs_the_worker_not_the_cycle() {
    let root = tempfile::tempdir().unwrap();
    let mut scheduler = Scheduler::start(&config(root.path())).await.unwrap();

    // registers nothing useful: every batch ends its session
    let staging = tempfile::tempdir().unwrap();
    let broken_cfg = WorkerConfig {
        master_addr: scheduler.local_addr().to_string(),
        staging_dir: staging.path().to_path_buf(),
        capacity: Some(4),
        ..Default::default()
    };
    let broken = tokio::spawn(async move {
        let registry = FunctionRegistry::new();
        let mut conn = connect_until_success(&broken_cfg.master_addr).await;
        run_session(&mut conn, &broken_cfg, &registry).await
    });
    wait_for_workers(&scheduler, 1).await;

    let good = FakeWorker::connect(scheduler.local_addr(), 4).await;
    wait_for_workers(&scheduler, 2).await;
    let good = tokio::spawn(good.serve_upper());

    let results = scheduler.dispatch(args(&["a", "b", "c", "d"]), &upper()).await;
    assert_eq!(results.len(), 4);
    assert!(broken.await.unwrap().is_err());

    scheduler.shutdown().await.unwrap();
    good.await.unwrap();
}
