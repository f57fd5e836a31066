//! Integration tests for the run lifecycle on the in-memory store.
//!
//! Covers scoring, group re-ranking on every transition, SAT handling,
//! participation blocking, run creation rules and animal assignment.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use team_penning::db::{CompetitorRepository, InMemoryStore, PassadaRepository, TrioRepository};
use team_penning::passada::{
    BatchRequest, Passada, PassadaConfig, PassadaError, PassadaManager, PassadaRequest,
    PassadaStatus, TimeEntry,
};
use team_penning::roster::{Category, CategoryKind, Competitor, Sex};
use team_penning::trio::{NewTrio, Trio, TrioManager, TrioStatus};

const EVENT: i64 = 10;
const CATEGORY: i64 = 1;

fn on() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
}

fn secs(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Store with an open category, nine riders and a run configuration
async fn setup(config: PassadaConfig) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store
        .put_category(Category::preset(CATEGORY, "Aberta", CategoryKind::Aberta))
        .await;
    for id in 1..=9 {
        let born = NaiveDate::from_ymd_opt(1990, 5, 1).unwrap();
        let rider = Competitor::new(id, format!("Rider {id}"), born, 2, Sex::Male).unwrap();
        store.put_competitor(rider).await;
    }
    store.insert_config(&config).await.unwrap();
    store
}

fn config(max_per_trio: u32, max_per_competitor: u32) -> PassadaConfig {
    let mut config = PassadaConfig::new(EVENT, CATEGORY);
    config.max_passadas_per_trio = max_per_trio;
    config.max_runs_per_competitor = max_per_competitor;
    config
}

async fn trio(store: &Arc<InMemoryStore>, members: [i64; 3]) -> Trio {
    TrioManager::new(store.clone())
        .create_trio(EVENT, CATEGORY, &members, on())
        .await
        .unwrap()
}

async fn run(store: &Arc<InMemoryStore>, trio: &Trio, number: u32) -> Passada {
    store
        .passadas_for_trio(trio.id)
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.run_number == number)
        .unwrap()
}

#[tokio::test]
async fn test_time_scoring_and_reranking() {
    let store = setup(config(1, 5)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);
    let a = trio(&store, [1, 2, 3]).await;
    let b = trio(&store, [4, 5, 6]).await;
    let run_a = run(&store, &a, 1).await;
    let run_b = run(&store, &b, 1).await;

    let report = manager
        .record_time(run_a.id, TimeEntry::new(secs(45)))
        .await
        .unwrap();
    assert_eq!(report.passada.status, PassadaStatus::Executed);
    assert_eq!(report.passada.points, Decimal::new(625, 1));
    assert_eq!(report.passada.placement, Some(1));
    assert!(report.change.counts_run);

    // A faster run pushes the first one down.
    let report = manager
        .record_time(run_b.id, TimeEntry::new(secs(40)))
        .await
        .unwrap();
    assert_eq!(report.passada.placement, Some(1));
    let shifted = store.find_passada(run_a.id).await.unwrap().unwrap();
    assert_eq!(shifted.placement, Some(2));

    // Voiding the faster run restores the first.
    let report = manager
        .apply_sat(run_b.id, "gate opened early", Some("judge".into()))
        .await
        .unwrap();
    assert_eq!(report.passada.status, PassadaStatus::Sat);
    assert_eq!(report.passada.time, None);
    assert_eq!(report.passada.placement, None);
    let restored = store.find_passada(run_a.id).await.unwrap().unwrap();
    assert_eq!(restored.placement, Some(1));

    // Recording on a voided run is refused.
    let result = manager.record_time(run_b.id, TimeEntry::new(secs(30))).await;
    assert!(matches!(result, Err(PassadaError::SatLocked(id)) if id == run_b.id));

    // Lifting the SAT leaves a pending run without its old time.
    let report = manager.remove_sat(run_b.id).await.unwrap();
    assert_eq!(report.passada.status, PassadaStatus::Pending);
    assert_eq!(report.passada.time, None);
    assert!(report.passada.sat.is_none());
}

#[tokio::test]
async fn test_time_boundaries() {
    let store = setup(config(3, 9)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);
    let a = trio(&store, [1, 2, 3]).await;

    let at_limit = run(&store, &a, 1).await;
    let report = manager
        .record_time(at_limit.id, TimeEntry::new(secs(60)))
        .await
        .unwrap();
    assert_eq!(report.passada.status, PassadaStatus::Executed);
    assert_eq!(report.passada.points, secs(50));

    let over = run(&store, &a, 2).await;
    let report = manager
        .record_time(over.id, TimeEntry::new(Decimal::new(6001, 2)))
        .await
        .unwrap();
    assert_eq!(report.passada.status, PassadaStatus::NoTime);
    assert_eq!(report.passada.points, Decimal::new(2500, 2));
    assert_eq!(report.passada.placement, None);

    let invalid = run(&store, &a, 3).await;
    let result = manager
        .record_time(invalid.id, TimeEntry::new(secs(121)))
        .await;
    assert!(matches!(result, Err(PassadaError::InvalidTime { .. })));
    let result = manager.record_time(invalid.id, TimeEntry::new(secs(-1))).await;
    assert!(matches!(result, Err(PassadaError::InvalidTime { .. })));

    // The failed attempts wrote nothing.
    let untouched = store.find_passada(invalid.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, PassadaStatus::Pending);
}

#[tokio::test]
async fn test_disqualification() {
    let store = setup(config(2, 9)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);
    let a = trio(&store, [1, 2, 3]).await;
    let first = run(&store, &a, 1).await;
    let second = run(&store, &a, 2).await;

    let result = manager.disqualify(second.id, None).await;
    assert!(matches!(
        result,
        Err(PassadaError::InvalidTransition {
            from: PassadaStatus::Pending,
            ..
        })
    ));

    manager
        .record_time(first.id, TimeEntry::new(secs(50)))
        .await
        .unwrap();
    let report = manager
        .disqualify(first.id, Some("broken barrier".into()))
        .await
        .unwrap();
    assert_eq!(report.passada.status, PassadaStatus::Disqualified);
    assert_eq!(report.passada.points, Decimal::ZERO);
    assert_eq!(report.passada.placement, None);
    assert_eq!(report.passada.time, Some(secs(50)));

    let result = manager.record_time(first.id, TimeEntry::new(secs(40))).await;
    assert!(matches!(result, Err(PassadaError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_participation_limit_blocks_members() {
    let store = setup(config(2, 2)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);
    let a = trio(&store, [1, 2, 3]).await;
    let first = run(&store, &a, 1).await;
    let second = run(&store, &a, 2).await;

    let report = manager
        .record_time(first.id, TimeEntry::new(secs(50)))
        .await
        .unwrap();
    assert!(report.newly_blocked.is_empty());

    // Re-recording the same run does not count again.
    let report = manager
        .record_time(first.id, TimeEntry::new(secs(48)))
        .await
        .unwrap();
    assert!(!report.change.counts_run);

    let report = manager
        .record_time(second.id, TimeEntry::new(secs(55)))
        .await
        .unwrap();
    let mut blocked = report.newly_blocked.clone();
    blocked.sort();
    assert_eq!(blocked, vec![1, 2, 3]);

    let check = manager.validate_run(a.id, 3, None).await.unwrap();
    assert!(!check.valid);
    assert!(!check.trio_can_compete);
    assert_eq!(check.blocked.len(), 3);
}

#[tokio::test]
async fn test_blocked_members_cannot_run_again() {
    let store = setup(config(3, 2)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);
    let a = trio(&store, [1, 2, 3]).await;

    for number in 1..=2 {
        let r = run(&store, &a, number).await;
        manager
            .record_time(r.id, TimeEntry::new(secs(50)))
            .await
            .unwrap();
    }

    let third = run(&store, &a, 3).await;
    let result = manager.record_time(third.id, TimeEntry::new(secs(45))).await;
    assert!(matches!(
        result,
        Err(PassadaError::ParticipantBlocked { competitor_id: 1 })
    ));

    // The rejected run is untouched and nobody went past the limit.
    let third = run(&store, &a, 3).await;
    assert_eq!(third.status, PassadaStatus::Pending);
    assert_eq!(third.time, None);
    let controls = store.participation(EVENT, CATEGORY, &[1, 2, 3]).await.unwrap();
    assert_eq!(controls.len(), 3);
    for control in controls {
        assert_eq!(control.total_executed, 2);
        assert!(control.total_executed <= control.max_allowed);
    }
}

#[tokio::test]
async fn test_rerun_after_sat_counts_once() {
    let store = setup(config(2, 5)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);
    let a = trio(&store, [1, 2, 3]).await;
    let first = run(&store, &a, 1).await;

    manager
        .record_time(first.id, TimeEntry::new(secs(50)))
        .await
        .unwrap();
    manager
        .apply_sat(first.id, "calf crossed back", None)
        .await
        .unwrap();
    manager.remove_sat(first.id).await.unwrap();
    let report = manager
        .record_time(first.id, TimeEntry::new(secs(47)))
        .await
        .unwrap();
    assert!(!report.change.counts_run);

    let controls = store.participation(EVENT, CATEGORY, &[1, 2, 3]).await.unwrap();
    assert!(controls.iter().all(|c| c.total_executed == 1));
}

#[tokio::test]
async fn test_run_creation_rules() {
    let store = setup(config(2, 9)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);
    let a = trio(&store, [1, 2, 3]).await;

    let duplicate = manager
        .create_passada(PassadaRequest {
            trio_id: a.id,
            run_number: 1,
            animal_number: None,
            time_limit: None,
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(PassadaError::DuplicateRunNumber { run_number: 1, .. })
    ));

    let over = manager
        .create_passada(PassadaRequest {
            trio_id: a.id,
            run_number: 3,
            animal_number: None,
            time_limit: None,
        })
        .await;
    assert!(matches!(
        over,
        Err(PassadaError::ExceedsMaxPassadas { run_number: 3, max: 2 })
    ));

    let missing = manager
        .create_passada(PassadaRequest {
            trio_id: 999,
            run_number: 1,
            animal_number: None,
            time_limit: None,
        })
        .await;
    assert!(matches!(missing, Err(PassadaError::TrioNotFound(999))));
}

#[tokio::test]
async fn test_batch_creation() {
    let store = setup(config(4, 9)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);

    // A trio stored without its default runs.
    let riders = store.find_competitors(&[1, 2, 3]).await.unwrap();
    let members: Vec<&Competitor> = riders.iter().collect();
    let new = NewTrio::from_members(EVENT, CATEGORY, &members, on()).unwrap();
    let bare = store.insert_trios(&[new], None).await.unwrap().remove(0);

    let created = manager
        .create_batch(BatchRequest {
            trio_id: bare.id,
            count: 3,
            auto_number: true,
            time_limit: Some(secs(45)),
            animals: vec![7, 8],
        })
        .await
        .unwrap();
    let numbers: Vec<u32> = created.iter().map(|p| p.run_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    let animals: Vec<Option<u32>> = created.iter().map(|p| p.animal_number).collect();
    assert_eq!(animals, vec![Some(7), Some(8), None]);
    assert!(created.iter().all(|p| p.time_limit == secs(45)));

    // Continuing past the per-trio maximum fails as a whole.
    let result = manager
        .create_batch(BatchRequest {
            trio_id: bare.id,
            count: 2,
            auto_number: true,
            time_limit: None,
            animals: Vec::new(),
        })
        .await;
    assert!(matches!(
        result,
        Err(PassadaError::ExceedsMaxPassadas { run_number: 5, max: 4 })
    ));
    assert_eq!(store.passadas_for_trio(bare.id).await.unwrap().len(), 3);

    let result = manager
        .create_batch(BatchRequest {
            trio_id: bare.id,
            count: 5,
            auto_number: false,
            time_limit: None,
            animals: Vec::new(),
        })
        .await;
    assert!(matches!(
        result,
        Err(PassadaError::BatchTooLarge { requested: 5, max: 4 })
    ));
}

#[tokio::test]
async fn test_batch_without_config_is_capped_by_kind() {
    let store = Arc::new(InMemoryStore::new());
    store
        .put_category(Category::preset(CATEGORY, "Aberta", CategoryKind::Aberta))
        .await;
    for id in 1..=3 {
        let born = NaiveDate::from_ymd_opt(1990, 5, 1).unwrap();
        let rider = Competitor::new(id, format!("Rider {id}"), born, 2, Sex::Male).unwrap();
        store.put_competitor(rider).await;
    }
    let manager = PassadaManager::with_seed(store.clone(), 1);
    let a = trio(&store, [1, 2, 3]).await;

    let result = manager
        .create_batch(BatchRequest {
            trio_id: a.id,
            count: u32::MAX,
            auto_number: true,
            time_limit: None,
            animals: Vec::new(),
        })
        .await;
    assert!(matches!(
        result,
        Err(PassadaError::BatchTooLarge { requested: u32::MAX, max: 10 })
    ));
    assert_eq!(store.passadas_for_trio(a.id).await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_batch_numbering_cannot_overflow() {
    let store = setup(config(u32::MAX, 9)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);

    let riders = store.find_competitors(&[1, 2, 3]).await.unwrap();
    let members: Vec<&Competitor> = riders.iter().collect();
    let new = NewTrio::from_members(EVENT, CATEGORY, &members, on()).unwrap();
    let bare = store.insert_trios(&[new], None).await.unwrap().remove(0);
    manager
        .create_passada(PassadaRequest {
            trio_id: bare.id,
            run_number: u32::MAX - 1,
            animal_number: None,
            time_limit: None,
        })
        .await
        .unwrap();

    let result = manager
        .create_batch(BatchRequest {
            trio_id: bare.id,
            count: 2,
            auto_number: true,
            time_limit: None,
            animals: Vec::new(),
        })
        .await;
    assert!(matches!(
        result,
        Err(PassadaError::BatchTooLarge { requested: 2, max: 1 })
    ));

    let last = manager
        .create_batch(BatchRequest {
            trio_id: bare.id,
            count: 1,
            auto_number: true,
            time_limit: None,
            animals: Vec::new(),
        })
        .await
        .unwrap();
    assert_eq!(last[0].run_number, u32::MAX);
}

#[tokio::test]
async fn test_animals() {
    let mut cfg = config(2, 9);
    cfg.animal_pool = vec![4, 5, 6];
    cfg.allow_repeat_animal = false;
    let store = setup(cfg).await;
    let manager = PassadaManager::with_seed(store.clone(), 42);
    let a = trio(&store, [1, 2, 3]).await;
    let b = trio(&store, [4, 5, 6]).await;

    let first = run(&store, &a, 1).await;
    let entry = TimeEntry {
        time: secs(50),
        animal_number: Some(4),
        notes: None,
    };
    manager.record_time(first.id, entry).await.unwrap();

    for _ in 0..20 {
        let picked = manager.assign_animal(a.id).await.unwrap();
        assert!(picked == 5 || picked == 6, "picked {picked}");
    }

    let check = manager.validate_run(b.id, 1, Some(4)).await.unwrap();
    assert!(!check.animal_available);
    assert!(!check.valid);

    let check = manager.validate_run(b.id, 3, Some(9)).await.unwrap();
    assert!(!check.restrictions.is_empty());
}

#[tokio::test]
async fn test_empty_animal_pool() {
    let store = setup(config(1, 5)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);
    let a = trio(&store, [1, 2, 3]).await;

    let result = manager.assign_animal(a.id).await;
    assert!(matches!(result, Err(PassadaError::EmptyAnimalPool { .. })));
}

#[tokio::test]
async fn test_inactive_trio_cannot_run() {
    let store = setup(config(2, 5)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);
    let a = trio(&store, [1, 2, 3]).await;
    store
        .set_trio_status(a.id, TrioStatus::Disqualified)
        .await
        .unwrap();

    let check = manager.validate_run(a.id, 2, None).await.unwrap();
    assert!(!check.trio_can_compete);
    assert!(!check.valid);
}

#[tokio::test]
async fn test_config_is_unique() {
    let store = setup(config(1, 5)).await;
    let manager = PassadaManager::with_seed(store, 1);

    let result = manager.create_config(config(2, 6)).await;
    assert!(matches!(result, Err(PassadaError::DuplicateConfig { .. })));
    let stored = manager.config(EVENT, CATEGORY).await.unwrap().unwrap();
    assert_eq!(stored.max_passadas_per_trio, 1);
}

#[tokio::test]
async fn test_recalculate_is_stable() {
    let store = setup(config(1, 5)).await;
    let manager = PassadaManager::with_seed(store.clone(), 1);
    let a = trio(&store, [1, 2, 3]).await;
    let b = trio(&store, [4, 5, 6]).await;
    let c = trio(&store, [7, 8, 9]).await;

    for (t, time) in [(&a, 52), (&b, 47), (&c, 58)] {
        let r = run(&store, t, 1).await;
        manager
            .record_time(r.id, TimeEntry::new(secs(time)))
            .await
            .unwrap();
    }

    assert_eq!(manager.recalculate_placements(EVENT, None).await.unwrap(), 0);
    let mut placements = Vec::new();
    for t in [&a, &b, &c] {
        placements.push(run(&store, t, 1).await.placement);
    }
    assert_eq!(placements, vec![Some(2), Some(1), Some(3)]);
}
