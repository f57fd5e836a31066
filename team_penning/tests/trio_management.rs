//! Integration tests for manual trio formation, deletion and renumbering.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use team_penning::db::{InMemoryStore, PassadaRepository};
use team_penning::passada::{PassadaManager, TimeEntry};
use team_penning::roster::{Category, CategoryKind, Competitor, Sex};
use team_penning::trio::{TrioError, TrioManager};

const EVENT: i64 = 7;

fn on() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
}

fn rider(id: i64, age: i32, handicap: u8, sex: Sex) -> Competitor {
    let born = NaiveDate::from_ymd_opt(2024 - age, 1, 15).unwrap();
    Competitor::new(id, format!("Rider {id}"), born, handicap, sex).unwrap()
}

async fn store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store
        .put_category(Category::preset(1, "Aberta", CategoryKind::Aberta))
        .await;
    store
        .put_category(Category::preset(2, "Handicap", CategoryKind::Handicap))
        .await;
    store
        .put_category(Category::preset(3, "Kids", CategoryKind::Kids))
        .await;
    store
        .put_category(Category::preset(4, "Mirim", CategoryKind::Mirim))
        .await;

    for (id, age, handicap) in [
        (1, 30, 5),
        (2, 30, 4),
        (3, 30, 3),
        (4, 30, 1),
        (5, 30, 1),
        (6, 30, 1),
        (7, 15, 1),
        (8, 16, 1),
        (9, 20, 1),
    ] {
        store.put_competitor(rider(id, age, handicap, Sex::Male)).await;
    }
    store
}

#[tokio::test]
async fn test_manual_trio_keeps_choice_order() {
    let store = store().await;
    let manager = TrioManager::new(store.clone());

    let trio = manager.create_trio(EVENT, 1, &[3, 1, 2], on()).await.unwrap();
    assert_eq!(trio.number, 1);
    assert!(trio.manual);
    assert_eq!(trio.member_ids(), [3, 1, 2]);
    let orders: Vec<u8> = trio.members.iter().map(|m| m.choice_order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
    assert_eq!(trio.handicap_total, 12);
    assert_eq!(trio.age_total, 90);

    // Aberta without a configuration gets its default runs.
    let runs = store.passadas_for_trio(trio.id).await.unwrap();
    assert_eq!(runs.len(), 10);
    assert!(runs.iter().all(|r| r.time_limit == Decimal::from(50)));

    let second = manager.create_trio(EVENT, 1, &[4, 5, 6], on()).await.unwrap();
    assert_eq!(second.number, 2);
}

#[tokio::test]
async fn test_size_and_duplicates_are_rejected() {
    let store = store().await;
    let manager = TrioManager::new(store);

    let result = manager.create_trio(EVENT, 1, &[1, 2], on()).await;
    assert!(matches!(result, Err(TrioError::InvalidSize(2))));

    let result = manager.create_trio(EVENT, 1, &[1, 2, 2], on()).await;
    assert!(matches!(result, Err(TrioError::DuplicateMember(2))));

    let result = manager.create_trio(EVENT, 1, &[1, 2, 99], on()).await;
    assert!(matches!(result, Err(TrioError::CompetitorNotFound(99))));

    let result = manager.create_trio(EVENT, 42, &[1, 2, 3], on()).await;
    assert!(matches!(result, Err(TrioError::CategoryNotFound(42))));
}

#[tokio::test]
async fn test_ineligible_trio_lists_every_reason() {
    let store = store().await;
    let manager = TrioManager::new(store);

    // Handicaps 5 + 4 + 3 exceed the cap of 11.
    let result = manager.create_trio(EVENT, 2, &[1, 2, 3], on()).await;
    match result {
        Err(TrioError::Ineligible(reasons)) => {
            assert_eq!(reasons.len(), 1);
            assert!(reasons[0].contains("12"), "{reasons:?}");
        }
        other => panic!("expected ineligible trio, got {other:?}"),
    }

    // Kids: rider 9 is 20, the others are within 13..=17.
    let result = manager.create_trio(EVENT, 3, &[7, 8, 9], on()).await;
    match result {
        Err(TrioError::Ineligible(reasons)) => assert_eq!(reasons.len(), 1),
        other => panic!("expected ineligible trio, got {other:?}"),
    }

    // Mirim: 15 + 16 + 20 is over 36.
    let result = manager.create_trio(EVENT, 4, &[7, 8, 9], on()).await;
    assert!(matches!(result, Err(TrioError::Ineligible(_))));
}

#[tokio::test]
async fn test_explicit_number_conflict() {
    let store = store().await;
    let manager = TrioManager::new(store);

    manager
        .create_numbered_trio(EVENT, 1, &[1, 2, 3], 5, on())
        .await
        .unwrap();
    let result = manager
        .create_numbered_trio(EVENT, 1, &[4, 5, 6], 5, on())
        .await;
    assert!(matches!(result, Err(TrioError::DuplicateNumber(5))));

    // The next automatic number follows the highest one.
    let next = manager.create_trio(EVENT, 1, &[4, 5, 6], on()).await.unwrap();
    assert_eq!(next.number, 6);
}

#[tokio::test]
async fn test_delete_only_without_results() {
    let store = store().await;
    let trios = TrioManager::new(store.clone());
    let runs = PassadaManager::with_seed(store.clone(), 1);

    let fresh = trios.create_trio(EVENT, 1, &[1, 2, 3], on()).await.unwrap();
    let ran = trios.create_trio(EVENT, 1, &[4, 5, 6], on()).await.unwrap();

    let first = store.passadas_for_trio(ran.id).await.unwrap().remove(0);
    runs.record_time(first.id, TimeEntry::new(Decimal::from(42)))
        .await
        .unwrap();

    let result = trios.delete_trio(ran.id).await;
    assert!(matches!(result, Err(TrioError::HasResults(id)) if id == ran.id));

    trios.delete_trio(fresh.id).await.unwrap();
    assert!(store.passadas_for_trio(fresh.id).await.unwrap().is_empty());
    assert!(matches!(
        trios.trio(fresh.id).await,
        Err(TrioError::TrioNotFound(_))
    ));
    assert!(matches!(
        trios.delete_trio(fresh.id).await,
        Err(TrioError::TrioNotFound(_))
    ));
}

#[tokio::test]
async fn test_renumber_closes_gaps() {
    let store = store().await;
    let manager = TrioManager::new(store);

    let a = manager
        .create_numbered_trio(EVENT, 1, &[1, 2, 3], 3, on())
        .await
        .unwrap();
    let b = manager
        .create_numbered_trio(EVENT, 1, &[4, 5, 6], 8, on())
        .await
        .unwrap();
    let c = manager
        .create_numbered_trio(EVENT, 1, &[7, 8, 9], 1, on())
        .await
        .unwrap();

    let renumbering = manager.renumber(EVENT, 1).await.unwrap();
    assert_eq!(renumbering.changes, vec![(a.id, 3, 2), (b.id, 8, 3)]);

    let numbers: Vec<(i64, u32)> = manager
        .trios(EVENT, Some(1))
        .await
        .unwrap()
        .iter()
        .map(|t| (t.id, t.number))
        .collect();
    assert_eq!(numbers, vec![(c.id, 1), (a.id, 2), (b.id, 3)]);
}
