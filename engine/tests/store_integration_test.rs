//! Integration tests for the durable collections
//!
//! Id assignment across process restarts (simulated by reopening), file
//! integrity, and concurrent writers.

use crewline_engine::store::{
    CalendarEntry, Collection, EntryStatus, Lead, LeadStatus, Store, CALENDAR_FILE, LEADS_FILE,
};
use proptest::prelude::*;
use sdk::EngineError;
use serde_json::{json, Value};
use std::sync::Arc;

fn lead(n: usize) -> Lead {
    Lead::new(format!("Lead {}", n), format!("lead{}@example.com", n), "test")
}

#[tokio::test]
async fn test_ids_continue_after_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = Store::open(dir.path()).await.unwrap();
        store.leads.add(lead(1)).await.unwrap();
        store.leads.add(lead(2)).await.unwrap();
    }

    let store = Store::open(dir.path()).await.unwrap();
    assert_eq!(store.leads.len().await, 2);
    let third = store.leads.add(lead(3)).await.unwrap();
    assert_eq!(third.id, 3);
}

#[tokio::test]
async fn test_update_keeps_id_and_created_at() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    let original = store.leads.add(lead(1)).await.unwrap();

    let mut fields = original.fields.clone();
    fields.status = LeadStatus::Interested;
    let updated = store.leads.update(original.id, fields).await.unwrap();

    assert_eq!(updated.id, original.id);
    assert_eq!(updated.created_at, original.created_at);
    assert_eq!(updated.fields.status, LeadStatus::Interested);

    let reopened = Store::open(dir.path()).await.unwrap();
    let stored = reopened.leads.get(original.id).await.unwrap();
    assert_eq!(stored, updated);
}

#[tokio::test]
async fn test_patch_merges_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    let entry = store
        .calendar
        .add(CalendarEntry::draft("instagram", "luna llena", "Ven al temazcal"))
        .await
        .unwrap();

    let patched = store
        .calendar
        .patch(entry.id, &json!({ "status": "published", "id": 99 }))
        .await
        .unwrap();
    assert_eq!(patched.id, entry.id);
    assert_eq!(patched.fields.status, EntryStatus::Published);
    assert_eq!(patched.fields.content, "Ven al temazcal");
}

#[tokio::test]
async fn test_patch_rejects_invalid_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    let record = store.leads.add(lead(1)).await.unwrap();

    let err = store
        .leads
        .patch(record.id, &json!({ "status": "maybe" }))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SchemaViolation { .. }));
    assert_eq!(store.leads.get(record.id).await.unwrap(), record);
}

#[tokio::test]
async fn test_missing_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();

    let err = store.calendar.patch(4, &json!({})).await.unwrap_err();
    assert!(matches!(err, EngineError::RecordNotFound { id: 4, .. }));
}

#[tokio::test]
async fn test_corrupt_file_is_refused_and_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(LEADS_FILE);
    std::fs::write(&path, "[{\"id\": 1, \"name\": ").unwrap();

    let result = Store::open(dir.path()).await;
    assert!(matches!(result, Err(EngineError::Serialization(_))));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "[{\"id\": 1, \"name\": "
    );
}

#[tokio::test]
async fn test_no_temp_files_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    store
        .calendar
        .add(CalendarEntry::draft("facebook", "retiro", "texto"))
        .await
        .unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![CALENDAR_FILE.to_string()]);
}

#[tokio::test]
async fn test_view_filters_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    for n in 1..=4 {
        let mut l = lead(n);
        if n % 2 == 0 {
            l.status = LeadStatus::Interested;
        }
        store.leads.add(l).await.unwrap();
    }

    let interested = store
        .leads
        .view(|r| r.fields.status == LeadStatus::Interested)
        .await;
    let ids: Vec<u64> = interested.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_get_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let leads = Arc::new(
        Collection::<Lead>::open("leads", dir.path().join(LEADS_FILE))
            .await
            .unwrap(),
    );

    let handles: Vec<_> = (0..16)
        .map(|n| {
            let leads = Arc::clone(&leads);
            tokio::spawn(async move { leads.add(lead(n)).await.unwrap().id })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort_unstable();
    assert_eq!(ids, (1..=16).collect::<Vec<u64>>());

    let raw: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(LEADS_FILE)).unwrap())
            .unwrap();
    assert_eq!(raw.as_array().unwrap().len(), 16);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_ids_are_sequential_across_reopen(before in 0usize..6, after in 1usize..6) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();

            {
                let store = Store::open(dir.path()).await.unwrap();
                for n in 0..before {
                    store.leads.add(lead(n)).await.unwrap();
                }
            }

            let store = Store::open(dir.path()).await.unwrap();
            for n in 0..after {
                store.leads.add(lead(before + n)).await.unwrap();
            }

            let ids: Vec<u64> = store.leads.all().await.iter().map(|r| r.id).collect();
            let expected: Vec<u64> = (1..=(before + after) as u64).collect();
            prop_assert_eq!(ids, expected);
            Ok(())
        })?;
    }
}
