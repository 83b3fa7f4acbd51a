//! Integration tests for `SqliteDatastore` against an in-memory database.

use std::collections::HashSet;

use attrix_core::{
  dao::{Datastore, MatchCriteria},
  deletion::MatchBehavior,
  registration::AsyncRegistration,
  report::{
    AggregateReport, AggregateReportStatus, EventReport, EventReportStatus,
    HistogramContribution,
  },
  rollback::{DeletionReason, RollbackWorker},
  source::{Source, SourceStatus},
  trigger::{Trigger, TriggerStatus},
  DatastoreError,
};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::{SqliteDatastore, SqliteRollbackWorker};

const REGISTRANT: &str = "android-app://com.example.app";

async fn store() -> SqliteDatastore {
  SqliteDatastore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(secs: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn source(publisher: &str, event_time: DateTime<Utc>) -> Source {
  Source {
    id: Uuid::new_v4(),
    registrant: REGISTRANT.into(),
    publisher: publisher.into(),
    event_time,
    status: SourceStatus::Active,
    aggregate_contributions: 0,
    event_report_dedup_keys: vec![],
    aggregate_report_dedup_keys: vec![],
    attribution_status: None,
    trigger_specs: None,
  }
}

fn trigger(destination: &str, trigger_time: DateTime<Utc>) -> Trigger {
  Trigger {
    id: Uuid::new_v4(),
    registrant: REGISTRANT.into(),
    attribution_destination: destination.into(),
    trigger_time,
    status: TriggerStatus::Attributed,
  }
}

fn event_report(source_id: Option<Uuid>, trigger_id: Uuid) -> EventReport {
  EventReport {
    id: Uuid::new_v4(),
    source_id,
    trigger_id,
    trigger_dedup_key: None,
    report_time: at(0),
    status: EventReportStatus::Pending,
  }
}

fn aggregate_report(source_id: Option<Uuid>, trigger_id: Uuid) -> AggregateReport {
  AggregateReport {
    id: Uuid::new_v4(),
    source_id,
    trigger_id,
    contributions: vec![HistogramContribution { key: "1369".into(), value: 32 }],
    dedup_key: None,
    scheduled_report_time: at(0),
    status: AggregateReportStatus::Pending,
  }
}

fn criteria(
  origins: &[&str],
  domains: &[&str],
  behavior: MatchBehavior,
) -> MatchCriteria {
  MatchCriteria {
    registrant:     REGISTRANT.into(),
    start:          at(-1_000),
    end:            at(1_000),
    origin_uris:    origins.iter().map(|s| s.to_string()).collect(),
    domain_uris:    domains.iter().map(|s| s.to_string()).collect(),
    match_behavior: behavior,
  }
}

// ─── Site matching ───────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_with_empty_filters_matches_nothing() {
  let s = store().await;
  let src = source("https://ads.example.com", at(0));
  let c = criteria(&[], &[], MatchBehavior::Delete);

  let matched = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&src)?;
      dao.fetch_matching_sources(&c)
    })
    .await
    .unwrap();
  assert!(matched.is_empty());
}

#[tokio::test]
async fn preserve_with_empty_filters_matches_everything() {
  let s = store().await;
  let src = source("https://ads.example.com", at(0));
  let id = src.id;
  let c = criteria(&[], &[], MatchBehavior::Preserve);

  let matched = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&src)?;
      dao.fetch_matching_sources(&c)
    })
    .await
    .unwrap();
  assert_eq!(matched, vec![id]);
}

#[tokio::test]
async fn origin_filter_matches_exactly() {
  let s = store().await;
  let hit = source("https://ads.example.com", at(0));
  let miss = source("https://sub.ads.example.com", at(0));
  let hit_id = hit.id;
  let c = criteria(&["https://ads.example.com"], &[], MatchBehavior::Delete);

  let matched = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&hit)?;
      dao.insert_source(&miss)?;
      dao.fetch_matching_sources(&c)
    })
    .await
    .unwrap();
  assert_eq!(matched, vec![hit_id]);
}

#[tokio::test]
async fn domain_filter_matches_subdomains_and_exact() {
  let s = store().await;
  let exact = source("https://example.com", at(0));
  let sub = source("https://ads.example.com", at(0));
  let other = source("https://example.org", at(0));
  let expected: HashSet<Uuid> = [exact.id, sub.id].into();
  let c = criteria(&[], &["https://example.com"], MatchBehavior::Delete);

  let matched = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&exact)?;
      dao.insert_source(&sub)?;
      dao.insert_source(&other)?;
      dao.fetch_matching_sources(&c)
    })
    .await
    .unwrap();
  assert_eq!(matched.into_iter().collect::<HashSet<_>>(), expected);
}

#[tokio::test]
async fn preserve_selects_the_complement() {
  let s = store().await;
  let kept = source("https://example.com", at(0));
  let swept = source("https://example.org", at(0));
  let swept_id = swept.id;
  let c = criteria(&[], &["https://example.com"], MatchBehavior::Preserve);

  let matched = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&kept)?;
      dao.insert_source(&swept)?;
      dao.fetch_matching_sources(&c)
    })
    .await
    .unwrap();
  assert_eq!(matched, vec![swept_id]);
}

#[tokio::test]
async fn time_range_is_inclusive() {
  let s = store().await;
  let before = source("https://example.com", at(-2_000));
  let on_start = source("https://example.com", at(-1_000));
  let on_end = source("https://example.com", at(1_000));
  let after = source("https://example.com", at(2_000));
  let expected: HashSet<Uuid> = [on_start.id, on_end.id].into();
  let c = criteria(&[], &[], MatchBehavior::Preserve);

  let matched = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&before)?;
      dao.insert_source(&on_start)?;
      dao.insert_source(&on_end)?;
      dao.insert_source(&after)?;
      dao.fetch_matching_sources(&c)
    })
    .await
    .unwrap();
  assert_eq!(matched.into_iter().collect::<HashSet<_>>(), expected);
}

#[tokio::test]
async fn other_registrants_are_never_matched() {
  let s = store().await;
  let mut foreign = source("https://example.com", at(0));
  foreign.registrant = "android-app://com.other.app".into();
  let c = criteria(&[], &[], MatchBehavior::Preserve);

  let matched = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&foreign)?;
      dao.fetch_matching_sources(&c)
    })
    .await
    .unwrap();
  assert!(matched.is_empty());
}

#[tokio::test]
async fn triggers_and_registrations_match_on_their_own_site_columns() {
  let s = store().await;
  let trg = trigger("https://shop.example.com", at(0));
  let trg_id = trg.id;
  let reg = AsyncRegistration {
    id:           Uuid::new_v4(),
    registrant:   REGISTRANT.into(),
    top_origin:   "https://shop.example.com".into(),
    request_time: at(0),
  };
  let reg_id = reg.id;
  let c =
    criteria(&["https://shop.example.com"], &[], MatchBehavior::Delete);
  let c2 = c.clone();

  let (triggers, registrations) = s
    .run_in_transaction(move |dao| {
      dao.insert_trigger(&trg)?;
      dao.insert_async_registration(&reg)?;
      Ok((
        dao.fetch_matching_triggers(&c)?,
        dao.fetch_matching_async_registrations(&c2)?,
      ))
    })
    .await
    .unwrap();
  assert_eq!(triggers, HashSet::from([trg_id]));
  assert_eq!(registrations, vec![reg_id]);
}

// ─── Reports ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reports_are_fetched_by_source_or_trigger() {
  let s = store().await;
  let src = source("https://example.com", at(0));
  let trg_a = trigger("https://shop.example.com", at(0));
  let trg_b = trigger("https://other.example.com", at(0));

  let by_source = event_report(Some(src.id), trg_b.id);
  let by_trigger = event_report(None, trg_a.id);
  let unrelated = event_report(None, trg_b.id);
  let expected: HashSet<Uuid> = [by_source.id, by_trigger.id].into();

  let source_ids: HashSet<Uuid> = [src.id].into();
  let trigger_ids: HashSet<Uuid> = [trg_a.id].into();

  let reports = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&src)?;
      dao.insert_trigger(&trg_a)?;
      dao.insert_trigger(&trg_b)?;
      dao.insert_event_report(&by_source)?;
      dao.insert_event_report(&by_trigger)?;
      dao.insert_event_report(&unrelated)?;
      dao.fetch_matching_event_reports(&source_ids, &trigger_ids)
    })
    .await
    .unwrap();
  assert_eq!(
    reports.iter().map(|r| r.id).collect::<HashSet<_>>(),
    expected
  );
}

#[tokio::test]
async fn aggregate_report_roundtrip_keeps_contributions_and_dedup_key() {
  let s = store().await;
  let src = source("https://example.com", at(0));
  let trg = trigger("https://shop.example.com", at(0));
  let mut report = aggregate_report(Some(src.id), trg.id);
  report.contributions = vec![
    HistogramContribution { key: "1369".into(), value: 45 },
    HistogramContribution { key: "2693".into(), value: 87 },
  ];
  report.dedup_key = Some(u64::MAX);
  let expected = report.clone();
  let id = report.id;

  let fetched = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&src)?;
      dao.insert_trigger(&trg)?;
      dao.insert_aggregate_report(&report)?;
      dao.get_aggregate_report(id)
    })
    .await
    .unwrap();
  assert_eq!(fetched.contributions, expected.contributions);
  assert_eq!(fetched.dedup_key, Some(u64::MAX));
  assert_eq!(fetched.contribution_sum(), 132);
}

#[tokio::test]
async fn deleting_a_source_cascades_to_its_reports() {
  let s = store().await;
  let src = source("https://example.com", at(0));
  let trg = trigger("https://shop.example.com", at(0));
  let report = event_report(Some(src.id), trg.id);
  let report_id = report.id;
  let src_id = src.id;

  let err = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&src)?;
      dao.insert_trigger(&trg)?;
      dao.insert_event_report(&report)?;
      dao.delete_sources(&[src_id])?;
      dao.get_event_report(report_id)
    })
    .await
    .unwrap_err();
  assert!(matches!(err, DatastoreError::RowNotFound("event_reports", _)));
}

#[tokio::test]
async fn deleting_a_trigger_cascades_to_its_reports() {
  let s = store().await;
  let trg = trigger("https://shop.example.com", at(0));
  let report = aggregate_report(None, trg.id);
  let report_id = report.id;
  let trigger_ids: HashSet<Uuid> = [trg.id].into();

  let err = s
    .run_in_transaction(move |dao| {
      dao.insert_trigger(&trg)?;
      dao.insert_aggregate_report(&report)?;
      dao.delete_triggers(&trigger_ids)?;
      dao.get_aggregate_report(report_id)
    })
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    DatastoreError::RowNotFound("aggregate_reports", _)
  ));
}

#[tokio::test]
async fn deleting_absent_ids_is_tolerated() {
  let s = store().await;
  let src = source("https://example.com", at(0));
  let trg = trigger("https://shop.example.com", at(0));
  let src_id = src.id;
  let trigger_ids: HashSet<Uuid> = [trg.id, Uuid::new_v4()].into();

  // Each id list mixes a live row with one that was never inserted.
  s.run_in_transaction(move |dao| {
    dao.insert_source(&src)?;
    dao.insert_trigger(&trg)?;
    dao.delete_sources(&[src_id, Uuid::new_v4()])?;
    dao.delete_triggers(&trigger_ids)?;
    dao.delete_async_registrations(&[Uuid::new_v4()])
  })
  .await
  .unwrap();

  let err = s
    .run_in_transaction(move |dao| dao.get_source(src_id))
    .await
    .unwrap_err();
  assert!(matches!(err, DatastoreError::SourceNotFound(_)));
}

// ─── Flex sources ────────────────────────────────────────────────────────────

#[tokio::test]
async fn flex_lookup_finds_sources_referencing_a_trigger() {
  let s = store().await;
  let trg = trigger("https://shop.example.com", at(0));

  let mut flex = source("https://example.com", at(0));
  flex.trigger_specs = Some("[{\"trigger_data\":[1,2]}]".into());
  flex.attribution_status =
    Some(format!("[{{\"trigger_id\":\"{}\"}}]", trg.id.hyphenated()));

  // Same attribution but no trigger specs: not a flex source.
  let mut plain = source("https://example.com", at(0));
  plain.attribution_status = flex.attribution_status.clone();

  let flex_id = flex.id;
  let trigger_ids: HashSet<Uuid> = [trg.id].into();

  let found = s
    .run_in_transaction(move |dao| {
      dao.insert_trigger(&trg)?;
      dao.insert_source(&flex)?;
      dao.insert_source(&plain)?;
      dao.fetch_flex_source_ids_for(&trigger_ids)
    })
    .await
    .unwrap();
  assert_eq!(found, HashSet::from([flex_id]));
}

// ─── Mutations ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn source_updates_roundtrip() {
  let s = store().await;
  let mut src = source("https://example.com", at(0));
  src.aggregate_contributions = 32666;
  src.event_report_dedup_keys = vec![1, 2, u64::MAX];
  let id = src.id;

  let fetched = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&src)?;
      src.aggregate_contributions = 32534;
      src.event_report_dedup_keys.remove(0);
      dao.update_source_aggregate_contributions(&src)?;
      dao.update_source_event_report_dedup_keys(&src)?;
      dao.update_source_attributed_triggers(src.id, "[]")?;
      dao.get_source(id)
    })
    .await
    .unwrap();
  assert_eq!(fetched.aggregate_contributions, 32534);
  assert_eq!(fetched.event_report_dedup_keys, vec![2, u64::MAX]);
  assert_eq!(fetched.attribution_status.as_deref(), Some("[]"));
}

#[tokio::test]
async fn updating_a_missing_source_errors() {
  let s = store().await;
  let src = source("https://example.com", at(0));
  let id = src.id;

  let err = s
    .run_in_transaction(move |dao| {
      dao.update_source_aggregate_contributions(&src)
    })
    .await
    .unwrap_err();
  assert!(matches!(err, DatastoreError::SourceNotFound(found) if found == id));
}

#[tokio::test]
async fn status_updates_check_affected_rows() {
  let s = store().await;
  let src = source("https://example.com", at(0));
  let ids = vec![src.id, Uuid::new_v4()];

  let err = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&src)?;
      dao.update_source_status(&ids, SourceStatus::MarkedToDelete)
    })
    .await
    .unwrap_err();
  assert!(matches!(err, DatastoreError::UpdateFailed("sources")));
}

#[tokio::test]
async fn failed_transaction_rolls_back() {
  let s = store().await;
  let src = source("https://example.com", at(0));
  let id = src.id;

  let err = s
    .run_in_transaction(move |dao| {
      dao.insert_source(&src)?;
      // Force an abort after the insert.
      dao.get_source(Uuid::new_v4()).map(|_| ())
    })
    .await
    .unwrap_err();
  assert!(matches!(err, DatastoreError::SourceNotFound(_)));

  let err = s
    .run_in_transaction(move |dao| dao.get_source(id))
    .await
    .unwrap_err();
  assert!(matches!(err, DatastoreError::SourceNotFound(found) if found == id));
}

// ─── Rollback worker ─────────────────────────────────────────────────────────

#[tokio::test]
async fn rollback_record_roundtrip() {
  let w = SqliteRollbackWorker::open_in_memory().await.unwrap();
  let reason = DeletionReason::MeasurementDeletion;

  assert!(w.stored_record(reason).await.unwrap().is_none());

  w.record_deletion(reason, 331_412_000).await.unwrap();
  let record = w.stored_record(reason).await.unwrap().unwrap();
  assert_eq!(record.module_version, 331_412_000);

  w.clear_record(reason, record.row_id).await.unwrap();
  assert!(w.stored_record(reason).await.unwrap().is_none());
}

#[tokio::test]
async fn recording_again_replaces_the_stored_record() {
  let w = SqliteRollbackWorker::open_in_memory().await.unwrap();
  let reason = DeletionReason::MeasurementDeletion;

  w.record_deletion(reason, 1).await.unwrap();
  let first = w.stored_record(reason).await.unwrap().unwrap();

  w.record_deletion(reason, 2).await.unwrap();
  let second = w.stored_record(reason).await.unwrap().unwrap();
  assert_eq!(second.module_version, 2);
  assert_ne!(second.row_id, first.row_id);

  // Clearing with the stale row id is a no-op.
  w.clear_record(reason, first.row_id).await.unwrap();
  assert!(w.stored_record(reason).await.unwrap().is_some());
}
