use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use pal_pan::calendar::store::{NOTES_STORAGE_KEY, REMINDER_CHANNEL_ID};
use pal_pan::calendar::{NoteStore, NoteStoreError, ReminderOutcome, UpsertOutcome};
use pal_pan::models::*;
use pal_pan::ports::memory::{ManualClock, MemoryKeyValueStore, MemoryNotifier};
use pal_pan::retry::RetryPolicy;
use serde_json::json;
use speculate2::speculate;
use tokio_test::{assert_err, assert_ok};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

fn key(s: &str) -> DateKey {
    s.parse().expect("valid date key")
}

fn saved(outcome: UpsertOutcome) -> (NoteRecord, bool, bool, ReminderOutcome) {
    match outcome {
        UpsertOutcome::Saved {
            record,
            created,
            notification_changed,
            reminder,
        } => (record, created, notification_changed, reminder),
        other => panic!("expected a saved outcome, got {:?}", other),
    }
}

fn persisted(storage: &MemoryKeyValueStore) -> serde_json::Value {
    let raw = storage.raw(NOTES_STORAGE_KEY).expect("notes were persisted");
    serde_json::from_str(&raw).expect("persisted notes are JSON")
}

speculate! {
    before {
        let clock = ManualClock::new(at(2025, 6, 1, 9, 0));
        let storage = MemoryKeyValueStore::new();
        let notifier = MemoryNotifier::new(Arc::new(clock.clone()));
        let retry = RetryPolicy { attempts: 2, backoff: Duration::ZERO };
        let mut store = NoteStore::new(storage.clone(), notifier.clone()).with_retry(retry);
    }

    describe "upsert" {
        it "saves a note and schedules its 07:00 reminder" {
            let outcome = assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));
            let (record, created, notification_changed, reminder) = saved(outcome);

            assert_eq!(record.note, "Buy milk");
            assert!(record.has_notification);
            assert!(created);
            assert!(notification_changed);
            assert_eq!(reminder, ReminderOutcome::Scheduled {
                trigger_id: "calendar-2025-6-15".to_string(),
                fire_at: at(2025, 6, 15, 7, 0),
            });

            let requests = notifier.schedule_requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].id, "calendar-2025-6-15");
            assert_eq!(requests[0].channel_id, REMINDER_CHANNEL_ID);
            assert_eq!(requests[0].fire_at, at(2025, 6, 15, 7, 0));
            assert_eq!(requests[0].body, "Buy milk");

            assert_eq!(persisted(&storage), json!({
                "2025-6-15": { "note": "Buy milk", "hasNotification": true }
            }));
        }

        it "stores trimmed text" {
            assert_ok!(store.upsert(key("2025-6-15"), "  Buy milk \n", false));

            let record = store.get(&key("2025-6-15")).expect("note exists");
            assert_eq!(record.note, "Buy milk");
            assert!(!record.has_notification);
            assert!(notifier.calls().is_empty());
        }

        it "saves without a reminder when 07:00 has passed" {
            clock.set(at(2025, 6, 15, 8, 0));

            let outcome = assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));
            assert!(outcome.warning().is_some());
            let (record, _, notification_changed, reminder) = saved(outcome);

            assert!(!record.has_notification);
            assert!(!notification_changed);
            assert_eq!(reminder, ReminderOutcome::RejectedPast { fire_at: at(2025, 6, 15, 7, 0) });
            assert!(notifier.active_triggers().is_empty());
            assert_eq!(persisted(&storage)["2025-6-15"]["hasNotification"], json!(false));
        }

        it "still schedules a same-day reminder before 07:00" {
            clock.set(at(2025, 6, 15, 6, 30));

            let outcome = assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));
            assert!(outcome.warning().is_none());
            assert!(notifier.trigger("calendar-2025-6-15").is_some());
        }

        it "cancels the reminder when it is turned off" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));
            let outcome = assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", false));
            let (record, created, notification_changed, reminder) = saved(outcome);

            assert!(!record.has_notification);
            assert!(!created);
            assert!(notification_changed);
            assert_eq!(reminder, ReminderOutcome::Cancelled {
                trigger_id: "calendar-2025-6-15".to_string(),
            });
            assert_eq!(notifier.cancellations(), vec!["calendar-2025-6-15".to_string()]);
            assert!(notifier.active_triggers().is_empty());
        }

        it "issues no cancellation when no reminder existed" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", false));
            assert_ok!(store.upsert(key("2025-6-15"), "Buy bread", false));

            assert!(notifier.cancellations().is_empty());
            assert_eq!(store.get(&key("2025-6-15")).unwrap().note, "Buy bread");
        }

        it "replaces the reminder when the text changes" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));
            let outcome = assert_ok!(store.upsert(key("2025-6-15"), "Buy oat milk", true));
            let (_, created, notification_changed, _) = saved(outcome);

            assert!(!created);
            assert!(!notification_changed);
            let active = notifier.active_triggers();
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].body, "Buy oat milk");
        }
    }

    describe "blank text" {
        it "removes the note and cancels its reminder" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));

            let outcome = assert_ok!(store.upsert(key("2025-6-15"), "   ", false));

            match outcome {
                UpsertOutcome::Deleted { removed, reminder_cancelled } => {
                    assert_eq!(removed.map(|r| r.note), Some("Buy milk".to_string()));
                    assert!(reminder_cancelled);
                }
                other => panic!("expected a deleted outcome, got {:?}", other),
            }
            assert!(store.get(&key("2025-6-15")).is_none());
            assert_eq!(notifier.cancellations(), vec!["calendar-2025-6-15".to_string()]);
            assert_eq!(persisted(&storage), json!({}));
        }

        it "is a no-op on an empty day" {
            let outcome = assert_ok!(store.upsert(key("2025-6-15"), "", true));

            assert_eq!(outcome, UpsertOutcome::Deleted { removed: None, reminder_cancelled: false });
            assert_eq!(storage.writes(), 0);
            assert!(notifier.calls().is_empty());
        }
    }

    describe "delete" {
        it "is idempotent" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));

            let first = assert_ok!(store.delete(&key("2025-6-15")));
            let second = assert_ok!(store.delete(&key("2025-6-15")));

            assert!(first.is_some());
            assert!(second.is_none());
            assert!(store.is_empty());
            assert_eq!(notifier.cancellations().len(), 1);
        }

        it "does not cancel when the note had no reminder" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", false));
            assert_ok!(store.delete(&key("2025-6-15")));

            assert!(notifier.cancellations().is_empty());
        }
    }

    describe "failures" {
        it "leaves the store unchanged when saving fails" {
            storage.fail_next_writes(2);

            let err = assert_err!(store.upsert(key("2025-6-15"), "Buy milk", true));

            assert!(matches!(err, NoteStoreError::Persist(_)));
            assert!(store.is_empty());
            assert!(storage.raw(NOTES_STORAGE_KEY).is_none());
            assert!(notifier.active_triggers().is_empty());
            assert_eq!(notifier.cancellations(), vec!["calendar-2025-6-15".to_string()]);
        }

        it "keeps the previous text when an update cannot be saved" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", false));
            storage.fail_next_writes(2);

            assert_err!(store.upsert(key("2025-6-15"), "Buy bread", false));

            assert_eq!(store.get(&key("2025-6-15")).unwrap().note, "Buy milk");
        }

        it "retries a transient write failure" {
            storage.fail_next_writes(1);

            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", false));

            assert_eq!(storage.writes(), 1);
            assert_eq!(store.len(), 1);
        }

        it "fails the save when scheduling fails" {
            notifier.fail_next_calls(2);

            let err = assert_err!(store.upsert(key("2025-6-15"), "Buy milk", true));

            assert!(matches!(err, NoteStoreError::Schedule { .. }));
            assert!(store.get(&key("2025-6-15")).is_none());
            assert!(storage.raw(NOTES_STORAGE_KEY).is_none());
        }

        it "keeps the note when its reminder cannot be cancelled" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));
            notifier.fail_next_calls(2);

            let err = assert_err!(store.delete(&key("2025-6-15")));

            assert!(matches!(err, NoteStoreError::Cancel { .. }));
            assert!(store.get(&key("2025-6-15")).unwrap().has_notification);
        }

        it "re-arms the reminder when a delete cannot be saved" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));
            storage.fail_next_writes(2);

            let err = assert_err!(store.delete(&key("2025-6-15")));

            assert!(matches!(err, NoteStoreError::Persist(_)));
            assert!(store.get(&key("2025-6-15")).unwrap().has_notification);
            let trigger = notifier.trigger("calendar-2025-6-15").expect("reminder is armed again");
            assert_eq!(trigger.body, "Buy milk");
            assert_eq!(trigger.fire_at, at(2025, 6, 15, 7, 0));
        }

        it "re-arms the reminder when turning it off cannot be saved" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));
            storage.fail_next_writes(2);

            assert_err!(store.upsert(key("2025-6-15"), "Buy milk", false));

            assert!(store.get(&key("2025-6-15")).unwrap().has_notification);
            assert!(notifier.trigger("calendar-2025-6-15").is_some());
        }

        it "restores the reminder text when an edit cannot be saved" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));
            storage.fail_next_writes(2);

            assert_err!(store.upsert(key("2025-6-15"), "Buy bread", true));

            assert_eq!(store.get(&key("2025-6-15")).unwrap().note, "Buy milk");
            assert_eq!(notifier.trigger("calendar-2025-6-15").unwrap().body, "Buy milk");
        }

        it "re-arms the reminder when a blank edit cannot be saved" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));
            storage.fail_next_writes(2);

            assert_err!(store.upsert(key("2025-6-15"), "   ", true));

            assert_eq!(store.len(), 1);
            assert!(notifier.trigger("calendar-2025-6-15").is_some());
        }
    }

    describe "load" {
        it "reproduces the saved mapping" {
            assert_ok!(store.upsert(key("2025-6-15"), "Buy milk", true));
            assert_ok!(store.upsert(key("2025-12-1"), "Pay rent", false));
            assert_ok!(store.upsert(key("2026-1-29"), "Spring festival", true));

            let mut reloaded = NoteStore::new(storage.clone(), notifier.clone());
            reloaded.load();

            assert_eq!(reloaded.notes(), store.notes());
            assert_eq!(reloaded.records().len(), 3);
        }

        it "reads the persisted layout" {
            storage.insert_raw(
                NOTES_STORAGE_KEY,
                r#"{"2025-6-15":{"note":"Buy milk","hasNotification":true}}"#,
            );

            store.load();

            let record = store.get(&key("2025-6-15")).expect("note loaded");
            assert_eq!(record.note, "Buy milk");
            assert!(record.has_notification);
        }

        it "starts empty when the stored state is unreadable" {
            storage.insert_raw(NOTES_STORAGE_KEY, "not json");

            assert!(store.load().is_empty());
        }

        it "drops blank notes" {
            storage.insert_raw(
                NOTES_STORAGE_KEY,
                r#"{"2025-6-15":{"note":"  ","hasNotification":false},"2025-6-16":{"note":"Gym","hasNotification":false}}"#,
            );

            store.load();

            assert_eq!(store.len(), 1);
            assert!(store.get(&key("2025-6-16")).is_some());
        }
    }
}
