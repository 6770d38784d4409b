use chrono::{NaiveDate, NaiveDateTime};
use pal_pan::db::Database;
use pal_pan::ports::{Channel, Importance, KeyValueStore, Trigger};
use speculate2::speculate;

fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn reminder_channel() -> Channel {
    Channel {
        id: "calendar-reminders".to_string(),
        name: "Calendar reminders".to_string(),
        importance: Importance::High,
    }
}

fn trigger(id: &str, fire_at: NaiveDateTime) -> Trigger {
    Trigger {
        id: id.to_string(),
        channel_id: "calendar-reminders".to_string(),
        fire_at,
        title: "📅 Calendar reminder".to_string(),
        body: format!("note for {}", id),
    }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "key-value store" {
        it "returns None for a missing key" {
            assert!(db.kv_get("calendarNotes").expect("Query failed").is_none());
        }

        it "overwrites the whole value on set" {
            db.kv_set("todos", "[1]").expect("Failed to set");
            db.kv_set("todos", "[1,2]").expect("Failed to set");

            assert_eq!(db.kv_get("todos").expect("Query failed"), Some("[1,2]".to_string()));
        }

        it "keeps keys independent" {
            db.kv_set("calendarNotes", "{}").expect("Failed to set");
            db.kv_set("@uploaded_images", "[]").expect("Failed to set");

            assert_eq!(db.kv_get("calendarNotes").unwrap(), Some("{}".to_string()));
            assert_eq!(db.kv_get("@uploaded_images").unwrap(), Some("[]".to_string()));
        }

        it "serves the KeyValueStore port" {
            KeyValueStore::set(&db, "calendarNotes", r#"{"2025-6-15":{}}"#).expect("Failed to set");

            let value = KeyValueStore::get(&db, "calendarNotes").expect("Query failed");
            assert_eq!(value, Some(r#"{"2025-6-15":{}}"#.to_string()));
        }
    }

    describe "notification channels" {
        it "registers a channel" {
            db.upsert_channel(&reminder_channel()).expect("Failed to register");

            let channel = db.get_channel("calendar-reminders").expect("Query failed");
            assert_eq!(channel, Some(reminder_channel()));
        }

        it "updates a channel registered twice" {
            db.upsert_channel(&reminder_channel()).expect("Failed to register");
            let mut renamed = reminder_channel();
            renamed.name = "Reminders".to_string();
            renamed.importance = Importance::Default;
            db.upsert_channel(&renamed).expect("Failed to register");

            assert_eq!(db.get_channel("calendar-reminders").unwrap(), Some(renamed));
        }

        it "returns None for an unknown channel" {
            assert!(db.get_channel("nope").expect("Query failed").is_none());
        }
    }

    describe "notification triggers" {
        before {
            db.upsert_channel(&reminder_channel()).expect("Failed to register");
        }

        it "stores and reads back a trigger" {
            let t = trigger("calendar-2025-6-15", at(2025, 6, 15, 7));
            db.upsert_trigger(&t).expect("Failed to store");

            assert_eq!(db.get_trigger("calendar-2025-6-15").unwrap(), Some(t));
        }

        it "replaces a trigger with the same id" {
            db.upsert_trigger(&trigger("calendar-2025-6-15", at(2025, 6, 15, 7))).unwrap();
            let mut updated = trigger("calendar-2025-6-15", at(2025, 6, 15, 7));
            updated.body = "Buy oat milk".to_string();
            db.upsert_trigger(&updated).unwrap();

            assert_eq!(db.pending_triggers().unwrap(), vec![updated]);
        }

        it "lists pending triggers by fire time" {
            db.upsert_trigger(&trigger("calendar-2025-7-1", at(2025, 7, 1, 7))).unwrap();
            db.upsert_trigger(&trigger("calendar-2025-6-15", at(2025, 6, 15, 7))).unwrap();

            let ids: Vec<String> = db.pending_triggers().unwrap().into_iter().map(|t| t.id).collect();
            assert_eq!(ids, vec!["calendar-2025-6-15", "calendar-2025-7-1"]);
        }

        it "reports whether a delete removed anything" {
            db.upsert_trigger(&trigger("calendar-2025-6-15", at(2025, 6, 15, 7))).unwrap();

            assert!(db.delete_trigger("calendar-2025-6-15").unwrap());
            assert!(!db.delete_trigger("calendar-2025-6-15").unwrap());
        }

        it "hands out due triggers once" {
            db.upsert_trigger(&trigger("calendar-2025-6-15", at(2025, 6, 15, 7))).unwrap();
            db.upsert_trigger(&trigger("calendar-2025-7-1", at(2025, 7, 1, 7))).unwrap();

            let due = db.take_due_triggers(at(2025, 6, 15, 7)).unwrap();
            assert_eq!(due.len(), 1);
            assert_eq!(due[0].id, "calendar-2025-6-15");

            assert!(db.take_due_triggers(at(2025, 6, 20, 0)).unwrap().is_empty());
            assert_eq!(db.pending_triggers().unwrap().len(), 1);
        }

        it "re-arms a delivered trigger that is scheduled again" {
            db.upsert_trigger(&trigger("calendar-2025-6-15", at(2025, 6, 15, 7))).unwrap();
            db.take_due_triggers(at(2025, 6, 16, 0)).unwrap();

            db.upsert_trigger(&trigger("calendar-2025-6-15", at(2025, 6, 15, 7))).unwrap();

            assert_eq!(db.pending_triggers().unwrap().len(), 1);
        }

        it "refuses fire times past year 9999" {
            let far = at(9999, 12, 31, 7) + chrono::Duration::days(1);

            assert!(db.upsert_trigger(&trigger("far", far)).is_err());
            assert!(db.pending_triggers().unwrap().is_empty());
        }

        it "treats a clock past year 9999 as later than every trigger" {
            db.upsert_trigger(&trigger("calendar-2025-6-15", at(2025, 6, 15, 7))).unwrap();
            db.upsert_trigger(&trigger("calendar-9999-12-31", at(9999, 12, 31, 7))).unwrap();

            let due = db.take_due_triggers(at(10000, 1, 1, 0)).unwrap();

            let ids: Vec<String> = due.into_iter().map(|t| t.id).collect();
            assert_eq!(ids, vec!["calendar-2025-6-15", "calendar-9999-12-31"]);
            assert!(db.pending_triggers().unwrap().is_empty());
        }
    }

    describe "database file" {
        it "keeps data across reopen" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("nested").join("pal-pan.db");

            {
                let db = Database::open(path.clone()).expect("Failed to open");
                db.migrate().expect("Failed to migrate");
                db.kv_set("calendarNotes", r#"{"2025-6-15":{"note":"Buy milk","hasNotification":false}}"#)
                    .expect("Failed to set");
            }

            let reopened = Database::open(path).expect("Failed to reopen");
            reopened.migrate().expect("Migrations are idempotent");
            let value = reopened.kv_get("calendarNotes").unwrap().expect("value survived");
            assert!(value.contains("Buy milk"));
        }
    }
}
