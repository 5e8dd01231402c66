mod support;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use support::{collaborators, Call, Recorder};
use task_domain::{
    after_save::AfterSaveStep,
    error::AfterSaveError,
    model::{SyncAccount, Task, TaskId},
    ports::AccountStore,
    AfterSaveInput, AfterSaveWork, MemoryStore,
};

const T: i64 = 1_700_000_000_000;

fn setup(task: Task) -> (Arc<MemoryStore>, Arc<Recorder>, AfterSaveWork) {
    let store = Arc::new(MemoryStore::new());
    store.insert_task(task);
    let recorder = Recorder::new();
    let work = AfterSaveWork::new(collaborators(&store, &recorder));
    (store, recorder, work)
}

fn input(task_id: TaskId) -> AfterSaveInput {
    AfterSaveInput {
        task_id,
        ..AfterSaveInput::default()
    }
}

#[test]
fn missing_task_fails_without_side_effects() {
    let (_store, recorder, work) = setup(Task::new(1, "exists"));
    let err = work.run(&input(2)).unwrap_err();
    assert!(matches!(err, AfterSaveError::TaskNotFound(2)));
    assert!(recorder.calls().is_empty());
}

#[test]
fn completing_a_task_fires_completion_side_effects() {
    let mut task = Task::new(1, "Pick up dry cleaning");
    task.completion_date = T;
    task.timer_start = T - 60_000;
    task.calendar_uri = Some("content://calendar/events/9".into());
    let (_store, recorder, work) = setup(task);

    let outcome = work.run(&input(1)).unwrap();

    assert!(outcome.just_completed);
    assert!(!outcome.just_deleted);
    assert!(outcome.failures.is_empty());
    assert_eq!(
        recorder.calls(),
        vec![
            Call::Alarm(1),
            Call::Cancel(1),
            Call::GeofenceUpdate(1),
            Call::CalendarTitle(
                "content://calendar/events/9".into(),
                "Pick up dry cleaning (\u{2713})".into()
            ),
            Call::Repeat(1),
            Call::StopTimer(1),
            Call::Refresh(1),
            Call::Broadcast,
        ]
    );
}

#[test]
fn unchanged_timestamps_only_reschedule() {
    let mut task = Task::new(1, "Already done");
    task.completion_date = T;
    task.timer_start = T;
    task.calendar_uri = Some("content://calendar/events/1".into());
    let (_store, recorder, work) = setup(task);

    let outcome = work
        .run(&AfterSaveInput {
            original_completed: T,
            ..input(1)
        })
        .unwrap();

    assert!(!outcome.just_completed);
    assert!(!outcome.completion_modified);
    assert_eq!(
        recorder.calls(),
        vec![Call::Alarm(1), Call::Refresh(1), Call::Broadcast]
    );
}

#[test]
fn uncompleting_updates_geofences_without_cancelling() {
    let (_store, recorder, work) = setup(Task::new(1, "Reopened"));
    let outcome = work
        .run(&AfterSaveInput {
            original_completed: T,
            ..input(1)
        })
        .unwrap();

    assert!(outcome.completion_modified);
    assert!(!outcome.just_completed);
    assert_eq!(recorder.count("cancel"), 0);
    assert_eq!(recorder.count("geofence"), 1);
    assert_eq!(recorder.count("repeat"), 0);
}

#[test]
fn deleting_cancels_but_skips_completion_actions() {
    let mut task = Task::new(1, "Trash me");
    task.deletion_date = T;
    task.timer_start = T;
    let (_store, recorder, work) = setup(task);

    let outcome = work.run(&input(1)).unwrap();

    assert!(outcome.just_deleted);
    assert_eq!(recorder.count("cancel"), 1);
    assert_eq!(recorder.count("geofence"), 1);
    assert_eq!(recorder.count("calendar"), 0);
    assert_eq!(recorder.count("repeat"), 0);
    assert_eq!(recorder.count("timer"), 0);
}

#[test]
fn calendar_is_skipped_without_an_event_uri() {
    let mut task = Task::new(1, "No calendar");
    task.completion_date = T;
    task.calendar_uri = Some(String::new());
    let (_store, recorder, work) = setup(task);
    work.run(&input(1)).unwrap();
    assert_eq!(recorder.count("calendar"), 0);
    assert_eq!(recorder.count("timer"), 0);
}

#[test]
fn custom_completed_title_format() {
    let mut task = Task::new(1, "Dentist");
    task.completion_date = T;
    task.calendar_uri = Some("cal://1".into());
    let (store, recorder, _) = setup(task);
    let work = AfterSaveWork::new(collaborators(&store, &recorder))
        .with_completed_title_format("[done] {title}");
    work.run(&input(1)).unwrap();
    assert!(recorder
        .calls()
        .contains(&Call::CalendarTitle("cal://1".into(), "[done] Dentist".into())));
}

#[test]
fn suppressing_account_blocks_repeat() {
    let mut task = Task::new(1, "Weekly review");
    task.completion_date = T;
    let (store, recorder, work) = setup(task);
    store.insert_account(SyncAccount {
        uuid: "dav".into(),
        name: "DAV".into(),
        suppress_repeating_tasks: true,
    });
    store.link_account(1, "dav");

    work.run(&input(1)).unwrap();
    assert_eq!(recorder.count("repeat"), 0);
    assert_eq!(recorder.count("cancel"), 1);
}

#[test]
fn account_without_suppression_still_repeats() {
    let mut task = Task::new(1, "Weekly review");
    task.completion_date = T;
    let (store, recorder, work) = setup(task);
    store.insert_account(SyncAccount {
        uuid: "dav".into(),
        name: "DAV".into(),
        suppress_repeating_tasks: false,
    });
    store.link_account(1, "dav");

    work.run(&input(1)).unwrap();
    assert_eq!(recorder.count("repeat"), 1);
}

struct BrokenAccounts;

impl AccountStore for BrokenAccounts {
    fn account_for_task(&self, _task_id: TaskId) -> Result<Option<SyncAccount>> {
        Err(anyhow!("account table locked"))
    }
}

#[test]
fn failed_account_lookup_skips_repeat_and_continues() {
    let mut task = Task::new(1, "Weekly review");
    task.completion_date = T;
    task.timer_start = T;
    let (store, recorder, _) = setup(task);
    let mut deps = collaborators(&store, &recorder);
    deps.accounts = Arc::new(BrokenAccounts);
    let work = AfterSaveWork::new(deps);

    let outcome = work.run(&input(1)).unwrap();
    assert!(outcome.failed(AfterSaveStep::LookupAccount));
    assert_eq!(recorder.count("repeat"), 0);
    assert_eq!(recorder.count("timer"), 1);
    assert_eq!(recorder.count("broadcast"), 1);
}

#[test]
fn one_sync_pass_for_both_backends() {
    let (_store, recorder, work) = setup(Task::new(1, "Synced"));
    recorder.enable_sync(true, true);
    let outcome = work
        .run(&AfterSaveInput {
            push_gtasks: true,
            push_caldav: true,
            ..input(1)
        })
        .unwrap();
    assert!(outcome.sync_enqueued);
    assert_eq!(
        recorder
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Sync(_)))
            .collect::<Vec<_>>(),
        vec![Call::Sync(false)]
    );
}

#[test]
fn sync_needs_flag_and_enabled_backend() {
    let (_store, recorder, work) = setup(Task::new(1, "Synced"));
    recorder.enable_sync(false, true);

    let outcome = work
        .run(&AfterSaveInput {
            push_gtasks: true,
            ..input(1)
        })
        .unwrap();
    assert!(!outcome.sync_enqueued);
    assert_eq!(recorder.count("sync"), 0);

    let outcome = work
        .run(&AfterSaveInput {
            push_caldav: true,
            ..input(1)
        })
        .unwrap();
    assert!(outcome.sync_enqueued);
    assert_eq!(recorder.count("sync"), 1);
}

#[test]
fn suppress_refresh_skips_broadcast_only() {
    let (_store, recorder, work) = setup(Task::new(1, "Quiet"));
    let outcome = work
        .run(&AfterSaveInput {
            suppress_refresh: true,
            ..input(1)
        })
        .unwrap();
    assert!(!outcome.broadcast);
    assert_eq!(recorder.count("broadcast"), 0);
    assert_eq!(recorder.count("refresh"), 1);
}

#[test]
fn failing_steps_do_not_stop_later_ones() {
    let mut task = Task::new(1, "Flaky");
    task.completion_date = T;
    task.timer_start = T;
    task.calendar_uri = Some("cal://flaky".into());
    let (_store, recorder, work) = setup(task);
    recorder.enable_sync(true, false);
    for name in ["alarm", "cancel", "geofence", "calendar", "repeat", "timer", "sync", "refresh"] {
        recorder.fail(name);
    }

    let outcome = work
        .run(&AfterSaveInput {
            push_gtasks: true,
            ..input(1)
        })
        .unwrap();

    assert_eq!(outcome.failures.len(), 8);
    assert!(outcome.failed(AfterSaveStep::UpdateCalendar));
    assert!(!outcome.sync_enqueued);
    assert!(outcome.broadcast);
    assert_eq!(recorder.calls().len(), 9);
}

#[test]
fn bundle_round_trip_drives_the_run() {
    let mut task = Task::new(5, "Bundle");
    task.completion_date = T;
    let (_store, recorder, work) = setup(task);
    let bundle = AfterSaveInput {
        suppress_refresh: true,
        ..input(5)
    }
    .to_bundle();

    let outcome = work.run_bundle(&bundle).unwrap();
    assert!(outcome.just_completed);
    assert_eq!(recorder.count("broadcast"), 0);
}

#[test]
fn save_then_reconcile_via_store_hook() {
    let captured = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = captured.clone();
    let store = Arc::new(
        MemoryStore::new().with_save_hook(Box::new(move |input| sink.lock().push(input))),
    );
    let recorder = Recorder::new();
    recorder.enable_sync(true, false);
    let work = AfterSaveWork::new(collaborators(&store, &recorder));

    store.insert_task(Task::new(8, "Groceries"));
    let mut task = Task::new(8, "Groceries");
    task.completion_date = T;
    task_domain::ports::TaskStore::save(store.as_ref(), &task).unwrap();

    let input = captured.lock().pop().unwrap();
    let outcome = work.run(&input).unwrap();
    assert!(outcome.just_completed);
    assert!(outcome.sync_enqueued);
}
