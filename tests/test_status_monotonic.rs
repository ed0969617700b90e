//! Property tests: status transitions only ever move a record forward

mod test_helpers;

use crewline::store::{InMemoryTaskStore, TaskStore};
use crewline::task::{StatusChange, TaskRecord, TaskStatus};
use proptest::prelude::*;
use serde_json::json;
use test_helpers::niche_submission;

fn rank(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Pending => 0,
        TaskStatus::Processing => 1,
        TaskStatus::Completed | TaskStatus::Failed => 2,
    }
}

fn change_strategy() -> impl Strategy<Value = StatusChange> {
    prop_oneof![
        Just(StatusChange::Processing),
        any::<u8>().prop_map(|n| StatusChange::Completed(json!(n))),
        "[a-z]{1,12}".prop_map(StatusChange::Failed),
    ]
}

proptest! {
    #[test]
    fn status_never_regresses(changes in prop::collection::vec(change_strategy(), 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = InMemoryTaskStore::new();
            let record = TaskRecord::new_pending(niche_submission());
            store.insert(&record).await.unwrap();

            let mut previous = TaskStatus::Pending;
            let mut terminal: Option<TaskRecord> = None;

            for change in changes {
                let target = change.target();
                let outcome = store.advance(record.id, change).await.unwrap();
                let current = outcome.record().clone();

                prop_assert!(rank(current.status) >= rank(previous));
                prop_assert_eq!(outcome.is_applied(), rank(target) > rank(previous));

                // Once terminal, the record is frozen
                if let Some(frozen) = &terminal {
                    prop_assert_eq!(frozen, &current);
                }
                if current.status.is_terminal() && terminal.is_none() {
                    terminal = Some(current.clone());
                }

                // Result and error never coexist
                prop_assert!(!(current.result.is_some() && current.error_message.is_some()));
                if current.status == TaskStatus::Completed {
                    prop_assert!(current.result.is_some());
                }
                if current.status == TaskStatus::Failed {
                    prop_assert!(current.error_message.is_some());
                }

                previous = current.status;
            }
            Ok(())
        })?;
    }
}
