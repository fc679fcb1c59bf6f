use proptest::prelude::*;
use taskforge_core::model::{Task, TaskStatus};
use taskforge_core::view::{SortOrder, StatusFilter, filter_and_sort};

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Done),
    ]
}

fn arb_due() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("not a date".to_string())),
        (2020i32..2030, 1u32..=12, 1u32..=28)
            .prop_map(|(y, m, d)| Some(format!("{y:04}-{m:02}-{d:02}"))),
    ]
}

fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec((arb_status(), arb_due()), 0..24).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (status, due_date))| Task {
                id: format!("t{i}"),
                project_id: "p".to_string(),
                owner_id: "alice".to_string(),
                title: format!("task {i}"),
                description: None,
                due_date,
                status,
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(512))]

    #[test]
    fn status_filter_keeps_exactly_matching_tasks(tasks in arb_tasks(), status in arb_status()) {
        let out = filter_and_sort(&tasks, StatusFilter::Only(status), SortOrder::Ascending);
        prop_assert!(out.iter().all(|t| t.status == status));
        prop_assert_eq!(out.len(), tasks.iter().filter(|t| t.status == status).count());
    }

    #[test]
    fn ascending_sort_puts_undated_last(tasks in arb_tasks()) {
        let out = filter_and_sort(&tasks, StatusFilter::All, SortOrder::Ascending);
        prop_assert_eq!(out.len(), tasks.len());

        let first_undated = out.iter().position(|t| t.due().is_none()).unwrap_or(out.len());
        prop_assert!(out[first_undated..].iter().all(|t| t.due().is_none()));
        let dates: Vec<_> = out[..first_undated].iter().filter_map(|t| t.due()).collect();
        prop_assert!(dates.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn descending_sort_puts_undated_first(tasks in arb_tasks()) {
        let out = filter_and_sort(&tasks, StatusFilter::All, SortOrder::Descending);
        let dated_from = out.iter().position(|t| t.due().is_some()).unwrap_or(out.len());
        prop_assert!(out[..dated_from].iter().all(|t| t.due().is_none()));
        let dates: Vec<_> = out[dated_from..].iter().filter_map(|t| t.due()).collect();
        prop_assert_eq!(dates.len(), out.len() - dated_from);
        prop_assert!(dates.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn sort_is_stable_for_equal_dates(tasks in arb_tasks()) {
        let out = filter_and_sort(&tasks, StatusFilter::All, SortOrder::Ascending);
        for pair in out.windows(2) {
            if pair[0].due() == pair[1].due() {
                let a: usize = pair[0].id[1..].parse().expect("generated id");
                let b: usize = pair[1].id[1..].parse().expect("generated id");
                prop_assert!(a < b);
            }
        }
    }

    #[test]
    fn toggle_is_an_involution_on_todo_and_done(done in any::<bool>()) {
        let status = if done { TaskStatus::Done } else { TaskStatus::Todo };
        prop_assert_eq!(status.toggled().toggled(), status);
        prop_assert_ne!(status.toggled(), status);
    }
}

#[test]
fn in_progress_toggles_to_done() {
    assert_eq!(TaskStatus::InProgress.toggled(), TaskStatus::Done);
    assert_eq!(TaskStatus::InProgress.toggled().toggled(), TaskStatus::Todo);
}
