//! Pure narrowing of a task set by the board's filter criteria.

use crate::types::{Task, TaskFilters};

/// Returns the tasks that satisfy every active criterion, preserving input order.
pub fn visible_tasks(all_tasks: &[Task], filters: &TaskFilters) -> Vec<Task> {
    if filters.is_empty() {
        return all_tasks.to_vec();
    }

    let needle = filters.search().map(str::to_lowercase);
    all_tasks
        .iter()
        .filter(|task| matches_with_needle(task, filters, needle.as_deref()))
        .cloned()
        .collect()
}

pub fn matches(task: &Task, filters: &TaskFilters) -> bool {
    let needle = filters.search().map(str::to_lowercase);
    matches_with_needle(task, filters, needle.as_deref())
}

fn matches_with_needle(task: &Task, filters: &TaskFilters, needle: Option<&str>) -> bool {
    if let Some(assignee) = filters.assignee()
        && task.assignee_id.as_deref() != Some(assignee)
    {
        return false;
    }

    if let Some(priority) = filters.priority
        && task.priority != priority
    {
        return false;
    }

    if let Some(category) = filters.category()
        && task.category.as_deref() != Some(category)
    {
        return false;
    }

    match needle {
        Some(needle) => {
            task.title.to_lowercase().contains(needle)
                || task
                    .description
                    .as_deref()
                    .is_some_and(|description| description.to_lowercase().contains(needle))
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::types::Priority;

    fn sample_tasks() -> Vec<Task> {
        vec![
            Task::new("t1", "Fix login redirect", "TODO")
                .with_priority(Priority::P1)
                .with_category("bug")
                .with_assignee("u1", "Ada"),
            Task::new("t2", "Write onboarding docs", "TODO")
                .with_priority(Priority::P2)
                .with_category("docs")
                .with_description("Cover the LOGIN flow end to end"),
            Task::new("t3", "Ship billing page", "DOING")
                .with_priority(Priority::P1)
                .with_assignee("u2", "Grace"),
        ]
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.id.as_str()).collect()
    }

    #[test]
    fn empty_filters_return_all_tasks_unchanged() {
        let tasks = sample_tasks();
        assert_eq!(visible_tasks(&tasks, &TaskFilters::default()), tasks);
    }

    #[test]
    fn priority_filter_keeps_only_matching_priority() {
        let tasks = vec![
            Task::new("a", "first", "TODO").with_priority(Priority::P1),
            Task::new("b", "second", "TODO").with_priority(Priority::P2),
        ];
        let filters = TaskFilters {
            priority: Some(Priority::P1),
            ..TaskFilters::default()
        };
        assert_eq!(ids(&visible_tasks(&tasks, &filters)), vec!["a"]);
    }

    #[test]
    fn assignee_filter_is_exact_match_on_id() {
        let filters = TaskFilters {
            assignee: Some("u1".to_string()),
            ..TaskFilters::default()
        };
        assert_eq!(ids(&visible_tasks(&sample_tasks(), &filters)), vec!["t1"]);

        let by_name = TaskFilters {
            assignee: Some("Ada".to_string()),
            ..TaskFilters::default()
        };
        assert!(visible_tasks(&sample_tasks(), &by_name).is_empty());
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_description() {
        let filters = TaskFilters {
            search: Some("Login".to_string()),
            ..TaskFilters::default()
        };
        assert_eq!(
            ids(&visible_tasks(&sample_tasks(), &filters)),
            vec!["t1", "t2"]
        );
    }

    #[test]
    fn filters_are_combined_with_and() {
        let filters = TaskFilters {
            priority: Some(Priority::P1),
            search: Some("login".to_string()),
            ..TaskFilters::default()
        };
        assert_eq!(ids(&visible_tasks(&sample_tasks(), &filters)), vec!["t1"]);

        let category_only = TaskFilters {
            category: Some("docs".to_string()),
            ..TaskFilters::default()
        };
        assert!(matches(&sample_tasks()[1], &category_only));
        assert!(!matches(&sample_tasks()[0], &category_only));
    }

    fn arb_task() -> impl Strategy<Value = Task> {
        (
            "[a-z0-9]{1,6}",
            "[a-zA-Z ]{0,12}",
            prop::option::of("[a-zA-Z ]{0,12}"),
            prop::sample::select(vec!["TODO", "DOING", "DONE"]),
            prop::sample::select(Priority::ALL.to_vec()),
            prop::option::of(prop::sample::select(vec!["bug", "docs", "ops"])),
            prop::option::of(prop::sample::select(vec!["u1", "u2"])),
        )
            .prop_map(
                |(id, title, description, status, priority, category, assignee)| Task {
                    id: id.as_str().into(),
                    title,
                    description,
                    status: status.to_string(),
                    priority,
                    category: category.map(str::to_string),
                    assignee_id: assignee.map(str::to_string),
                    assignee_name: None,
                    updated_at: None,
                },
            )
    }

    fn arb_filters() -> impl Strategy<Value = TaskFilters> {
        (
            prop::option::of(prop::sample::select(vec!["u1", "u2", ""])),
            prop::option::of(prop::sample::select(Priority::ALL.to_vec())),
            prop::option::of(prop::sample::select(vec!["bug", "docs", ""])),
            prop::option::of("[a-zA-Z]{0,3}"),
        )
            .prop_map(|(assignee, priority, category, search)| TaskFilters {
                assignee: assignee.map(str::to_string),
                priority,
                category: category.map(str::to_string),
                search,
            })
    }

    proptest! {
        #[test]
        fn identity_law_holds(tasks in prop::collection::vec(arb_task(), 0..20)) {
            prop_assert_eq!(visible_tasks(&tasks, &TaskFilters::default()), tasks);
        }

        #[test]
        fn output_is_an_ordered_subset(
            tasks in prop::collection::vec(arb_task(), 0..20),
            filters in arb_filters(),
        ) {
            let visible = visible_tasks(&tasks, &filters);
            let mut remaining = tasks.iter();
            for task in &visible {
                prop_assert!(remaining.any(|candidate| candidate == task));
            }
        }

        #[test]
        fn reapplying_filters_is_idempotent(
            tasks in prop::collection::vec(arb_task(), 0..20),
            filters in arb_filters(),
        ) {
            let once = visible_tasks(&tasks, &filters);
            let twice = visible_tasks(&once, &filters);
            prop_assert_eq!(once, twice);
        }
    }
}
