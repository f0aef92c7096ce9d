use kiln_extract::{ExtractedTask, TaskSummary};
use kiln_ir::{GlobalVar, structural::structural_eq};
use kiln_macros::test;
use kiln_test_utils::{count_internal_dispatches, expect_eq, parse_ok};

use crate::run;

const MIXED: &str = include_str!("../../test-cases/mixed_functions.kiln");

#[test]
fn no_two_tasks_share_a_kernel_class() {
    let module = parse_ok(MIXED);
    let tasks = run(&module).unwrap();
    let entries: Vec<_> = tasks
        .iter()
        .map(|task| task.module.lookup(&GlobalVar::new("main")).unwrap())
        .collect();

    for (i, a) in entries.iter().enumerate() {
        for b in &entries[i + 1..] {
            assert!(!structural_eq(a, b));
        }
    }
}

#[test]
fn weights_sum_to_internal_dispatch_count() {
    let module = parse_ok(MIXED);
    let total: usize = run(&module).unwrap().iter().map(|task| task.weight).sum();

    expect_eq!(actual = total, expected = count_internal_dispatches(&module));
}

#[test]
fn repeated_runs_agree() {
    let module = parse_ok(MIXED);
    let summaries = || -> Vec<TaskSummary> {
        run(&module)
            .unwrap()
            .iter()
            .map(ExtractedTask::summary)
            .collect()
    };

    expect_eq!(actual = summaries(), expected = summaries());
}
