use std::sync::Arc;

use assert_matches::assert_matches;
use indoc::indoc;
use kiln_ir::{GlobalVar, Module, structural::structural_eq};
use kiln_macros::test;
use kiln_test_utils::{expect_eq, parse_ok};
use unimock::{MockFn, Unimock, matching};

use crate::{
    ExtractError, ExtractedTask, NormalizerMock, NormalizerRegistry, StandaloneNormalizer,
    Target, TaskExtractor, TaskSummary,
    dedup::{DedupIndex, KernelKey},
    extract_tasks,
    normalize::{Normalizer, STANDALONE_ENTRY},
    task::TaskRegistry,
};

fn llvm() -> Target {
    Target::new("llvm").with_option("mcpu", "skylake")
}

fn extract(module: &Module) -> Result<Vec<ExtractedTask>, ExtractError> {
    extract_tasks(module, &llvm(), &StandaloneNormalizer)
}

/// Task weights of a module extracted here. `kiln_test_utils::weights` takes the
/// `ExtractedTask` of the separately built library, not the one under test.
#[track_caller]
fn extracted_weights(module: &Module) -> Vec<(String, usize)> {
    extract(module)
        .unwrap()
        .iter()
        .map(|task| (task.name.to_string(), task.weight))
        .collect()
}

/// Five dispatches to `@fn1`, three to the alpha-equivalent `@fn2`, two to the distinct `@fn3`
const ALPHA_EQUIVALENT_DISPATCHES: &str = indoc! {"
    (module
        (kernel @fn1 (($a (tensor f32 [128])) ($b (tensor f32 [128])))
            (for ($i) 0 128
                (store $b [$i] (+ (load $a [$i]) 1.0))
            )
        )
        (kernel @fn2 (($x (tensor f32 [128])) ($y (tensor f32 [128])))
            (for ($j) 0 128
                (store $y [$j] (+ (load $x [$j]) 1.0))
            )
        )
        (kernel @fn3 (($a (tensor f32 [128])) ($b (tensor f32 [128])))
            (for ($i) 0 128
                (store $b [$i] (* (load $a [$i]) 2.0))
            )
        )
        (func @main (($a (tensor f32 [128])))
            (block
                (let $b (dispatch @fn1 $a))
                (let $c (dispatch @fn2 $b))
                (let $d (dispatch @fn3 $c))
                (let $e (dispatch @fn1 $d))
                (let $f (dispatch @fn2 $e))
                (let $g (dispatch @fn1 $f))
                (let $h (dispatch @fn3 $g))
                (let $i (dispatch @fn1 $h))
                (let $j (dispatch @fn2 $i))
                (let $k (dispatch @fn1 $j))
                $k
            )
        )
    )
"};

#[test]
fn structurally_equal_kernels_share_a_task() {
    let module = parse_ok(ALPHA_EQUIVALENT_DISPATCHES);
    expect_eq!(
        actual = extracted_weights(&module),
        expected = vec![("fn1".to_string(), 8), ("fn3".to_string(), 2)],
    );
}

#[test]
fn task_carries_normalized_module_and_target() {
    let module = parse_ok(ALPHA_EQUIVALENT_DISPATCHES);
    let tasks = extract(&module).unwrap();
    let task = &tasks[0];

    expect_eq!(actual = task.target, expected = llvm());
    expect_eq!(actual = task.module.len(), expected = 1);

    let entry = task.module.lookup(&GlobalVar::new(STANDALONE_ENTRY)).unwrap();
    let fn1 = module.lookup(&GlobalVar::new("fn1")).unwrap();
    assert!(structural_eq(fn1, entry));

    expect_eq!(actual = task.dispatched.len(), expected = 1);
    assert!(Arc::ptr_eq(&task.module, &task.dispatched[0]));
}

#[test]
fn extern_dispatch_is_skipped() {
    let module = parse_ok(indoc! {"
        (module
            (func @main (($a (tensor f32 [4])))
                (block
                    (let $b (dispatch (extern cublas.gemm) $a))
                    $b
                )
            )
        )
    "});
    assert!(extract(&module).unwrap().is_empty());
}

#[test]
fn extern_dispatch_leaves_weights_unchanged() {
    let module = parse_ok(indoc! {"
        (module
            (kernel @k (($a (tensor f32 [4]))) #u)
            (func @main (($a (tensor f32 [4])))
                (block
                    (let $b (dispatch @k $a))
                    (let $c (dispatch (extern cublas.gemm) $b))
                    (let $d (dispatch @k $c))
                    (let $e (dispatch (extern cublas.gemm) $d))
                    $e
                )
            )
        )
    "});
    expect_eq!(actual = extracted_weights(&module), expected = vec![("k".to_string(), 2)]);
}

#[test]
fn empty_module_has_no_tasks() {
    assert!(extract(&Module::new()).unwrap().is_empty());
}

#[test]
fn kernels_are_not_walked_directly() {
    let module = parse_ok(indoc! {"
        (module
            (kernel @k1 (($a (tensor f32 [4]))) #u)
            (kernel @k2 (($a (tensor f32 [4]))) (dispatch @k1 $a))
        )
    "});
    assert!(extract(&module).unwrap().is_empty());
}

#[test]
fn unresolved_global_aborts() {
    let module = parse_ok(indoc! {"
        (module
            (kernel @k (($a (tensor f32 [4]))) #u)
            (func @main (($a (tensor f32 [4])))
                (block
                    (let $b (dispatch @k $a))
                    (let $c (dispatch @missing $b))
                    $c
                )
            )
        )
    "});
    let error = extract(&module).unwrap_err();

    assert_matches!(
        &error,
        ExtractError::UnresolvedGlobal { caller, callee }
            if caller.name_hint().as_str() == "main" && callee.name_hint().as_str() == "missing"
    );
    expect_eq!(
        actual = error.to_string(),
        expected = "@main dispatches to @missing, which is not defined in the module",
    );
}

#[test]
fn unresolved_global_fails_the_same_way_every_run() {
    let module = parse_ok(indoc! {"
        (module
            (func @main (($a (tensor f32 [4]))) (dispatch @missing $a))
        )
    "});
    expect_eq!(actual = extract(&module).unwrap_err(), expected = extract(&module).unwrap_err());
}

#[test]
fn malformed_dispatches_abort() {
    let module = parse_ok(indoc! {"
        (module
            (func @helper (($a (tensor f32 [4]))) $a)
            (func @main (($a (tensor f32 [4]))) (dispatch @helper $a))
        )
    "});
    assert_matches!(extract(&module), Err(ExtractError::NotAKernel { .. }));

    let module = parse_ok("(module (func @main () (dispatch)))");
    assert_matches!(extract(&module), Err(ExtractError::MissingCallee { .. }));

    let module = parse_ok("(module (func @main (($a (scalar i32))) (dispatch $a)))");
    assert_matches!(extract(&module), Err(ExtractError::InvalidCallee { .. }));
}

#[test]
fn dispatches_in_control_flow_count_once_per_call_site() {
    let module = parse_ok(indoc! {"
        (module
            (kernel @k (($a (tensor f32 [4]))) #u)
            (func @main (($a (tensor f32 [4])) ($n (scalar i64)))
                (block
                    (for ($i) 0 100
                        (dispatch @k $a)
                    )
                    (if (< $n 10)
                        (dispatch @k $a)
                        (dispatch @k $a)
                    )
                )
            )
        )
    "});
    expect_eq!(actual = extracted_weights(&module), expected = vec![("k".to_string(), 3)]);
}

#[test]
fn other_calls_are_not_entered() {
    let module = parse_ok(indoc! {"
        (module
            (kernel @k (($a (tensor f32 [4]))) #u)
            (func @main (($a (tensor f32 [4])))
                (block
                    (let $b (call nn.relu (dispatch @k $a)))
                    (let $c (+ (dispatch @missing $a) 1))
                    (dispatch @k $b)
                )
            )
        )
    "});
    expect_eq!(actual = extracted_weights(&module), expected = vec![("k".to_string(), 1)]);
}

#[test]
fn tasks_are_shared_across_orchestration_functions() {
    let module = parse_ok(indoc! {"
        (module
            (func @first (($a (tensor f32 [4])))
                (dispatch @scale $a)
            )
            (kernel @add (($a (tensor f32 [4]))) (+ $a 1))
            (kernel @scale (($a (tensor f32 [4]))) (* $a 2))
            (func @second (($a (tensor f32 [4])))
                (block
                    (let $b (dispatch @add $a))
                    (dispatch @scale $b)
                )
            )
        )
    "});
    expect_eq!(
        actual = extracted_weights(&module),
        expected = vec![("scale".to_string(), 2), ("add".to_string(), 1)],
    );
}

#[test]
fn normalizer_is_invoked_once_per_kernel_class() {
    let module = parse_ok(ALPHA_EQUIVALENT_DISPATCHES);
    let normalized = |name: &str| {
        let kernel = module.lookup(&GlobalVar::new(name)).unwrap();
        StandaloneNormalizer.normalize(&GlobalVar::new(name), kernel)
    };

    let normalizer = Unimock::new((
        NormalizerMock::normalize
            .next_call(matching!(_, _))
            .returns(normalized("fn1")),
        NormalizerMock::normalize
            .next_call(matching!(_, _))
            .returns(normalized("fn3")),
    ));

    let tasks = extract_tasks(&module, &llvm(), &normalizer).unwrap();
    expect_eq!(actual = tasks.len(), expected = 2);
}

#[test]
fn unknown_normalizer_fails_before_traversal() {
    let module = parse_ok(indoc! {"
        (module
            (func @main (($a (tensor f32 [4]))) (dispatch @missing $a))
        )
    "});
    let target = llvm();
    let registry = NormalizerRegistry::with_defaults();

    assert_matches!(
        TaskExtractor::from_registry(&module, &target, &registry, "tir-lowering").err(),
        Some(ExtractError::NormalizerNotFound(name)) if name.as_str() == "tir-lowering"
    );

    let extractor = TaskExtractor::from_registry(&module, &target, &registry, "standalone").unwrap();
    assert_matches!(extractor.extract(), Err(ExtractError::UnresolvedGlobal { .. }));
}

#[test]
fn registry_lists_names_in_registration_order() {
    let mut registry = NormalizerRegistry::with_defaults();
    registry.register("mock", Arc::new(Unimock::new(())));

    expect_eq!(
        actual = registry.names().collect::<Vec<_>>(),
        expected = vec!["standalone", "mock"],
    );
}

fn summaries(module: &Module) -> Vec<TaskSummary> {
    extract(module)
        .unwrap()
        .iter()
        .map(ExtractedTask::summary)
        .collect()
}

#[test]
fn extraction_is_deterministic() {
    let module = parse_ok(ALPHA_EQUIVALENT_DISPATCHES);
    let first = summaries(&module);

    expect_eq!(actual = summaries(&module), expected = first.clone());
    expect_eq!(actual = summaries(&parse_ok(ALPHA_EQUIVALENT_DISPATCHES)), expected = first);
}

#[test]
fn concurrent_runs_match_sequential_runs() {
    let modules = [
        parse_ok(ALPHA_EQUIVALENT_DISPATCHES),
        parse_ok(indoc! {"
            (module
                (kernel @k (($a (tensor f32 [4]))) #u)
                (func @main (($a (tensor f32 [4])))
                    (block
                        (let $b (dispatch @k $a))
                        (dispatch @k $b)
                    )
                )
            )
        "}),
    ];
    let sequential: Vec<_> = modules.iter().map(summaries).collect();

    let normalizer = StandaloneNormalizer;
    let target = llvm();
    let concurrent: Vec<Vec<TaskSummary>> = std::thread::scope(|scope| {
        let handles: Vec<_> = modules
            .iter()
            .map(|module| {
                let (normalizer, target) = (&normalizer, &target);
                scope.spawn(move || {
                    extract_tasks(module, target, normalizer)
                        .unwrap()
                        .iter()
                        .map(ExtractedTask::summary)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    expect_eq!(actual = concurrent, expected = sequential);
}

#[test]
fn hash_collision_does_not_merge_kernels() {
    let module = parse_ok(ALPHA_EQUIVALENT_DISPATCHES);
    let kernel = |name: &str| module.lookup(&GlobalVar::new(name)).unwrap();
    let mut registry = TaskRegistry::default();
    let mut index = DedupIndex::default();

    let fn1_task = registry.push(ExtractedTask::new("fn1".into(), Module::new(), llvm()));
    index.insert(KernelKey::with_hash(42, kernel("fn1")), fn1_task);

    assert_eq!(None, index.get(&KernelKey::with_hash(42, kernel("fn3"))));
    assert_eq!(Some(fn1_task), index.get(&KernelKey::with_hash(42, kernel("fn2"))));

    let fn3_task = registry.push(ExtractedTask::new("fn3".into(), Module::new(), llvm()));
    index.insert(KernelKey::with_hash(42, kernel("fn3")), fn3_task);

    assert_eq!(2, index.len());
    assert_ne!(fn1_task, fn3_task);
    assert_eq!(Some(fn3_task), index.get(&KernelKey::with_hash(42, kernel("fn3"))));
}

#[test]
fn registry_weights() {
    let mut registry = TaskRegistry::default();
    let idx = registry.push(ExtractedTask::new("k".into(), Module::new(), llvm()));
    registry.bump_weight(idx);
    registry.bump_weight(idx);

    expect_eq!(actual = registry.get(idx).weight, expected = 3);
    expect_eq!(actual = registry.into_tasks().len(), expected = 1);
}

#[test]
fn summary_serializes_to_json() {
    let module = parse_ok(ALPHA_EQUIVALENT_DISPATCHES);
    let summary = extract(&module).unwrap()[1].summary();
    let json = serde_json::to_value(&summary).unwrap();

    expect_eq!(actual = json["name"], expected = serde_json::json!("fn3"));
    expect_eq!(actual = json["weight"], expected = serde_json::json!(2));
    expect_eq!(actual = json["hash"].as_str().unwrap().len(), expected = 16);
}
