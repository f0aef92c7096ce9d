use std::{fs, path::PathBuf};

use kiln_extract::{
    ExtractedTask, NormalizerMock, StandaloneNormalizer, Target, TaskExtractor, extract_tasks,
};
use kiln_ir::Module;
use kiln_test_utils::{
    Expectation, assert_error_msg, count_internal_dispatches, expect_eq, parse_ok, weights,
};
use unimock::{MockFn, Unimock, matching};

mod test_properties;

fn cuda() -> Target {
    "cuda -arch=sm_80".parse().unwrap()
}

fn run(module: &Module) -> Result<Vec<ExtractedTask>, kiln_extract::ExtractError> {
    extract_tasks(module, &cuda(), &StandaloneNormalizer)
}

#[rstest::rstest]
#[kiln_macros::test]
fn extract(#[files("test-cases/*.kiln")] path: PathBuf) {
    let src = fs::read_to_string(&path).unwrap();
    let module = parse_ok(&src);

    match Expectation::from_header(&src) {
        Expectation::Tasks(expected) => {
            let tasks = run(&module).unwrap();
            expect_eq!(actual = weights(&tasks), expected = expected);

            let total: usize = tasks.iter().map(|task| task.weight).sum();
            expect_eq!(actual = total, expected = count_internal_dispatches(&module));
        }
        Expectation::Error(msg) => {
            assert_error_msg!(run(&module), msg);
        }
    }
}

#[rstest::rstest]
#[kiln_macros::test]
fn print_parse_fixpoint(#[files("test-cases/*.kiln")] path: PathBuf) {
    let module = parse_ok(&fs::read_to_string(&path).unwrap());
    let printed = module.to_string();
    let reparsed = parse_ok(&printed);

    expect_eq!(actual = reparsed.to_string(), expected = printed);
    expect_eq!(
        actual = reparsed.structural_hash(),
        expected = module.structural_hash()
    );
}

#[kiln_macros::test]
fn mocked_normalizer_output_becomes_the_task_module() {
    let module = parse_ok(&fs::read_to_string("test-cases/alpha_equivalent_dispatches.kiln").unwrap());
    let canonical = parse_ok("(module (kernel @tuned () #u))");
    let hash = canonical.structural_hash();

    let normalizer = Unimock::new((
        NormalizerMock::normalize
            .next_call(matching!(_, _))
            .returns(canonical.clone()),
        NormalizerMock::normalize
            .next_call(matching!(_, _))
            .returns(canonical),
    ));
    let target = cuda();
    let tasks = TaskExtractor::new(&module, &target, &normalizer)
        .extract()
        .unwrap();

    expect_eq!(actual = tasks.len(), expected = 2);
    for task in &tasks {
        expect_eq!(actual = task.module.structural_hash(), expected = hash);
        expect_eq!(actual = task.target.to_string(), expected = "cuda -arch=sm_80");
    }
}
