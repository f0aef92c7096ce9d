#![forbid(unsafe_code)]

use std::ops::ControlFlow;

use kiln_extract::ExtractedTask;
use kiln_ir::{Kind, Module, Op, arena::NodeRef, parse_module, visitor::IrVisitor};
use tracing::info;

/// Workaround for `pretty_assertions::assert_eq` arguments appearing
/// in a (slightly?) unnatural order. The _expected_ expression ideally comes first,
/// in order to show the most sensible colored diff.
/// This macro makes expected and actual explicit, and supports any order by using keyword arguments.
#[macro_export]
macro_rules! expect_eq {
    (expected = $expected:expr, actual = $actual:expr $(,)?) => {
        pretty_assertions::assert_eq!($expected, $actual);
    };
    (actual = $actual:expr, expected = $expected:expr $(,)?) => {
        pretty_assertions::assert_eq!($expected, $actual);
    };
}

#[macro_export]
macro_rules! assert_error_msg {
    ($e:expr, $msg:expr) => {
        match $e {
            Ok(v) => panic!("Expected error, was Ok({v:?})"),
            Err(e) => pretty_assertions::assert_eq!($msg, format!("{e}").trim()),
        }
    };
}

/// Parse a module, panicking with the located parse error.
#[track_caller]
pub fn parse_ok(src: &str) -> Module {
    match parse_module(src) {
        Ok(module) => module,
        Err(error) => panic!("{error}"),
    }
}

/// `(name, weight)` of each task, in order.
pub fn weights(tasks: &[ExtractedTask]) -> Vec<(String, usize)> {
    tasks
        .iter()
        .map(|task| (task.name.to_string(), task.weight))
        .collect()
}

/// The number of dispatches from orchestration functions to module-internal kernels.
/// The weights of all extracted tasks sum up to this.
pub fn count_internal_dispatches(module: &Module) -> usize {
    let mut counter = DispatchCounter::default();
    for (_, func) in module.orchestration_funcs() {
        let ControlFlow::Continue(()) = counter.visit_function(func);
    }
    counter.internal
}

#[derive(Default)]
struct DispatchCounter {
    internal: usize,
}

impl<'a> IrVisitor<'a> for DispatchCounter {
    type Break = std::convert::Infallible;

    fn visit_node(&mut self, _index: usize, node_ref: NodeRef<'a>) -> ControlFlow<Self::Break> {
        if let Kind::Call(Op::Dispatch, args) = node_ref.kind() {
            let callee = args.first().map(|callee| node_ref.arena().node_ref(*callee));
            if let Some(Kind::Global(_)) = callee.map(|callee| callee.kind()) {
                self.internal += 1;
            }
        }
        self.traverse_node(node_ref)
    }
}

/// Expectations declared in the header comments of a `.kiln` test case file:
///
/// ```text
/// // task fn1 8
/// // task fn3 2
/// ```
///
/// or
///
/// ```text
/// // error @main dispatches to @missing, which is not defined in the module
/// ```
#[derive(PartialEq, Eq, Debug)]
pub enum Expectation {
    Tasks(Vec<(String, usize)>),
    Error(String),
}

impl Expectation {
    #[track_caller]
    pub fn from_header(src: &str) -> Self {
        let mut tasks = vec![];
        let mut error = None;

        for line in src.lines() {
            let Some(comment) = line.trim().strip_prefix("//") else {
                break;
            };
            let comment = comment.trim();

            if let Some(task) = comment.strip_prefix("task ") {
                let Some((name, weight)) = task.trim().rsplit_once(' ') else {
                    panic!("malformed task expectation: `{comment}`");
                };
                let weight = weight
                    .parse()
                    .unwrap_or_else(|_| panic!("malformed task weight: `{comment}`"));
                tasks.push((name.trim().to_string(), weight));
            } else if let Some(msg) = comment.strip_prefix("error ") {
                error = Some(msg.trim().to_string());
            }
        }

        let expectation = match error {
            Some(msg) => {
                assert!(tasks.is_empty(), "a test case expects tasks or an error");
                Self::Error(msg)
            }
            None => Self::Tasks(tasks),
        };
        info!("expecting {expectation:?}");

        expectation
    }
}
