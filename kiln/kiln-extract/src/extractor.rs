use std::ops::ControlFlow;

use kiln_ir::{
    GlobalVar, Kind, Module, Node, Op,
    arena::{Arena, NodeRef},
    visitor::IrVisitor,
};
use tracing::{debug, trace};

use crate::{
    ExtractError, ExtractResult, Target,
    dedup::{DedupIndex, KernelKey},
    normalize::{Normalizer, NormalizerRegistry},
    task::{ExtractedTask, TaskRegistry},
};

/// State shared by all functions walked during one extraction run.
#[derive(Default)]
pub struct ExtractCtx<'m> {
    pub index: DedupIndex<'m>,
    pub registry: TaskRegistry,
}

/// Extracts tuning tasks from the dispatches of a module.
///
/// Every call to [TaskExtractor::extract] is an independent run.
pub struct TaskExtractor<'m> {
    module: &'m Module,
    target: &'m Target,
    normalizer: &'m dyn Normalizer,
}

impl<'m> TaskExtractor<'m> {
    pub fn new(module: &'m Module, target: &'m Target, normalizer: &'m dyn Normalizer) -> Self {
        Self {
            module,
            target,
            normalizer,
        }
    }

    /// Select the normalizer by name.
    /// Fails without looking at the module when the name is not registered.
    pub fn from_registry(
        module: &'m Module,
        target: &'m Target,
        registry: &'m NormalizerRegistry,
        normalizer: &str,
    ) -> ExtractResult<Self> {
        let normalizer = registry.resolve(normalizer)?;
        Ok(Self::new(module, target, &**normalizer))
    }

    /// Walk all orchestration functions in module order.
    ///
    /// Tasks are returned in the order their kernel class was first dispatched to.
    pub fn extract(&self) -> ExtractResult<Vec<ExtractedTask>> {
        let mut ctx = ExtractCtx::default();

        for (global, func) in self.module.orchestration_funcs() {
            debug!(%global, "walking dispatches");

            let mut visitor = CallSiteVisitor {
                module: self.module,
                target: self.target,
                normalizer: self.normalizer,
                caller: global,
                ctx: &mut ctx,
            };
            if let ControlFlow::Break(error) = visitor.visit_function(func) {
                return Err(error);
            }
        }

        debug!(tasks = ctx.registry.len(), "extracted");

        Ok(ctx.registry.into_tasks())
    }
}

struct CallSiteVisitor<'c, 'm> {
    module: &'m Module,
    target: &'c Target,
    normalizer: &'c dyn Normalizer,
    caller: &'m GlobalVar,
    ctx: &'c mut ExtractCtx<'m>,
}

impl<'m> IrVisitor<'m> for CallSiteVisitor<'_, 'm> {
    type Break = ExtractError;

    fn visit_node(&mut self, _index: usize, node_ref: NodeRef<'m>) -> ControlFlow<ExtractError> {
        match node_ref.kind() {
            Kind::Call(Op::Dispatch, args) => match self.visit_dispatch(node_ref.arena(), args) {
                Ok(()) => ControlFlow::Continue(()),
                Err(error) => ControlFlow::Break(error),
            },
            // orchestration call arguments are never calls
            Kind::Call(..) => ControlFlow::Continue(()),
            _ => self.traverse_node(node_ref),
        }
    }
}

impl<'m> CallSiteVisitor<'_, 'm> {
    fn visit_dispatch(&mut self, arena: &'m Arena, args: &'m [Node]) -> ExtractResult<()> {
        let Some(callee) = args.first() else {
            return Err(ExtractError::MissingCallee {
                caller: self.caller.clone(),
            });
        };

        match arena.node_ref(*callee).kind() {
            Kind::Extern(name) => {
                trace!(caller = %self.caller, %name, "skipping extern dispatch");
                Ok(())
            }
            Kind::Global(callee) => self.dispatch_kernel(callee),
            _ => Err(ExtractError::InvalidCallee {
                caller: self.caller.clone(),
            }),
        }
    }

    fn dispatch_kernel(&mut self, callee: &'m GlobalVar) -> ExtractResult<()> {
        let kernel = self
            .module
            .lookup(callee)
            .ok_or_else(|| ExtractError::UnresolvedGlobal {
                caller: self.caller.clone(),
                callee: callee.clone(),
            })?;
        if !kernel.is_kernel() {
            return Err(ExtractError::NotAKernel {
                caller: self.caller.clone(),
                callee: callee.clone(),
            });
        }

        let key = KernelKey::new(kernel);

        if let Some(task_idx) = self.ctx.index.get(&key) {
            self.ctx.registry.bump_weight(task_idx);
            trace!(
                %callee,
                task = %self.ctx.registry.get(task_idx).name,
                "dispatch to known kernel"
            );
            return Ok(());
        }

        let module = self.normalizer.normalize(callee, kernel);
        let task = ExtractedTask::new(callee.name_hint().clone(), module, self.target.clone());
        let task_idx = self.ctx.registry.push(task);
        self.ctx.index.insert(key, task_idx);

        debug!(%callee, hash = key.structural_hash(), "new task");

        Ok(())
    }
}
