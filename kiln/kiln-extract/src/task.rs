use std::sync::Arc;

use arcstr::ArcStr;
use kiln_ir::Module;
use serde::Serialize;
use thin_vec::{ThinVec, thin_vec};

use crate::Target;

/// A unit of tuning work: one class of structurally equal kernels.
#[derive(Clone, Debug)]
pub struct ExtractedTask {
    /// The name of the first kernel of the class that was dispatched to
    pub name: ArcStr,
    /// The normalized kernel
    pub module: Arc<Module>,
    pub target: Target,
    /// Modules dispatched to by this task. Always `[module]` for now.
    pub dispatched: ThinVec<Arc<Module>>,
    /// The number of dispatch call sites reaching the kernel class
    pub weight: usize,
}

impl ExtractedTask {
    pub fn new(name: ArcStr, module: Module, target: Target) -> Self {
        let module = Arc::new(module);
        Self {
            name,
            dispatched: thin_vec![module.clone()],
            module,
            target,
            weight: 1,
        }
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            name: self.name.clone(),
            weight: self.weight,
            hash: format!("{:016x}", self.module.structural_hash()),
        }
    }
}

/// The comparable part of a task.
///
/// Two runs over the same module yield equal summaries in equal order.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct TaskSummary {
    pub name: ArcStr,
    pub weight: usize,
    /// Structural hash of the normalized module, in hex
    pub hash: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskIdx(usize);

/// Tasks in the order they were first seen.
#[derive(Default, Debug)]
pub struct TaskRegistry {
    tasks: Vec<ExtractedTask>,
}

impl TaskRegistry {
    pub fn push(&mut self, task: ExtractedTask) -> TaskIdx {
        let idx = TaskIdx(self.tasks.len());
        self.tasks.push(task);
        idx
    }

    pub fn bump_weight(&mut self, idx: TaskIdx) {
        self.tasks[idx.0].weight += 1;
    }

    pub fn get(&self, idx: TaskIdx) -> &ExtractedTask {
        &self.tasks[idx.0]
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn into_tasks(self) -> Vec<ExtractedTask> {
        self.tasks
    }
}
