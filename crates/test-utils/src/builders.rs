#![allow(dead_code)]

use std::sync::Arc;

use opgraph::{Operation, OperationGroupRecord, OperationOptions, OperationRunner};

/// Builder for `Operation` to simplify graph setup in tests.
pub struct OperationBuilder {
    options: OperationOptions,
    dependencies: Vec<Arc<Operation>>,
}

impl OperationBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            options: OperationOptions::new(name),
            dependencies: Vec::new(),
        }
    }

    pub fn runner(mut self, runner: Arc<dyn OperationRunner>) -> Self {
        self.options.runner = Some(runner);
        self
    }

    pub fn group(mut self, group: &Arc<OperationGroupRecord>) -> Self {
        self.options.group = Some(Arc::clone(group));
        self
    }

    pub fn weight(mut self, weight: u64) -> Self {
        self.options.weight = weight;
        self
    }

    pub fn depends_on(mut self, dependency: &Arc<Operation>) -> Self {
        self.dependencies.push(Arc::clone(dependency));
        self
    }

    pub fn build(self) -> Arc<Operation> {
        let operation = Operation::with_options(self.options);
        for dependency in &self.dependencies {
            operation.add_dependency(dependency);
        }
        operation
    }
}
