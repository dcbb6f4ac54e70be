//! The app: a set of stacks synthesized together in dependency order

use crate::error::{CloudError, Result};
use crate::stack::{Environment, Stack, StackDependency};
use crate::template::Template;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// A stack after synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedStack {
    pub name: String,
    pub environment: Environment,
    pub template: Template,
    pub dependencies: Vec<StackDependency>,
}

/// Synthesized stacks in deployment order (dependencies first)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloudAssembly {
    pub stacks: Vec<SynthesizedStack>,
}

impl CloudAssembly {
    pub fn stack(&self, name: &str) -> Option<&SynthesizedStack> {
        self.stacks.iter().find(|s| s.name == name)
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.stack(name).map(|s| &s.template)
    }

    pub fn stack_names(&self) -> Vec<&str> {
        self.stacks.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Container of declared stacks
#[derive(Debug, Default)]
pub struct App {
    stacks: Vec<Stack>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stack(&mut self, stack: Stack) -> Result<()> {
        if self.stack(stack.name()).is_some() {
            return Err(CloudError::DuplicateStack(stack.name().to_string()));
        }
        self.stacks.push(stack);
        Ok(())
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name() == name)
    }

    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.iter()
    }

    /// Stack names ordered so every stack follows its dependencies.
    ///
    /// Ties keep declaration order.
    pub fn deployment_order(&self) -> Result<Vec<&str>> {
        let index: HashMap<&str, usize> = self
            .stacks
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name(), i))
            .collect();

        let mut in_degree = vec![0usize; self.stacks.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.stacks.len()];
        for (i, stack) in self.stacks.iter().enumerate() {
            for dep in stack.dependencies() {
                let &j = index
                    .get(dep.stack.as_str())
                    .ok_or_else(|| CloudError::StackNotFound(dep.stack.clone()))?;
                in_degree[i] += 1;
                dependents[j].push(i);
            }
        }

        let mut ready: VecDeque<usize> = (0..self.stacks.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.stacks.len());
        while let Some(i) = ready.pop_front() {
            order.push(self.stacks[i].name());
            for &k in &dependents[i] {
                in_degree[k] -= 1;
                if in_degree[k] == 0 {
                    ready.push_back(k);
                }
            }
        }

        if order.len() != self.stacks.len() {
            let stuck: Vec<&str> = self
                .stacks
                .iter()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .map(|(_, s)| s.name())
                .collect();
            return Err(CloudError::DependencyCycle(stuck.join(" -> ")));
        }
        Ok(order)
    }

    /// Every stack `name` depends on, directly or transitively
    fn transitive_dependencies(&self, name: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = vec![name.to_string()];
        while let Some(current) = queue.pop() {
            if let Some(stack) = self.stack(&current) {
                for dep in stack.dependencies() {
                    if seen.insert(dep.stack.clone()) {
                        queue.push(dep.stack.clone());
                    }
                }
            }
        }
        seen
    }

    /// Check imports against exports across the whole app
    fn check_cross_stack_references(&self) -> Result<()> {
        let mut exporters: HashMap<&str, &str> = HashMap::new();
        for stack in &self.stacks {
            for export in stack.exports() {
                if exporters.insert(export, stack.name()).is_some() {
                    return Err(CloudError::DuplicateExport(export.to_string()));
                }
            }
        }

        for stack in &self.stacks {
            let deps = self.transitive_dependencies(stack.name());
            for (export, _) in stack.imports() {
                let producer =
                    exporters
                        .get(export)
                        .copied()
                        .ok_or_else(|| CloudError::UnknownExport {
                            consumer: stack.name().to_string(),
                            export: export.to_string(),
                        })?;
                if !deps.contains(producer) {
                    return Err(CloudError::MissingDependency {
                        consumer: stack.name().to_string(),
                        producer: producer.to_string(),
                        export: export.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Synthesize every stack
    pub fn synth(self) -> Result<CloudAssembly> {
        let all: Vec<String> = self.stacks.iter().map(|s| s.name().to_string()).collect();
        let names: Vec<&str> = all.iter().map(String::as_str).collect();
        self.synth_selected(&names, false)
    }

    /// Synthesize a subset of stacks.
    ///
    /// Without `exclusively`, dependencies of the selection are synthesized
    /// too. With it, a selected stack whose dependency is not selected is
    /// rejected.
    pub fn synth_selected(self, names: &[&str], exclusively: bool) -> Result<CloudAssembly> {
        for name in names {
            if self.stack(name).is_none() {
                return Err(CloudError::StackNotFound(name.to_string()));
            }
        }

        let order: Vec<String> = self
            .deployment_order()?
            .into_iter()
            .map(str::to_string)
            .collect();
        self.check_cross_stack_references()?;

        let mut selected: BTreeSet<String> = names.iter().map(|n| n.to_string()).collect();
        if exclusively {
            for name in names {
                if let Some(stack) = self.stack(name)
                    && let Some(dep) = stack
                        .dependencies()
                        .iter()
                        .find(|d| !selected.contains(&d.stack))
                {
                    return Err(CloudError::DependencyNotSelected {
                        stack: name.to_string(),
                        dependency: dep.stack.clone(),
                    });
                }
            }
        } else {
            for name in names {
                selected.extend(self.transitive_dependencies(name));
            }
        }

        let mut assembly = CloudAssembly::default();
        for name in order.iter().filter(|n| selected.contains(*n)) {
            let Some(stack) = self.stack(name) else {
                continue;
            };
            let template = stack.synth()?;
            tracing::info!(stack = %name, environment = %stack.environment(), "Synthesized");
            assembly.stacks.push(SynthesizedStack {
                name: name.clone(),
                environment: stack.environment().clone(),
                template,
                dependencies: stack.dependencies().to_vec(),
            });
        }
        Ok(assembly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Output;

    fn producer() -> (Stack, crate::stack::ExportRef) {
        let mut base = Stack::new("Base", Environment::default());
        let sg = base
            .add_resource(base.new_resource(&["sg"], "AWS::EC2::SecurityGroup"))
            .unwrap();
        let export = base
            .add_output("sgId", Output::new(sg).with_export_name("sgId"))
            .unwrap()
            .unwrap();
        (base, export)
    }

    fn consumer(import: impl FnOnce(&mut Stack) -> crate::token::Reference) -> Stack {
        let mut rules = Stack::new("Rules", Environment::default());
        let group = import(&mut rules);
        let rule = rules
            .new_resource(&["rule"], "AWS::EC2::SecurityGroupIngress")
            .with_property("GroupId", group);
        rules.add_resource(rule).unwrap();
        rules
    }

    #[test]
    fn test_order_follows_dependencies() {
        let (base, export) = producer();
        let rules = consumer(|s| s.import_value(&export));

        let mut app = App::new();
        app.add_stack(rules).unwrap();
        app.add_stack(base).unwrap();
        assert_eq!(app.deployment_order().unwrap(), vec!["Base", "Rules"]);

        let assembly = app.synth().unwrap();
        assert_eq!(assembly.stack_names(), vec!["Base", "Rules"]);
        assert_eq!(
            assembly.template("Rules").unwrap().imports(),
            assembly
                .template("Base")
                .unwrap()
                .exports()
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_import_by_name_without_dependency_is_rejected() {
        let (base, _) = producer();
        let rules = consumer(|s| s.import_by_name("sgId"));

        let mut app = App::new();
        app.add_stack(base).unwrap();
        app.add_stack(rules).unwrap();
        assert!(matches!(
            app.synth(),
            Err(CloudError::MissingDependency { consumer, producer, .. })
                if consumer == "Rules" && producer == "Base"
        ));
    }

    #[test]
    fn test_import_by_name_with_explicit_dependency() {
        let (base, _) = producer();
        let mut rules = consumer(|s| s.import_by_name("sgId"));
        rules.add_dependency("Base", "sg rules depends on base stack");

        let mut app = App::new();
        app.add_stack(base).unwrap();
        app.add_stack(rules).unwrap();
        assert!(app.synth().is_ok());
    }

    #[test]
    fn test_unknown_export() {
        let rules = consumer(|s| s.import_by_name("nothing"));
        let mut app = App::new();
        app.add_stack(rules).unwrap();
        assert!(matches!(app.synth(), Err(CloudError::UnknownExport { .. })));
    }

    #[test]
    fn test_cycle_detected() {
        let mut a = Stack::new("A", Environment::default());
        let mut b = Stack::new("B", Environment::default());
        a.add_dependency("B", "test");
        b.add_dependency("A", "test");
        let mut app = App::new();
        app.add_stack(a).unwrap();
        app.add_stack(b).unwrap();
        assert!(matches!(
            app.deployment_order(),
            Err(CloudError::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_exclusive_selection_requires_dependencies() {
        let (base, export) = producer();
        let rules = consumer(|s| s.import_value(&export));
        let mut app = App::new();
        app.add_stack(base).unwrap();
        app.add_stack(rules).unwrap();
        assert!(matches!(
            app.synth_selected(&["Rules"], true),
            Err(CloudError::DependencyNotSelected { stack, dependency })
                if stack == "Rules" && dependency == "Base"
        ));
    }

    #[test]
    fn test_selection_pulls_in_dependencies() {
        let (base, export) = producer();
        let rules = consumer(|s| s.import_value(&export));
        let mut app = App::new();
        app.add_stack(base).unwrap();
        app.add_stack(rules).unwrap();
        let assembly = app.synth_selected(&["Rules"], false).unwrap();
        assert_eq!(assembly.stack_names(), vec!["Base", "Rules"]);
    }

    #[test]
    fn test_duplicate_stack_rejected() {
        let mut app = App::new();
        app.add_stack(Stack::new("A", Environment::default())).unwrap();
        assert!(matches!(
            app.add_stack(Stack::new("A", Environment::default())),
            Err(CloudError::DuplicateStack(_))
        ));
    }
}
