//! Workflow Compiler (spec §4.3): parses a rendered spec, validates its
//! shape, builds the task-group DAG, resolves per-task resources via
//! platform/pool overlays, and produces pod specs.

pub mod dag;
pub mod error;
pub mod podspec;
pub mod spec;
pub mod timeouts;
pub mod tokens;

pub use error::CompileError;
pub use spec::{GroupSpec, InputSpec, ResourceSpec, TaskSpec, TimeoutSpec, TopologyRequirement, WorkflowSpec};
pub use timeouts::{resolve_timeouts, ResolvedTimeouts, ServiceTimeoutDefaults};

use std::collections::BTreeMap;

use osmo_types::{Platform, Pool};
use serde_json::Value;

/// Resolves whether a cross-workflow input (`{prev_workflow_id}:{task_name}`)
/// points at a finished task, without this crate owning a durable-store
/// dependency (spec §4.3 step 4).
pub trait CrossWorkflowResolver {
    fn is_finished(&self, workflow_id: &str, task_name: &str) -> bool;
}

/// A resolver that treats every cross-workflow reference as already
/// resolved; useful for `--dry-run`/`--validation-only` submissions that
/// never touch the durable store (spec §9 Open Questions: admission modes).
pub struct AlwaysFinished;
impl CrossWorkflowResolver for AlwaysFinished {
    fn is_finished(&self, _workflow_id: &str, _task_name: &str) -> bool {
        true
    }
}

/// One compiled task: its spec plus the fully-resolved pod (spec §4.3 step 5).
#[derive(Debug, Clone)]
pub struct CompiledTask {
    pub spec: TaskSpec,
    pub resources_ref: String,
    pub platform: String,
    pub pod: Value,
}

#[derive(Debug, Clone)]
pub struct CompiledGroup {
    pub name: String,
    pub barrier: bool,
    pub inputs: Vec<InputSpec>,
    pub tasks: Vec<CompiledTask>,
}

#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    pub name: String,
    pub pool: String,
    pub groups: Vec<CompiledGroup>,
    pub timeouts: ResolvedTimeouts,
}

impl CompiledWorkflow {
    pub fn total_tasks(&self) -> usize {
        self.groups.iter().map(|g| g.tasks.len()).sum()
    }
}

/// Everything the compiler needs that isn't carried in the rendered spec
/// itself: the submission's target pool, its pod templates by name, and the
/// service-wide policy knobs (spec §4.3 steps 5-7).
pub struct CompileContext<'a> {
    pub pool: &'a Pool,
    pub pod_templates: &'a BTreeMap<String, Value>,
    pub service_timeouts: ServiceTimeoutDefaults,
    pub max_num_tasks: usize,
}

fn resolve_platform<'a>(resource: &ResourceSpec, pool: &'a Pool) -> Result<(&'a str, &'a Platform), CompileError> {
    let platform_name = resource.platform.as_deref().unwrap_or(&pool.default_platform);
    let platform = pool
        .platform(platform_name)
        .ok_or_else(|| CompileError::UnknownPlatform(platform_name.to_string(), pool.name.clone()))?;
    Ok((platform_name, platform))
}

/// Runs the full compilation pipeline (spec §4.3 steps 1-7) over a rendered
/// spec's `workflow:` block.
pub fn compile(
    rendered: &Value,
    ctx: &CompileContext<'_>,
    resolver: &dyn CrossWorkflowResolver,
) -> Result<CompiledWorkflow, CompileError> {
    // Steps 1-2: parse + normalize.
    let parsed = spec::parse_workflow_spec(rendered)?;

    // Step 3: name discipline.
    dag::validate_names(&parsed)?;

    // Step 4: DAG validation (intra-workflow); cross-workflow inputs checked separately below.
    dag::validate_dag(&parsed)?;
    for group in &parsed.groups {
        for task in &group.tasks {
            for input in &task.inputs {
                if let Some((workflow_id, task_name)) = input.cross_workflow_reference() {
                    if !resolver.is_finished(&workflow_id, &task_name) {
                        return Err(CompileError::UnresolvedCrossWorkflowInput(format!("{workflow_id}:{task_name}")));
                    }
                }
            }
        }
    }

    // Step 7: task limit (checked before the expensive per-task pod resolution).
    let total = dag::total_tasks(&parsed);
    if total > ctx.max_num_tasks {
        return Err(CompileError::TooManyTasks { actual: total, max: ctx.max_num_tasks });
    }

    let WorkflowSpec { name, pool: _requested_pool, resources, timeout, groups: parsed_groups } = parsed;

    // Step 5: resource resolution / pod construction.
    let mut groups = Vec::with_capacity(parsed_groups.len());
    for group in parsed_groups {
        let mut tasks = Vec::with_capacity(group.tasks.len());
        for task in group.tasks {
            let resource_spec = resources
                .get(&task.resources)
                .ok_or_else(|| CompileError::UnknownResourceSpec(task.resources.clone()))?;
            let (platform_name, platform) = resolve_platform(resource_spec, ctx.pool)?;
            let pod = podspec::build_task_pod(&task, resource_spec, ctx.pool, platform, ctx.pod_templates)?;
            tasks.push(CompiledTask {
                resources_ref: task.resources.clone(),
                platform: platform_name.to_string(),
                spec: task,
                pod,
            });
        }
        groups.push(CompiledGroup { name: group.name, barrier: group.barrier, inputs: group.inputs, tasks });
    }

    // Step 6: timeouts.
    let timeouts = resolve_timeouts(&timeout, ctx.pool, &ctx.service_timeouts)?;

    Ok(CompiledWorkflow { name, pool: ctx.pool.name.clone(), groups, timeouts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmo_types::{GpuQuota, Platform};
    use serde_json::json;

    fn pool() -> Pool {
        let mut platforms = BTreeMap::new();
        platforms.insert(
            "cpu".to_string(),
            Platform {
                name: "cpu".into(),
                labels: BTreeMap::new(),
                tolerations: vec![],
                pod_template: None,
                validations: vec![],
                default_variables: BTreeMap::new(),
            },
        );
        Pool {
            name: "default".into(),
            backend: "prod".into(),
            default_platform: "cpu".into(),
            platforms,
            common_pod_template: vec![],
            common_resource_validations: vec![],
            common_default_variables: BTreeMap::new(),
            gpu: GpuQuota { guarantee: -1, maximum: -1, weight: 1.0 },
            topology_keys: vec![],
            max_exec_timeout: None,
            default_exec_timeout: None,
            max_queue_timeout: None,
            default_queue_timeout: None,
            enable_maintenance: false,
        }
    }

    #[test]
    fn compiles_a_two_group_workflow_end_to_end() {
        let rendered = json!({
            "name": "nightly-build",
            "resources": {"default": {"cpu": 2, "memory": "4Gi", "storage": "1Gi", "gpu": 0}},
            "groups": [
                {"name": "fetch", "tasks": [{"name": "fetch-data", "image": "img:1"}]},
                {"name": "build", "inputs": [{"group": "fetch"}], "tasks": [{"name": "compile", "image": "img:1"}]},
            ],
        });
        let pod_templates = BTreeMap::new();
        let ctx = CompileContext {
            pool: &pool(),
            pod_templates: &pod_templates,
            service_timeouts: ServiceTimeoutDefaults::default(),
            max_num_tasks: 100,
        };
        let compiled = compile(&rendered, &ctx, &AlwaysFinished).unwrap();
        assert_eq!(compiled.name, "nightly-build");
        assert_eq!(compiled.total_tasks(), 2);
        assert_eq!(compiled.groups[1].inputs[0].group.as_deref(), Some("fetch"));
        assert_eq!(compiled.groups[0].tasks[0].platform, "cpu");
    }

    #[test]
    fn rejects_when_total_tasks_exceeds_limit() {
        let rendered = json!({
            "name": "w",
            "resources": {"default": {"cpu": 1, "memory": "1Gi", "storage": "1Gi", "gpu": 0}},
            "tasks": [{"name": "a", "image": "img"}, {"name": "b", "image": "img"}],
        });
        let pod_templates = BTreeMap::new();
        let ctx = CompileContext {
            pool: &pool(),
            pod_templates: &pod_templates,
            service_timeouts: ServiceTimeoutDefaults::default(),
            max_num_tasks: 1,
        };
        let err = compile(&rendered, &ctx, &AlwaysFinished).unwrap_err();
        assert!(matches!(err, CompileError::TooManyTasks { .. }));
    }

    #[test]
    fn rejects_unresolved_cross_workflow_input() {
        struct NeverFinished;
        impl CrossWorkflowResolver for NeverFinished {
            fn is_finished(&self, _workflow_id: &str, _task_name: &str) -> bool {
                false
            }
        }
        let rendered = json!({
            "name": "w",
            "resources": {"default": {"cpu": 1, "memory": "1Gi", "storage": "1Gi", "gpu": 0}},
            "groups": [{"name": "g", "tasks": [{"name": "t", "image": "img", "inputs": [{"task": "prev-1:upstream"}]}]}],
        });
        let pod_templates = BTreeMap::new();
        let ctx = CompileContext {
            pool: &pool(),
            pod_templates: &pod_templates,
            service_timeouts: ServiceTimeoutDefaults::default(),
            max_num_tasks: 100,
        };
        let err = compile(&rendered, &ctx, &NeverFinished).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedCrossWorkflowInput(_)));
    }
}
