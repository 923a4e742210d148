//! Topology tree construction (spec §4.5.1): builds a PodGroup's top-level
//! topology constraint and nested subgroup tree from each task's
//! `topology_requirements`.

use std::collections::BTreeMap;

use osmo_compiler::TopologyRequirement;
use osmo_types::TopologyKey;

use crate::error::SchedulerError;

/// One task as input to the topology builder: its name and its
/// pool-order-sorted topology requirements (spec §4.5.1 step 3).
#[derive(Debug, Clone)]
pub struct TopologyTask<'a> {
    pub task_name: &'a str,
    pub requirements: &'a [TopologyRequirement],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyConstraint {
    pub topology: String,
    pub required_topology_level: Option<String>,
    pub preferred_topology_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubGroup {
    pub name: String,
    pub min_member: usize,
    pub constraint: TopologyConstraint,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TopologyPlan {
    /// The PodGroup's own top-level constraint, if any task carried topology
    /// requirements at all (spec §4.5.1 step 5).
    pub top_level: Option<TopologyConstraint>,
    /// Subgroups in deterministic, name-sorted order (spec §4.5.1: "subgroups
    /// are sorted by name").
    pub subgroups: Vec<SubGroup>,
    /// `task_name -> subgroup path`, the `kai.scheduler/subgroup-name` label
    /// value to stamp on each leaf pod (spec §4.5.1 step 6).
    pub task_subgroup: BTreeMap<String, String>,
}

struct TreeNode {
    /// Index into the pool's `topology_keys` this node represents.
    level_index: usize,
    required: Option<bool>,
    children: BTreeMap<String, TreeNode>,
    /// Tasks landing exactly at this node (i.e. this was their deepest level).
    leaf_tasks: Vec<String>,
}

impl TreeNode {
    fn new(level_index: usize) -> Self {
        Self { level_index, required: None, children: BTreeMap::new(), leaf_tasks: Vec::new() }
    }

    fn task_count(&self) -> usize {
        self.leaf_tasks.len() + self.children.values().map(TreeNode::task_count).sum::<usize>()
    }
}

fn sorted_requirements(
    task: &TopologyTask<'_>,
    key_order: &BTreeMap<String, usize>,
) -> Vec<TopologyRequirement> {
    let mut reqs = task.requirements.to_vec();
    reqs.sort_by_key(|r| key_order.get(&r.key).copied().unwrap_or(usize::MAX));
    reqs
}

/// Builds the topology plan for one group's tasks (spec §4.5.1). `pool_name`
/// is spliced into each constraint's `topology` field (the pool-scoped
/// topology name the scheduler CRD is registered under).
pub fn build_topology_plan(
    group_name: &str,
    tasks: &[TopologyTask<'_>],
    topology_keys: &[TopologyKey],
    pool_name: &str,
) -> Result<TopologyPlan, SchedulerError> {
    // Step 1: uniform key set across all tasks (or all omit topology).
    let key_sets: Vec<Vec<&str>> = tasks
        .iter()
        .map(|t| {
            let mut keys: Vec<&str> = t.requirements.iter().map(|r| r.key.as_str()).collect();
            keys.sort();
            keys
        })
        .collect();
    if let Some(first) = key_sets.first() {
        if key_sets.iter().any(|k| k != first) {
            return Err(SchedulerError::NonUniformTopologyKeys(group_name.to_string()));
        }
    }
    if key_sets.iter().all(Vec::is_empty) {
        return Ok(TopologyPlan::default());
    }

    // Step 2: keys must exist in the pool.
    let key_order: BTreeMap<String, usize> = topology_keys.iter().enumerate().map(|(i, k)| (k.key.clone(), i)).collect();
    for task in tasks {
        for req in task.requirements {
            if !key_order.contains_key(&req.key) {
                return Err(SchedulerError::UnknownTopologyKey(req.key.clone(), pool_name.to_string()));
            }
        }
    }

    // Steps 3-4: sort each task's requirements, then walk the tree inserting
    // a node per `group` value at each level, keyed by the concatenated path.
    let mut root = TreeNode::new(usize::MAX);
    for task in tasks {
        let sorted = sorted_requirements(task, &key_order);
        let mut node = &mut root;
        let mut path_parts: Vec<&str> = Vec::new();
        for req in &sorted {
            path_parts.push(&req.group);
            let level_index = key_order[&req.key];
            let child = node.children.entry(req.group.clone()).or_insert_with(|| TreeNode::new(level_index));
            match (child.required, req.required) {
                (None, r) => child.required = Some(r),
                (Some(existing), r) if existing == r => {}
                _ => return Err(SchedulerError::MixedRequiredness(path_parts.join("-"))),
            }
            node = child;
        }
        node.leaf_tasks.push(task.task_name.to_string());
    }

    // Step 5: top-level promotion -- while there's exactly one child, fold
    // its level into the PodGroup's own constraint and descend.
    let mut top_level = None;
    let mut current = &root;
    let mut current_path: Vec<String> = Vec::new();
    loop {
        if current.children.len() != 1 {
            break;
        }
        let (group_value, child) = current.children.iter().next().unwrap();
        let level = &topology_keys[child.level_index];
        top_level = Some(TopologyConstraint {
            topology: pool_name.to_string(),
            required_topology_level: child.required.unwrap_or(true).then(|| level.label.clone()),
            preferred_topology_level: (!child.required.unwrap_or(true)).then(|| level.label.clone()),
        });
        current_path.push(group_value.clone());
        current = child;
    }

    // Step 6: every remaining descendant becomes its own subgroup.
    let mut plan = TopologyPlan { top_level, subgroups: Vec::new(), task_subgroup: BTreeMap::new() };
    for (group_value, child) in &current.children {
        emit_subgroups(child, &current_path, group_value, None, topology_keys, pool_name, &mut plan);
    }
    plan.subgroups.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(plan)
}

#[allow(clippy::too_many_arguments)]
fn emit_subgroups(
    node: &TreeNode,
    parent_path: &[String],
    group_value: &str,
    parent_name: Option<&str>,
    topology_keys: &[TopologyKey],
    pool_name: &str,
    plan: &mut TopologyPlan,
) {
    let mut path = parent_path.to_vec();
    path.push(group_value.to_string());
    let name = path.join("-");

    let level = &topology_keys[node.level_index];
    let constraint = TopologyConstraint {
        topology: pool_name.to_string(),
        required_topology_level: node.required.unwrap_or(true).then(|| level.label.clone()),
        preferred_topology_level: (!node.required.unwrap_or(true)).then(|| level.label.clone()),
    };
    plan.subgroups.push(SubGroup {
        name: name.clone(),
        min_member: node.task_count(),
        constraint,
        parent: parent_name.map(str::to_string),
    });

    for task_name in &node.leaf_tasks {
        plan.task_subgroup.insert(task_name.clone(), name.clone());
    }
    for (child_value, child) in &node.children {
        emit_subgroups(child, &path, child_value, Some(&name), topology_keys, pool_name, plan);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<TopologyKey> {
        vec![
            TopologyKey { key: "zone".into(), label: "topology.kubernetes.io/zone".into() },
            TopologyKey { key: "rack".into(), label: "topology.kubernetes.io/rack".into() },
        ]
    }

    fn req(key: &str, group: &str, required: bool) -> TopologyRequirement {
        TopologyRequirement { key: key.to_string(), group: group.to_string(), required }
    }

    /// Scenario 5 (spec §8): 4 tasks all with `zone=z, rack=r` -> top-level
    /// `requiredTopologyLevel=rack`, no subgroups.
    #[test]
    fn uniform_requirements_promote_fully_with_no_subgroups() {
        let reqs = vec![req("zone", "z", true), req("rack", "r", true)];
        let tasks = vec![
            TopologyTask { task_name: "t0", requirements: &reqs },
            TopologyTask { task_name: "t1", requirements: &reqs },
            TopologyTask { task_name: "t2", requirements: &reqs },
            TopologyTask { task_name: "t3", requirements: &reqs },
        ];
        let plan = build_topology_plan("g", &tasks, &keys(), "pool-a").unwrap();
        assert_eq!(plan.top_level.unwrap().required_topology_level.as_deref(), Some("topology.kubernetes.io/rack"));
        assert!(plan.subgroups.is_empty());
    }

    /// Scenario 6 (spec §8): 2 tasks `zone=z,rack=r1`, 2 tasks `zone=z,rack=r2`
    /// -> top-level `zone=z`, two subgroups `z-r1`, `z-r2` sorted, minMember=2 each.
    #[test]
    fn branching_requirements_promote_zone_then_emit_two_subgroups() {
        let reqs_r1 = vec![req("zone", "z", true), req("rack", "r1", true)];
        let reqs_r2 = vec![req("zone", "z", true), req("rack", "r2", true)];
        let tasks = vec![
            TopologyTask { task_name: "a1", requirements: &reqs_r1 },
            TopologyTask { task_name: "a2", requirements: &reqs_r1 },
            TopologyTask { task_name: "b1", requirements: &reqs_r2 },
            TopologyTask { task_name: "b2", requirements: &reqs_r2 },
        ];
        let plan = build_topology_plan("g", &tasks, &keys(), "pool-a").unwrap();
        assert_eq!(plan.top_level.unwrap().required_topology_level.as_deref(), Some("topology.kubernetes.io/zone"));
        assert_eq!(plan.subgroups.len(), 2);
        assert_eq!(plan.subgroups[0].name, "z-r1");
        assert_eq!(plan.subgroups[1].name, "z-r2");
        assert_eq!(plan.subgroups[0].min_member, 2);
        assert_eq!(plan.subgroups[1].min_member, 2);
        assert_eq!(plan.task_subgroup["a1"], "z-r1");
        assert_eq!(plan.task_subgroup["b2"], "z-r2");
    }

    #[test]
    fn rejects_non_uniform_key_sets() {
        let reqs_full = vec![req("zone", "z", true)];
        let reqs_empty: Vec<TopologyRequirement> = vec![];
        let tasks = vec![
            TopologyTask { task_name: "a", requirements: &reqs_full },
            TopologyTask { task_name: "b", requirements: &reqs_empty },
        ];
        let err = build_topology_plan("g", &tasks, &keys(), "pool-a").unwrap_err();
        assert!(matches!(err, SchedulerError::NonUniformTopologyKeys(_)));
    }

    #[test]
    fn rejects_unknown_topology_key() {
        let reqs = vec![req("continent", "na", true)];
        let tasks = vec![TopologyTask { task_name: "a", requirements: &reqs }];
        let err = build_topology_plan("g", &tasks, &keys(), "pool-a").unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownTopologyKey(_, _)));
    }

    #[test]
    fn rejects_mixed_requiredness_on_same_node() {
        let reqs_required = vec![req("zone", "z", true)];
        let reqs_preferred = vec![req("zone", "z", false)];
        let tasks = vec![
            TopologyTask { task_name: "a", requirements: &reqs_required },
            TopologyTask { task_name: "b", requirements: &reqs_preferred },
        ];
        let err = build_topology_plan("g", &tasks, &keys(), "pool-a").unwrap_err();
        assert!(matches!(err, SchedulerError::MixedRequiredness(_)));
    }

    #[test]
    fn no_topology_at_all_yields_empty_plan() {
        let reqs: Vec<TopologyRequirement> = vec![];
        let tasks = vec![TopologyTask { task_name: "a", requirements: &reqs }];
        let plan = build_topology_plan("g", &tasks, &keys(), "pool-a").unwrap();
        assert!(plan.top_level.is_none());
        assert!(plan.subgroups.is_empty());
    }
}
