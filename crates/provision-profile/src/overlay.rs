//! Flattening a profile with its ancestors.
//!
//! Ancestors are visited depth first, parents before children, so a profile
//! always overrides what it inherits. `.cfg` files merge key by key; any
//! other file is replaced wholesale by the most specific profile declaring it.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use indexmap::IndexMap;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use provision_core::error::{ProvisionError, ProvisionResult};
use provision_core::properties::{self, Properties};

use crate::builder::ProfileBuilder;
use crate::profile::{Profile, DELETED, PROPERTIES_SUFFIX};

enum Supplement {
    Data(Vec<u8>),
    Props(Properties),
}

/// Overlay profile of `profile`, looking parents up in `profiles`.
///
/// With an `environment`, a file `name#environment` replaces `name` in the
/// profile that declares both. An overlay profile is returned unchanged.
pub fn overlay(
    profile: &Profile,
    profiles: &BTreeMap<String, Profile>,
    environment: Option<&str>,
) -> ProvisionResult<Profile> {
    if profile.is_overlay() {
        return Ok(profile.clone());
    }

    check_parent_graph(profile, profiles)?;

    let mut inherited = Vec::new();
    let mut seen = HashSet::new();
    fill_parent_profiles(profile, profiles, &mut inherited, &mut seen)?;
    debug!(
        profile = profile.id(),
        chain = ?inherited.iter().map(|p| p.id()).collect::<Vec<_>>(),
        "computing overlay"
    );

    let mut aggregate: IndexMap<String, Supplement> = IndexMap::new();
    for ancestor in inherited {
        supplement(ancestor, environment, &mut aggregate)?;
    }

    let files = aggregate
        .into_iter()
        .map(|(name, entry)| {
            let bytes = match entry {
                Supplement::Data(data) => data,
                Supplement::Props(props) => properties::to_bytes(&props),
            };
            (name, bytes)
        })
        .collect();

    ProfileBuilder::new(profile.id())
        .set_file_configurations(files)
        .set_attributes(profile.attributes())
        .set_overlay(true)
        .build()
}

/// Fail on missing parents and on parent cycles before walking the graph
fn check_parent_graph(root: &Profile, profiles: &BTreeMap<String, Profile>) -> ProvisionResult<()> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([root]);

    let root_index = graph.add_node(root.id().to_string());
    nodes.insert(root.id().to_string(), root_index);

    while let Some(profile) = queue.pop_front() {
        let from = nodes[profile.id()];
        for parent_id in profile.parent_ids() {
            let to = match nodes.get(parent_id) {
                Some(index) => *index,
                None => {
                    let parent = required(profiles, parent_id)?;
                    let index = graph.add_node(parent_id.clone());
                    nodes.insert(parent_id.clone(), index);
                    queue.push_back(parent);
                    index
                }
            };
            graph.add_edge(from, to, ());
        }
    }

    if toposort(&graph, None).is_ok() {
        return Ok(());
    }

    let cycle = tarjan_scc(&graph)
        .into_iter()
        .find(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .unwrap_or_default();
    let mut names: Vec<&str> = cycle.iter().map(|index| graph[*index].as_str()).collect();
    names.sort_unstable();
    Err(ProvisionError::ProfileCycle(names.join(" -> ")))
}

fn required<'a>(profiles: &'a BTreeMap<String, Profile>, id: &str) -> ProvisionResult<&'a Profile> {
    profiles
        .get(id)
        .ok_or_else(|| ProvisionError::ProfileNotFound(id.to_string()))
}

fn fill_parent_profiles<'a>(
    profile: &'a Profile,
    profiles: &'a BTreeMap<String, Profile>,
    inherited: &mut Vec<&'a Profile>,
    seen: &mut HashSet<String>,
) -> ProvisionResult<()> {
    if seen.contains(profile.id()) {
        return Ok(());
    }
    for parent_id in profile.parent_ids() {
        let parent = required(profiles, parent_id)?;
        fill_parent_profiles(parent, profiles, inherited, seen)?;
    }
    seen.insert(profile.id().to_string());
    inherited.push(profile);
    Ok(())
}

fn supplement(
    profile: &Profile,
    environment: Option<&str>,
    aggregate: &mut IndexMap<String, Supplement>,
) -> ProvisionResult<()> {
    let files = profile.file_configurations();
    for (name, data) in files {
        // Environment variants are only read through their base name
        if name.contains('#') {
            continue;
        }
        let data = environment
            .and_then(|env| files.get(&format!("{}#{}", name, env)))
            .unwrap_or(data);

        if !name.ends_with(PROPERTIES_SUFFIX) {
            aggregate.insert(name.clone(), Supplement::Data(data.clone()));
            continue;
        }

        let child = properties::from_bytes(data)?;
        match aggregate.get_mut(name) {
            Some(Supplement::Props(current)) => merge(current, child),
            _ => {
                let mut fresh = Properties::new();
                merge(&mut fresh, child);
                aggregate.insert(name.clone(), Supplement::Props(fresh));
            }
        }
    }
    Ok(())
}

fn merge(current: &mut Properties, mut child: Properties) {
    if child.shift_remove(DELETED).is_some() {
        current.clear();
    }
    for (key, value) in child {
        if value == DELETED {
            current.shift_remove(&key);
        } else {
            current.insert(key, value);
        }
    }
}
