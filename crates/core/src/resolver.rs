// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Dependency resolver for backup object groups.
//!
//! Derived from the group map at the start of every backup run: a forward
//! index of outstanding prerequisites per object, the inverse index of
//! dependents per prerequisite, and the queue of objects ready to
//! dispatch. Mutated only by the engine's control task.

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

use crate::object::BackupObjectGroup;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("circular dependency between object groups: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },
    #[error("object group depends on undefined group '{0}'")]
    UnknownGroup(String),
}

#[derive(Debug, Default)]
pub struct DepResolv {
    /// Object path -> prerequisite object paths still outstanding.
    obj_dep_map: HashMap<String, HashSet<String>>,
    /// Prerequisite object path -> dependent object paths it unblocks.
    dep_obj_map: HashMap<String, HashSet<String>>,
    /// Objects ready to dispatch.
    avail_q: VecDeque<String>,
}

impl DepResolv {
    pub fn build(groups: &IndexMap<String, BackupObjectGroup>) -> Result<Self, ResolveError> {
        // Collect the transitive closure of objects reachable through
        // `depends`, failing on any group that re-enters the recursion
        // path.
        fn dive(
            gid: &str,
            groups: &IndexMap<String, BackupObjectGroup>,
            obj_set: &mut HashSet<String>,
            path: &mut Vec<String>,
        ) -> Result<(), ResolveError> {
            if path.iter().any(|p| p == gid) {
                let mut chain = path.clone();
                chain.push(gid.to_string());
                return Err(ResolveError::CircularDependency { chain });
            }
            let og = groups
                .get(gid)
                .ok_or_else(|| ResolveError::UnknownGroup(gid.to_string()))?;
            path.push(gid.to_string());
            obj_set.extend(og.objects.iter().cloned());
            for dep in &og.depends {
                dive(dep, groups, obj_set, path)?;
            }
            path.pop();
            Ok(())
        }

        let mut ret = Self::default();

        for (gid, og) in groups {
            if og.depends.is_empty() {
                ret.avail_q.extend(og.objects.iter().cloned());
                continue;
            }

            let mut dep_objs = HashSet::new();
            let mut path = vec![gid.to_string()];
            for dep in &og.depends {
                dive(dep, groups, &mut dep_objs, &mut path)?;
            }

            for obj in &og.objects {
                ret.obj_dep_map
                    .entry(obj.clone())
                    .or_default()
                    .extend(dep_objs.iter().cloned());
            }
            for p in &dep_objs {
                ret.dep_obj_map
                    .entry(p.clone())
                    .or_default()
                    .extend(og.objects.iter().cloned());
            }
        }

        Ok(ret)
    }

    /// Next dispatchable object, if any.
    pub fn pop_avail(&mut self) -> Option<String> {
        self.avail_q.pop_front()
    }

    pub fn avail_is_empty(&self) -> bool {
        self.avail_q.is_empty()
    }

    /// True while objects with unmet prerequisites remain.
    pub fn has_pending(&self) -> bool {
        !self.obj_dep_map.is_empty()
    }

    /// All declared work dispatched and all prerequisites met.
    pub fn is_done(&self) -> bool {
        self.avail_q.is_empty() && self.obj_dep_map.is_empty()
    }

    /// Record completion of `obj`, moving any dependent whose prerequisite
    /// set drains to the ready queue.
    pub fn mark_fulfilled(&mut self, obj: &str) {
        let Some(deps) = self.dep_obj_map.remove(obj) else {
            return;
        };
        for dep in deps {
            let Some(outstanding) = self.obj_dep_map.get_mut(&dep) else {
                continue;
            };
            outstanding.remove(obj);
            if outstanding.is_empty() {
                self.obj_dep_map.remove(&dep);
                self.avail_q.push_back(dep);
            }
        }
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
