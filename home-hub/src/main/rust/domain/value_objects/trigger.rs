use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::DeviceId;
use crate::domain::errors::{DomainError, Result};

/// Follow-on state change applied to another device, written as `kind:id[:invert]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    target: DeviceId,
    invert: bool,
}

impl Trigger {
    pub fn new(target: DeviceId, invert: bool) -> Self {
        Self { target, invert }
    }

    pub fn target(&self) -> &DeviceId {
        &self.target
    }

    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    /// Value the target should take when the source switches to `value`
    pub fn effective_value(&self, value: bool) -> bool {
        if self.invert {
            !value
        } else {
            value
        }
    }

    fn parse_invert(raw: &str, descriptor: &str) -> Result<bool> {
        match raw {
            "1" | "true" => Ok(true),
            "0" | "false" | "" => Ok(false),
            _ => Err(DomainError::InvalidTrigger(descriptor.to_string())),
        }
    }
}

impl FromStr for Trigger {
    type Err = DomainError;

    fn from_str(descriptor: &str) -> Result<Self> {
        let mut parts = descriptor.split(':');
        let kind = parts.next().unwrap_or_default();
        let id = parts
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DomainError::InvalidTrigger(descriptor.to_string()))?;
        let invert = Self::parse_invert(parts.next().unwrap_or_default(), descriptor)?;

        if parts.next().is_some() {
            return Err(DomainError::InvalidTrigger(descriptor.to_string()));
        }

        Ok(Self {
            target: DeviceId::new(kind.parse()?, id),
            invert,
        })
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target, self.invert)
    }
}

/// Find one cycle in the trigger graph, returned as the path that closes it
pub fn find_trigger_cycle(graph: &BTreeMap<DeviceId, Vec<Trigger>>) -> Option<Vec<DeviceId>> {
    fn visit(
        node: &DeviceId,
        graph: &BTreeMap<DeviceId, Vec<Trigger>>,
        path: &mut Vec<DeviceId>,
        done: &mut BTreeSet<DeviceId>,
    ) -> Option<Vec<DeviceId>> {
        if let Some(pos) = path.iter().position(|seen| seen == node) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(node.clone());
            return Some(cycle);
        }
        if done.contains(node) {
            return None;
        }

        path.push(node.clone());
        for trigger in graph.get(node).map(Vec::as_slice).unwrap_or_default() {
            if let Some(cycle) = visit(trigger.target(), graph, path, done) {
                return Some(cycle);
            }
        }
        path.pop();
        done.insert(node.clone());
        None
    }

    let mut done = BTreeSet::new();
    graph
        .keys()
        .find_map(|start| visit(start, graph, &mut Vec::new(), &mut done))
}
