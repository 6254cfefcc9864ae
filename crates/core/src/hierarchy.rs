use std::collections::HashMap;

use serde::Serialize;

use crate::types::{Role, TeamMember};

/// Manager name that always marks a top-level member.
pub const ADMIN_MANAGER: &str = "Admin";

/// Member in the reporting forest together with everyone reporting to them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamNode {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub reports: Vec<TeamNode>,
}

impl TeamNode {
    /// Depth-first search for a member by name inside this subtree.
    pub fn find(&self, name: &str) -> Option<&TeamNode> {
        if self.name.trim() == name.trim() {
            return Some(self);
        }
        self.reports.iter().find_map(|child| child.find(name))
    }

    /// Names of every member in this subtree, the node itself included.
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![self.name.as_str()];
        for child in &self.reports {
            names.extend(child.names());
        }
        names
    }

    pub fn size(&self) -> usize {
        1 + self.reports.iter().map(TeamNode::size).sum::<usize>()
    }
}

/// Searches a forest for the subtree rooted at `name`.
pub fn find_subtree<'a>(forest: &'a [TeamNode], name: &str) -> Option<&'a TeamNode> {
    forest.iter().find_map(|root| root.find(name))
}

/// Builds the reporting forest shown on team views: active internal staff only.
pub fn team_tree(members: &[TeamMember]) -> Vec<TeamNode> {
    let staff: Vec<TeamMember> = members
        .iter()
        .filter(|member| member.active && member.role.is_internal())
        .cloned()
        .collect();
    build_team_tree(&staff)
}

/// Groups a flat member list into manager -> report chains.
///
/// A member is a root when its manager is missing or blank, is
/// [`ADMIN_MANAGER`], or names nobody in `members`. Siblings are ordered by
/// name, then id. When several members share a name the first in that order
/// owns it. Members stuck in a reporting cycle are promoted to roots.
pub fn build_team_tree(members: &[TeamMember]) -> Vec<TeamNode> {
    let mut sorted: Vec<&TeamMember> = members.iter().collect();
    sorted.sort_by(|a, b| {
        a.name
            .trim()
            .cmp(b.name.trim())
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut owners: HashMap<&str, usize> = HashMap::new();
    for (idx, member) in sorted.iter().enumerate() {
        owners.entry(member.name.trim()).or_insert(idx);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); sorted.len()];
    let mut roots = Vec::new();
    for (idx, member) in sorted.iter().enumerate() {
        match manager_index(member, &owners) {
            Some(parent) if parent != idx => children[parent].push(idx),
            _ => roots.push(idx),
        }
    }

    let mut visited = vec![false; sorted.len()];
    let mut forest: Vec<TeamNode> = roots
        .into_iter()
        .map(|idx| build_node(idx, &sorted, &children, &mut visited))
        .collect();

    while let Some(idx) = visited.iter().position(|seen| !seen) {
        forest.push(build_node(idx, &sorted, &children, &mut visited));
    }

    forest.sort_by(|a, b| a.name.trim().cmp(b.name.trim()).then_with(|| a.id.cmp(&b.id)));
    forest
}

fn manager_index(member: &TeamMember, owners: &HashMap<&str, usize>) -> Option<usize> {
    let manager = member.reporting_manager.as_deref()?.trim();
    if manager.is_empty() || manager == ADMIN_MANAGER {
        return None;
    }
    owners.get(manager).copied()
}

fn build_node(
    idx: usize,
    sorted: &[&TeamMember],
    children: &[Vec<usize>],
    visited: &mut [bool],
) -> TeamNode {
    visited[idx] = true;
    let member = sorted[idx];
    let mut reports = Vec::with_capacity(children[idx].len());
    for &child in &children[idx] {
        if !visited[child] {
            reports.push(build_node(child, sorted, children, visited));
        }
    }
    TeamNode {
        id: member.id.clone(),
        name: member.name.clone(),
        role: member.role,
        reports,
    }
}
