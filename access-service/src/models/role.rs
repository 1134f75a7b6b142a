//! Built-in roles: ordering, descriptions and picker changes.

use super::grant::{
    is_namespaced, Grant, NewGrant, ADMIN_PRIVILEGE, ORG_RESOURCE, REMOVE_PRIVILEGE,
    SUPER_PRIVILEGE, VIEW_PRIVILEGE,
};
use serde::Serialize;
use std::cmp::Ordering;

/// Most to least powerful. Privileges not listed sort after these.
pub const SEVERITY: [&str; 4] = [SUPER_PRIVILEGE, ADMIN_PRIVILEGE, "edit", VIEW_PRIVILEGE];

/// Roles offered on a cluster or namespace.
pub const CLUSTER_ROLES: [&str; 7] = [
    SUPER_PRIVILEGE,
    ADMIN_PRIVILEGE,
    "edit",
    VIEW_PRIVILEGE,
    "logs",
    "exec",
    "port-forward",
];

/// Roles offered on the organization resource.
pub const ORG_ROLES: [&str; 2] = [ADMIN_PRIVILEGE, VIEW_PRIVILEGE];

pub fn severity(privilege: &str) -> usize {
    SEVERITY
        .iter()
        .position(|p| *p == privilege)
        .unwrap_or(SEVERITY.len())
}

pub fn description(privilege: &str) -> Option<&'static str> {
    match privilege {
        "cluster-admin" => Some("Super-user access to perform any action on any resource"),
        "admin" => Some("Read and write access to all resources"),
        "edit" => Some("Read and write access to most resources, but not roles"),
        "view" => Some("Read-only access to see most resources"),
        "logs" => Some("Read and stream logs"),
        "exec" => Some("Shell to a running container"),
        "port-forward" => Some("Use port-forwarding to access applications"),
        _ => None,
    }
}

/// Severity first, then roles with a description, then by name.
pub fn compare(a: &str, b: &str) -> Ordering {
    severity(a)
        .cmp(&severity(b))
        .then_with(|| description(b).is_some().cmp(&description(a).is_some()))
        .then_with(|| a.cmp(b))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleOption {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
}

/// Roles that may be granted on `resource`, sorted for display.
/// `cluster-admin` is never offered on a namespace.
pub fn assignable(resource: &str) -> Vec<RoleOption> {
    let candidates: &[&str] = if resource == ORG_RESOURCE {
        &ORG_ROLES
    } else {
        &CLUSTER_ROLES
    };

    let mut roles: Vec<&str> = candidates
        .iter()
        .copied()
        .filter(|r| !(is_namespaced(resource) && *r == SUPER_PRIVILEGE))
        .collect();
    roles.sort_by(|a, b| compare(a, b));

    roles
        .into_iter()
        .map(|name| RoleOption {
            name: name.to_string(),
            description: description(name),
        })
        .collect()
}

/// What choosing `selected` in a role picker means for an existing grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleChange {
    Unchanged,
    /// Roles are immutable on a grant, so a change is remove-then-add.
    Replace { remove: NewGrant, add: NewGrant },
    Remove(NewGrant),
}

impl RoleChange {
    pub fn plan(current: &Grant, selected: &str) -> Self {
        let existing = NewGrant::new(
            current.subject,
            current.resource.clone(),
            current.privilege.clone(),
        );
        if selected == REMOVE_PRIVILEGE {
            RoleChange::Remove(existing)
        } else if selected == current.privilege {
            RoleChange::Unchanged
        } else {
            RoleChange::Replace {
                add: NewGrant::new(current.subject, current.resource.clone(), selected),
                remove: existing,
            }
        }
    }

    /// `(to_add, to_remove)` for a batch mutation.
    pub fn into_batch(self) -> (Vec<NewGrant>, Vec<NewGrant>) {
        match self {
            RoleChange::Unchanged => (vec![], vec![]),
            RoleChange::Replace { remove, add } => (vec![add], vec![remove]),
            RoleChange::Remove(id) => (vec![], vec![id]),
        }
    }
}
