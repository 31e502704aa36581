//! Reconciliation planning between a client's local catalog and the server's
//! resource list.

use std::collections::HashSet;

/// Which catalog table a local resource lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Binary,
    Card,
    Credentials,
}

/// A local resource id tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalResource {
    pub id: String,
    pub kind: ResourceKind,
}

/// The result of comparing local and remote resource-id sets.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// Remote ids with no local counterpart: fetch these.
    pub to_download: Vec<String>,
    /// Local entries the server no longer has: delete these locally.
    pub to_delete: Vec<LocalResource>,
}

impl SyncPlan {
    pub fn is_synced(&self) -> bool {
        self.to_download.is_empty() && self.to_delete.is_empty()
    }
}

/// Compute a sync plan from the tagged local set and the remote id set.
pub fn compute_sync_plan(local: &[LocalResource], remote: &[String]) -> SyncPlan {
    let local_ids: HashSet<&str> = local.iter().map(|r| r.id.as_str()).collect();
    let remote_ids: HashSet<&str> = remote.iter().map(|s| s.as_str()).collect();

    let to_download = remote
        .iter()
        .filter(|id| !local_ids.contains(id.as_str()))
        .cloned()
        .collect();

    let to_delete = local
        .iter()
        .filter(|r| !remote_ids.contains(r.id.as_str()))
        .cloned()
        .collect();

    SyncPlan {
        to_download,
        to_delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(id: &str, kind: ResourceKind) -> LocalResource {
        LocalResource {
            id: id.to_string(),
            kind,
        }
    }

    #[test]
    fn test_already_synced() {
        let local_set = vec![
            local("a", ResourceKind::Binary),
            local("b", ResourceKind::Card),
        ];
        let remote = vec!["a".to_string(), "b".to_string()];

        let plan = compute_sync_plan(&local_set, &remote);
        assert!(plan.is_synced());
    }

    #[test]
    fn test_download_and_delete() {
        let local_set = vec![
            local("a", ResourceKind::Binary),
            local("stale", ResourceKind::Credentials),
        ];
        let remote = vec!["a".to_string(), "new".to_string()];

        let plan = compute_sync_plan(&local_set, &remote);
        assert_eq!(plan.to_download, vec!["new".to_string()]);
        assert_eq!(plan.to_delete, vec![local("stale", ResourceKind::Credentials)]);
    }

    #[test]
    fn test_fresh_client_downloads_everything() {
        let remote = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let plan = compute_sync_plan(&[], &remote);
        assert_eq!(plan.to_download.len(), 3);
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn test_wiped_server_deletes_everything() {
        let local_set = vec![
            local("a", ResourceKind::Binary),
            local("b", ResourceKind::Card),
            local("c", ResourceKind::Credentials),
        ];
        let plan = compute_sync_plan(&local_set, &[]);
        assert!(plan.to_download.is_empty());
        assert_eq!(plan.to_delete.len(), 3);
    }
}
