//! Commit assembly: pure projections from a request and its diff into the
//! commit payload and correlation context.

use crate::domain::{ChangedFile, CommitContext, CommitRequest, FileChange};

/// Derive the commit context for a request.
///
/// Total and deterministic: identical requests yield identical contexts.
pub fn assemble(request: &CommitRequest) -> CommitContext {
    CommitContext::from(request)
}

/// Rename diff output into repository file changes.
pub fn to_file_changes(changed: Vec<ChangedFile>) -> Vec<FileChange> {
    changed
        .into_iter()
        .map(|ChangedFile { path, content }| FileChange { path, content })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildInfo, CommitInfo, RepositoryInfo};

    fn request() -> CommitRequest {
        CommitRequest {
            commit: CommitInfo {
                id: "c1".into(),
                message: "fix bug".into(),
            },
            build: BuildInfo {
                id: "b2".into(),
                action_step_id: "a1".into(),
                resource_id: "r1".into(),
                previous_build_id: Some("b1".into()),
            },
            repository: RepositoryInfo {
                owner: "acme".into(),
                name: "svc".into(),
                installation_id: "inst1".into(),
            },
        }
    }

    #[test]
    fn context_projects_request_fields() {
        let ctx = assemble(&request());
        assert_eq!(ctx.owner, "acme");
        assert_eq!(ctx.repo, "svc");
        assert_eq!(ctx.commit_id, "c1");
        assert_eq!(ctx.resource_id, "r1");
        assert_eq!(ctx.resource_name, "r1");
        assert_eq!(ctx.build_id, "b2");
        assert_eq!(ctx.action_step_id, "a1");
    }

    #[test]
    fn assemble_is_deterministic() {
        let a = serde_json::to_vec(&assemble(&request())).unwrap();
        let b = serde_json::to_vec(&assemble(&request())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn file_changes_keep_order_and_content() {
        let changes = to_file_changes(vec![
            ChangedFile::new("src/a.ts", "a"),
            ChangedFile::new("src/b.ts", "b"),
        ]);
        assert_eq!(
            changes,
            vec![
                FileChange {
                    path: "src/a.ts".into(),
                    content: "a".into()
                },
                FileChange {
                    path: "src/b.ts".into(),
                    content: "b".into()
                },
            ]
        );
    }
}
