//! End-to-end request scenarios against scripted collaborators.

use std::sync::Arc;

use buildcommit_core::fakes::{RecordingPublisher, ScriptedDiffResolver, ScriptedRepositoryClient};
use buildcommit_core::{
    ChangedFile, CommitOutcome, CommitRequest, DispatchState, PipelineConfig, PipelineError,
    RequestDispatcher,
};
use serde_json::json;

fn scenario_request(previous_build_id: &str) -> CommitRequest {
    serde_json::from_value(json!({
        "commit": { "id": "c1", "message": "fix bug" },
        "build": {
            "id": "b2",
            "actionStepId": "a1",
            "resourceId": "r1",
            "previousBuildId": previous_build_id
        },
        "repository": { "owner": "acme", "name": "svc", "installationId": "inst1" }
    }))
    .unwrap()
}

fn dispatcher(
    diff: &Arc<ScriptedDiffResolver>,
    repo: &Arc<ScriptedRepositoryClient>,
    publisher: &Arc<RecordingPublisher>,
) -> RequestDispatcher {
    RequestDispatcher::new(
        PipelineConfig::default(),
        diff.clone(),
        repo.clone(),
        publisher.clone(),
    )
}

#[tokio::test]
async fn successful_commit_reports_sha_and_repository() {
    let diff = Arc::new(ScriptedDiffResolver::returning(vec![ChangedFile::new(
        "src/a.ts",
        "export const a = 1;",
    )]));
    let repo = Arc::new(ScriptedRepositoryClient::returning_sha("abc123"));
    let publisher = Arc::new(RecordingPublisher::new());

    let report = dispatcher(&diff, &repo, &publisher)
        .handle_request(&scenario_request("b1"))
        .await;
    assert_eq!(report.terminal, DispatchState::TerminatedSuccess);

    let published = publisher.published();
    assert_eq!(published.len(), 1);
    let (key, status) = &published[0];
    assert_eq!(key, "b2");
    assert_eq!(
        serde_json::to_value(status).unwrap(),
        json!({
            "actionStepId": "a1",
            "message": "Commit abc123 pushed successfully to acme/svc",
            "outcome": "Success",
            "payload": { "commitSha": "abc123" }
        })
    );

    let commits = repo.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].installation_id, "inst1");
    assert_eq!(commits[0].message, "fix bug");
    assert_eq!(commits[0].context.owner, "acme");
    assert_eq!(commits[0].context.repo, "svc");
    assert_eq!(commits[0].files[0].path, "src/a.ts");
    assert_eq!(commits[0].files[0].content, "export const a = 1;");
}

#[tokio::test]
async fn diff_fault_fails_without_touching_repository() {
    let diff = Arc::new(ScriptedDiffResolver::failing(PipelineError::DiffUnavailable(
        "artifact not found".into(),
    )));
    let repo = Arc::new(ScriptedRepositoryClient::returning_sha("abc123"));
    let publisher = Arc::new(RecordingPublisher::new());

    let report = dispatcher(&diff, &repo, &publisher)
        .handle_request(&scenario_request("b1"))
        .await;
    assert_eq!(report.terminal, DispatchState::TerminatedFailure);
    assert!(report.published);
    assert_eq!(repo.call_count(), 0);

    let statuses = publisher.for_build("b2");
    assert_eq!(statuses.len(), 1);
    assert_eq!(
        serde_json::to_value(&statuses[0]).unwrap(),
        json!({
            "actionStepId": "a1",
            "message": "artifact not found",
            "outcome": "Failed"
        })
    );
}

#[tokio::test]
async fn empty_previous_build_requests_full_snapshot() {
    let diff = Arc::new(ScriptedDiffResolver::returning(vec![
        ChangedFile::new("README.md", "# svc"),
        ChangedFile::new("src/a.ts", "a"),
    ]));
    let repo = Arc::new(ScriptedRepositoryClient::new());
    let publisher = Arc::new(RecordingPublisher::new());

    dispatcher(&diff, &repo, &publisher)
        .handle_request(&scenario_request(""))
        .await;

    let calls = diff.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].previous_build_id, None);
    assert_eq!(calls[0].current_build_id, "b2");
    assert_eq!(calls[0].resource_id, "r1");
    assert_eq!(repo.commits()[0].files.len(), 2);
}

#[tokio::test]
async fn every_fault_kind_yields_exactly_one_failed_status() {
    let diff_faults = [
        PipelineError::DiffUnavailable("artifact not found".into()),
        PipelineError::DiffComputationError("diff service returned 500".into()),
    ];
    for fault in diff_faults {
        let diff = Arc::new(ScriptedDiffResolver::failing(fault.clone()));
        let repo = Arc::new(ScriptedRepositoryClient::new());
        let publisher = Arc::new(RecordingPublisher::new());
        dispatcher(&diff, &repo, &publisher)
            .handle_request(&scenario_request("b1"))
            .await;
        let statuses = publisher.for_build("b2");
        assert_eq!(statuses.len(), 1, "{fault:?}");
        assert_eq!(statuses[0].outcome(), CommitOutcome::Failed);
        assert_eq!(statuses[0].message(), fault.message());
    }

    let repo_faults = [
        PipelineError::AuthenticationFailed("authentication failed for installation inst1".into()),
        PipelineError::CommitFailed("ref update rejected (422)".into()),
        PipelineError::EmptyCommit("commit for build b2 has no changes".into()),
    ];
    for fault in repo_faults {
        let diff = Arc::new(ScriptedDiffResolver::returning(Vec::new()));
        let repo = Arc::new(ScriptedRepositoryClient::failing(fault.clone()));
        let publisher = Arc::new(RecordingPublisher::new());
        dispatcher(&diff, &repo, &publisher)
            .handle_request(&scenario_request("b1"))
            .await;
        let statuses = publisher.for_build("b2");
        assert_eq!(statuses.len(), 1, "{fault:?}");
        assert_eq!(statuses[0].outcome(), CommitOutcome::Failed);
        assert!(statuses[0].commit_sha().is_none());
        assert_eq!(statuses[0].action_step_id(), "a1");
        assert_eq!(statuses[0].message(), fault.message());
    }
}
