// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use quill::chat::{
    AgentLoopConfig, AgentLoopObserver, AgentRunner, ExitReason, LoopOutcome,
    NoopAgentLoopObserver,
};
use quill::error::{ApiError, QuillError, Result};
use quill::llm::mock_provider::{MockProvider, MockTurn};
use quill::llm::{Conversation, Message, Role, StreamToken};
use quill::tools::changes::shared_ledger;
use quill::tools::permission::{AllowAllApprover, Approver, DenyAllApprover, PermissionRequest};
use quill::tools::{
    PermissionGate, PermissionMode, PermissionModeHandle, ToolContext, ToolExecutor,
    ToolInvocation, ToolResult, ToolStatus,
};

fn runner_with(
    temp_dir: &TempDir,
    provider: MockProvider,
    mode: PermissionMode,
    approver: Arc<dyn Approver>,
    config: AgentLoopConfig,
) -> AgentRunner {
    let executor = ToolExecutor::new(
        ToolContext::new(temp_dir.path().to_path_buf()),
        shared_ledger(50),
        PermissionGate::new(PermissionModeHandle::new(mode), approver),
    );
    AgentRunner::new(Arc::new(provider), executor).with_config(config)
}

fn runner(temp_dir: &TempDir, provider: MockProvider) -> AgentRunner {
    runner_with(
        temp_dir,
        provider,
        PermissionMode::Auto,
        Arc::new(AllowAllApprover),
        AgentLoopConfig::default(),
    )
}

fn conversation(prompt: &str) -> Conversation {
    let mut conversation = Conversation::with_system("You are a test agent.");
    conversation.push(Message::user(prompt));
    conversation
}

/// Observer that keeps every tool call and result it is shown
#[derive(Default)]
struct Transcript {
    invocations: Vec<ToolInvocation>,
    results: Vec<ToolResult>,
    content: String,
    exits: Vec<ExitReason>,
}

impl AgentLoopObserver for Transcript {
    fn on_content(&mut self, text: &str) -> Result<()> {
        self.content.push_str(text);
        Ok(())
    }

    fn on_tool_invocation(&mut self, invocation: &ToolInvocation) -> Result<()> {
        self.invocations.push(invocation.clone());
        Ok(())
    }

    fn on_tool_result(&mut self, result: &ToolResult) -> Result<()> {
        self.results.push(result.clone());
        Ok(())
    }

    fn on_exit(&mut self, outcome: &LoopOutcome) -> Result<()> {
        self.exits.push(outcome.reason);
        Ok(())
    }
}

#[tokio::test]
async fn test_repeated_round_stops_before_reexecuting() {
    let temp_dir = TempDir::new().unwrap();
    let provider = MockProvider::with_turns(vec![
        MockTurn::text("Listing.\n<tool:bash>ls</tool>"),
        MockTurn::text("Listing again.\n<tool:bash>ls</tool>"),
        MockTurn::text("never streamed"),
    ]);
    let mut runner = runner(&temp_dir, provider.clone());
    let mut conversation = conversation("what is here?");
    let mut transcript = Transcript::default();

    let outcome = runner
        .run(&mut conversation, CancellationToken::new(), &mut transcript)
        .await
        .unwrap();

    assert_eq!(outcome.reason, ExitReason::RepeatedToolCalls);
    assert_eq!(outcome.turns, 2);
    assert_eq!(provider.call_count(), 2);
    assert_eq!(transcript.results.len(), 1);
    assert_eq!(transcript.exits, vec![ExitReason::RepeatedToolCalls]);
    assert_eq!(conversation.last().unwrap().role, Role::Assistant);
}

#[tokio::test]
async fn test_consecutive_failures_stop_the_loop() {
    let temp_dir = TempDir::new().unwrap();
    let provider = MockProvider::with_turns(
        (1..=6)
            .map(|i| MockTurn::text(format!("<tool:read>missing{}.txt</tool>", i)))
            .collect(),
    );
    let mut runner = runner(&temp_dir, provider.clone());
    let mut conversation = conversation("read the files");

    let outcome = runner
        .run(&mut conversation, CancellationToken::new(), &mut NoopAgentLoopObserver)
        .await
        .unwrap();

    assert_eq!(outcome.reason, ExitReason::ConsecutiveFailures);
    assert_eq!(outcome.turns, 4);
    assert_eq!(provider.call_count(), 4);
}

#[tokio::test]
async fn test_one_success_resets_failure_count() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("real.txt"), "ok").unwrap();
    let provider = MockProvider::with_turns(vec![
        MockTurn::text("<tool:read>gone1.txt</tool>"),
        MockTurn::text("<tool:read>real.txt</tool>"),
        MockTurn::text("<tool:read>gone2.txt</tool>"),
        MockTurn::text("Done reading."),
    ]);
    let config = AgentLoopConfig {
        max_turns: 10,
        max_consecutive_failures: 2,
    };
    let mut runner = runner_with(
        &temp_dir,
        provider,
        PermissionMode::Auto,
        Arc::new(AllowAllApprover),
        config,
    );

    let outcome = runner
        .run(&mut conversation("read"), CancellationToken::new(), &mut NoopAgentLoopObserver)
        .await
        .unwrap();
    assert_eq!(outcome.reason, ExitReason::Completed);
    assert_eq!(outcome.final_text, "Done reading.");
}

#[tokio::test]
async fn test_denied_rounds_count_as_failures() {
    let temp_dir = TempDir::new().unwrap();
    let provider = MockProvider::with_turns(vec![
        MockTurn::text("<tool:write>a.txt\nA</tool>"),
        MockTurn::text("<tool:write>b.txt\nB</tool>"),
        MockTurn::text("<tool:write>c.txt\nC</tool>"),
    ]);
    let config = AgentLoopConfig {
        max_turns: 10,
        max_consecutive_failures: 2,
    };
    let mut runner = runner_with(
        &temp_dir,
        provider,
        PermissionMode::Ask,
        Arc::new(DenyAllApprover),
        config,
    );
    let mut transcript = Transcript::default();

    let outcome = runner
        .run(&mut conversation("write files"), CancellationToken::new(), &mut transcript)
        .await
        .unwrap();

    assert_eq!(outcome.reason, ExitReason::ConsecutiveFailures);
    assert!(transcript
        .results
        .iter()
        .all(|r| r.status == ToolStatus::Denied));
    assert!(!temp_dir.path().join("a.txt").exists());
    assert!(!temp_dir.path().join("b.txt").exists());
}

#[tokio::test]
async fn test_turn_limit() {
    let temp_dir = TempDir::new().unwrap();
    let provider = MockProvider::with_turns(
        (1..=5)
            .map(|i| MockTurn::text(format!("<tool:bash>echo {}</tool>", i)))
            .collect(),
    );
    let config = AgentLoopConfig {
        max_turns: 3,
        max_consecutive_failures: 4,
    };
    let mut runner = runner_with(
        &temp_dir,
        provider.clone(),
        PermissionMode::Auto,
        Arc::new(AllowAllApprover),
        config,
    );

    let outcome = runner
        .run(&mut conversation("count"), CancellationToken::new(), &mut NoopAgentLoopObserver)
        .await
        .unwrap();

    assert_eq!(outcome.reason, ExitReason::MaxTurns);
    assert_eq!(outcome.turns, 3);
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_feedback_is_sent_as_next_user_message() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("notes.txt"), "buy milk").unwrap();
    let provider = MockProvider::with_turns(vec![
        MockTurn::text("<tool:read>notes.txt</tool><tool:teleport>mars</tool>"),
        MockTurn::text("The note says buy milk."),
    ]);
    let mut runner = runner(&temp_dir, provider.clone());
    let mut conversation = conversation("what does the note say?");

    let outcome = runner
        .run(&mut conversation, CancellationToken::new(), &mut NoopAgentLoopObserver)
        .await
        .unwrap();
    assert_eq!(outcome.reason, ExitReason::Completed);

    let requests = provider.recorded_requests();
    assert_eq!(requests.len(), 2);
    let feedback = requests[1].last().unwrap();
    assert_eq!(feedback.role, Role::User);
    assert!(feedback.content.starts_with("Tool results:"));
    assert!(feedback.content.contains("buy milk"));
    assert!(feedback.content.contains("FAILED"));
    assert!(feedback.content.contains("Only these tools exist"));

    // system, user, assistant, feedback, final answer
    assert_eq!(conversation.len(), 5);
}

#[tokio::test]
async fn test_native_call_runs_when_no_tags() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("Cargo.toml"), "[package]").unwrap();
    let provider = MockProvider::with_turns(vec![
        MockTurn::tool_call("", "file_read", r#"{"file_path":"Cargo.toml"}"#),
        MockTurn::text("It is a Rust package."),
    ]);
    let mut runner = runner(&temp_dir, provider);
    let mut transcript = Transcript::default();

    let outcome = runner
        .run(&mut conversation("what is this?"), CancellationToken::new(), &mut transcript)
        .await
        .unwrap();

    assert_eq!(outcome.reason, ExitReason::Completed);
    assert_eq!(transcript.results.len(), 1);
    assert_eq!(transcript.results[0].status, ToolStatus::Success);
    assert_eq!(outcome.usage.total(), 15);
}

#[tokio::test]
async fn test_cancel_mid_stream() {
    let temp_dir = TempDir::new().unwrap();
    let tokens = (0..20)
        .map(|i| StreamToken::Content(format!("word{} ", i)))
        .collect();
    let provider = MockProvider::with_turns(vec![MockTurn::Tokens(tokens)])
        .with_token_delay(Duration::from_millis(50));
    let mut runner = runner(&temp_dir, provider.clone());
    let mut transcript = Transcript::default();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(175)).await;
        trigger.cancel();
    });

    let outcome = runner
        .run(&mut conversation("talk"), cancel, &mut transcript)
        .await
        .unwrap();

    assert_eq!(outcome.reason, ExitReason::Cancelled);
    assert_eq!(provider.call_count(), 1);
    assert!(transcript.content.starts_with("word0 "));
    assert!(!transcript.content.contains("word19"));
    assert_eq!(transcript.exits, vec![ExitReason::Cancelled]);
}

/// Approver standing in for a user who never answers the prompt
struct SilentApprover;

#[async_trait::async_trait]
impl Approver for SilentApprover {
    async fn approve(&self, _request: &PermissionRequest) -> bool {
        std::future::pending::<bool>().await
    }
}

#[tokio::test]
async fn test_cancel_while_waiting_for_approval() {
    let temp_dir = TempDir::new().unwrap();
    let provider = MockProvider::with_turns(vec![
        MockTurn::text("<tool:write>out.txt\nhello</tool>"),
        MockTurn::text("never streamed"),
    ]);
    let mut runner = runner_with(
        &temp_dir,
        provider.clone(),
        PermissionMode::Ask,
        Arc::new(SilentApprover),
        AgentLoopConfig::default(),
    );
    let mut transcript = Transcript::default();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        runner.run(&mut conversation("write it"), cancel, &mut transcript),
    )
    .await
    .expect("loop should stop once cancelled")
    .unwrap();

    assert_eq!(outcome.reason, ExitReason::Cancelled);
    assert_eq!(transcript.invocations.len(), 1);
    assert!(transcript.results.is_empty());
    assert_eq!(provider.call_count(), 1);
    assert!(!temp_dir.path().join("out.txt").exists());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let temp_dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    let mut runner = runner(&temp_dir, provider.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = runner
        .run(&mut conversation("hi"), cancel, &mut NoopAgentLoopObserver)
        .await
        .unwrap();

    assert_eq!(outcome.reason, ExitReason::Cancelled);
    assert_eq!(outcome.turns, 0);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_auth_failure_propagates_without_touching_conversation() {
    let temp_dir = TempDir::new().unwrap();
    let provider = MockProvider::with_turns(vec![MockTurn::HttpError {
        status: 401,
        body: "invalid x-api-key".to_string(),
    }]);
    let mut runner = runner(&temp_dir, provider);
    let mut conversation = conversation("hi");

    let error = runner
        .run(&mut conversation, CancellationToken::new(), &mut NoopAgentLoopObserver)
        .await
        .unwrap_err();

    match error {
        QuillError::Api(api) => {
            assert!(api.is_auth_failure());
            assert!(matches!(api, ApiError::HttpStatus { status: 401, .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(conversation.len(), 2);
}
