//! Editor orchestration: inbound commands, outbound events, derived views

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use ruleforge::application::services::{
    EditorCommand, EditorEvent, EditorService, GatewayOptions, ImpactStatus, Theme,
};
use ruleforge::domain::{
    AstCompiler, FieldDescriptor, OperatorDescriptor, Token, TokenId, TokenType, EMPTY_EXPRESSION,
};
use ruleforge::infrastructure::traits::{ImpactEstimate, ImpactEstimator, ImpactRequest};
use ruleforge::infrastructure::InfraResult;

#[ctor::ctor]
fn init() {
    ruleforge::util::testing::init_test_setup();
}

fn editor() -> (EditorService, mpsc::UnboundedReceiver<EditorEvent>) {
    EditorService::new(AstCompiler::default(), None, GatewayOptions::default(), "scope-1")
}

fn age() -> FieldDescriptor {
    FieldDescriptor::new("Patient", "Age", "number", "Patient.Age")
}

fn drain(events: &mut mpsc::UnboundedReceiver<EditorEvent>) -> Vec<EditorEvent> {
    let mut out = vec![];
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

// ============================================================
// outbound events
// ============================================================

#[test]
fn given_new_editor_when_created_then_canonical_if_and_no_events() {
    let (editor, mut events) = editor();

    assert_eq!(editor.tokens().len(), 1);
    assert_eq!(editor.tokens()[0].token_type, TokenType::If);
    assert_eq!(editor.logic(), &json!({ "if": [] }));
    assert!(drain(&mut events).is_empty());
}

#[test]
fn given_mutation_when_committed_then_tokens_then_logic_emitted() {
    // Arrange
    let (mut editor, mut events) = editor();

    // Act
    editor.select_field(&age());

    // Assert
    let emitted = drain(&mut events);
    assert_eq!(emitted.len(), 2);
    assert!(matches!(&emitted[0], EditorEvent::TokensChanged(tokens) if tokens == editor.tokens()));
    assert!(matches!(&emitted[1], EditorEvent::LogicExported(logic) if logic == editor.logic()));
}

#[test]
fn given_comparison_built_when_viewing_then_views_agree() {
    // Arrange
    let (mut editor, _events) = editor();

    // Act
    editor.select_field(&age());
    editor.add_token(&OperatorDescriptor::relational(">="), None);
    editor.add_value("18");

    // Assert
    assert_eq!(
        editor.logic(),
        &json!({ "if": [{ ">=": [{ "var": "Patient.Age" }, 18] }] })
    );
    assert_eq!(editor.expression(), "IF (\n  Patient.Age >= 18\n)");
    assert_eq!(editor.views().flat.len(), 4);
}

#[test]
fn given_rejected_edits_when_applied_then_no_events() {
    // Arrange
    let (mut editor, mut events) = editor();

    // Act
    let changed = [
        editor.apply(EditorCommand::AddValue("   ".to_string())),
        editor.apply(EditorCommand::DeleteToken(TokenId(99))),
        editor.apply(EditorCommand::MoveToken { from: 0, to: 0 }),
        editor.apply(EditorCommand::UpdateValue {
            id: TokenId(99),
            text: "x".to_string(),
        }),
        editor.apply(EditorCommand::SetTheme(Theme::Dark)),
        editor.apply(EditorCommand::Select(None)),
    ];

    // Assert
    assert!(changed.iter().all(|c| !c));
    assert!(drain(&mut events).is_empty());
    assert_eq!(editor.theme(), Theme::Dark);
    assert_eq!(editor.cursor(), None);
}

// ============================================================
// inbound load / clear
// ============================================================

#[test]
fn given_saved_tokens_when_loading_then_tree_replaced_and_announced() {
    // Arrange
    let (mut editor, mut events) = editor();
    let tokens = vec![Token::leaf(5, TokenType::Operator, "!=", 0).with_children(vec![
        Token::leaf(6, TokenType::Field, "Patient.Gender", 1),
        Token::leaf(7, TokenType::Value, "'F'", 1),
    ])];

    // Act
    let changed = editor.apply(EditorCommand::Load {
        tokens: tokens.clone(),
        cursor: Some(TokenId(6)),
    });

    // Assert
    assert!(changed);
    assert_eq!(editor.tokens(), tokens.as_slice());
    assert_eq!(editor.cursor(), Some(TokenId(6)));
    assert_eq!(
        editor.logic(),
        &json!({ "!=": [{ "var": "Patient.Gender" }, "F"] })
    );
    assert_eq!(drain(&mut events).len(), 2);
}

#[test]
fn given_loaded_tokens_when_adding_then_fresh_id_exceeds_loaded() {
    let (mut editor, _events) = editor();
    editor.load(&[Token::leaf(41, TokenType::Value, "true", 0)], None);

    let id = editor.add_token(&OperatorDescriptor::lookup("not").expect("not"), None);

    assert!(id > TokenId(41));
}

#[test]
fn given_ids_used_before_load_when_adding_then_not_reissued() {
    // Arrange
    let (mut editor, _events) = editor();
    let used = editor.select_field(&age());

    // Act
    editor.load(&[Token::leaf(1, TokenType::Value, "true", 0)], None);
    let id = editor.add_token(&OperatorDescriptor::lookup("not").expect("not"), None);

    // Assert
    assert!(id > used);
}

#[test]
fn given_unknown_cursor_when_loading_then_cursor_dropped() {
    let (mut editor, _events) = editor();

    editor.load(&[Token::leaf(1, TokenType::Value, "1", 0)], Some(TokenId(9)));

    assert_eq!(editor.cursor(), None);
}

#[test]
fn given_edited_tree_when_cleared_then_single_if_with_new_id() {
    // Arrange
    let (mut editor, mut events) = editor();
    let original_root = editor.tokens()[0].id;
    editor.select_field(&age());
    drain(&mut events);

    // Act
    editor.apply(EditorCommand::Clear);

    // Assert
    let tokens = editor.tokens();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].token_type, TokenType::If);
    assert!(tokens[0].children.is_empty());
    assert!(tokens[0].id > original_root);
    assert_eq!(editor.expression(), "IF ()");
    assert_eq!(drain(&mut events).len(), 2);
}

#[test]
fn given_everything_deleted_when_rendering_then_placeholder_and_empty_logic() {
    let (mut editor, _events) = editor();
    let root = editor.tokens()[0].id;

    editor.delete_token(root);

    assert_eq!(editor.expression(), EMPTY_EXPRESSION);
    assert_eq!(editor.logic(), &json!({}));
}

// ============================================================
// impact
// ============================================================

#[test]
fn given_no_runtime_when_mutating_then_impact_unavailable() {
    let (mut editor, _events) = editor();

    editor.select_field(&age());

    assert_eq!(editor.impact().status, ImpactStatus::Unavailable);
}

struct FixedEstimator;

#[async_trait]
impl ImpactEstimator for FixedEstimator {
    async fn estimate(&self, request: &ImpactRequest) -> InfraResult<ImpactEstimate> {
        Ok(ImpactEstimate {
            matched: 12,
            total: Some(40),
            note: Some(request.scope_id.clone()),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn given_command_stream_when_running_then_estimate_follows_last_change() {
    // Arrange
    let options = GatewayOptions {
        debounce: Duration::from_millis(200),
        timeout: Duration::from_secs(1),
    };
    let (mut editor, mut events) =
        EditorService::new(AstCompiler::default(), Some(Arc::new(FixedEstimator)), options, "ward-9");
    let (commands, inbox) = mpsc::unbounded_channel();
    commands
        .send(EditorCommand::SelectField(age()))
        .expect("send");
    commands
        .send(EditorCommand::AddToken {
            operator: OperatorDescriptor::relational(">"),
            target: None,
        })
        .expect("send");
    commands
        .send(EditorCommand::AddValue("65".to_string()))
        .expect("send");
    drop(commands);

    // Act
    editor.run(inbox).await;
    let mut impact = editor.subscribe_impact();
    let settled = impact
        .wait_for(|s| s.status == ImpactStatus::Success)
        .await
        .map(|s| (*s).clone())
        .expect("gateway alive");

    // Assert
    let estimate = settled.estimate.expect("estimate");
    assert_eq!(estimate.matched, 12);
    assert_eq!(estimate.note.as_deref(), Some("ward-9"));
    let emitted = drain(&mut events);
    let requested: Vec<&ImpactRequest> = emitted
        .iter()
        .filter_map(|e| match e {
            EditorEvent::ImpactRequested(r) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(requested.len(), 1);
    assert_eq!(&requested[0].logic, editor.logic());
    assert_eq!(emitted.len(), 7);
}
