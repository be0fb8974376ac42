use app_use::{
    action::action_model::{Action, Direction, Operation, Point},
    agent::{
        agent_model::{Decision, DecisionRequest},
        decision::{DecisionError, DecisionMaker, ScriptedDecisionMaker, parse_decision},
        prompt::{state_message, system_prompt},
    },
    snapshot::snapshot_model::ElementId,
};

fn request() -> DecisionRequest {
    DecisionRequest {
        task: "log in as alice".into(),
        step: 3,
        max_steps: 20,
        snapshot_sequence: 4,
        screen: "Interactive elements on the current screen (snapshot #4):\n[Start of screen]\n[1]<button> Login\n[End of screen]".into(),
        feedback: vec!["Action type_text[2] \"x\" was rejected: not enabled. Choose a different action.".into()],
        history: vec!["step 1: tap[5] ok".into(), "step 2: type_text[2] \"x\" rejected (not enabled)".into()],
        memory: None,
    }
}

// ============================================================================
// Reply parsing
// ============================================================================

#[test]
fn parse_tap_action() {
    let decision = parse_decision(r#"{"action":{"op":"tap","target":3}}"#).unwrap();
    assert_eq!(decision, Decision::Act(Action::tap(ElementId(3))));
}

#[test]
fn parse_action_with_defaults() {
    let decision = parse_decision(r#"{"action":{"op":"long_press","target":4}}"#).unwrap();
    assert_eq!(
        decision,
        Decision::Act(Action::on(ElementId(4), Operation::LongPress { duration_ms: 800 }))
    );

    let decision = parse_decision(
        r#"{"action":{"op":"swipe","from":{"x":500,"y":1500},"to":{"x":500,"y":300}}}"#,
    )
    .unwrap();
    assert_eq!(
        decision,
        Decision::Act(Action::swipe(Point::new(500, 1500), Point::new(500, 300)))
    );
}

#[test]
fn parse_scroll_and_back() {
    assert_eq!(
        parse_decision(r#"{"action":{"op":"scroll","target":7,"direction":"down"}}"#).unwrap(),
        Decision::Act(Action::scroll(ElementId(7), Direction::Down))
    );
    assert_eq!(
        parse_decision(r#"{"action":{"op":"back"}}"#).unwrap(),
        Decision::Act(Action::back())
    );
}

#[test]
fn parse_done_reply() {
    assert_eq!(
        parse_decision(r#"{"done":{"success":true,"text":"Logged in"}}"#).unwrap(),
        Decision::Complete {
            summary: "Logged in".into()
        }
    );
    assert_eq!(
        parse_decision(r#"{"done":{"success":false,"text":"No network"}}"#).unwrap(),
        Decision::Fail {
            reason: "No network".into()
        }
    );
}

#[test]
fn parse_reply_wrapped_in_a_code_fence() {
    let raw = "Sure! Here is my answer:\n```json\n{\"action\": {\"op\": \"tap\", \"target\": 1}}\n```";
    assert_eq!(
        parse_decision(raw).unwrap(),
        Decision::Act(Action::tap(ElementId(1)))
    );
}

#[test]
fn parse_ignores_reasoning_blocks() {
    let raw = "<think>maybe {\"op\": \"back\"}? no, the button {3} is better</think>\n\
               {\"action\":{\"op\":\"tap\",\"target\":3}}";
    assert_eq!(
        parse_decision(raw).unwrap(),
        Decision::Act(Action::tap(ElementId(3)))
    );

    // Some models omit the opening tag.
    let raw = "the list {7} scrolls}</think>{\"action\":{\"op\":\"back\"}}";
    assert_eq!(parse_decision(raw).unwrap(), Decision::Act(Action::back()));
}

#[test]
fn parse_rejects_unknown_operation() {
    assert!(matches!(
        parse_decision(r#"{"action":{"op":"pinch","target":1}}"#),
        Err(DecisionError::Parse(_))
    ));
}

#[test]
fn parse_empty_reply() {
    assert_eq!(parse_decision(""), Err(DecisionError::Empty));
    assert_eq!(parse_decision("{}"), Err(DecisionError::Empty));
}

// ============================================================================
// Prompts
// ============================================================================

#[test]
fn system_prompt_lists_every_operation() {
    let prompt = system_prompt();
    for op in [
        "tap",
        "long_press",
        "type_text",
        "clear_text",
        "scroll",
        "swipe",
        "back",
        "wait",
    ] {
        assert!(prompt.contains(&format!("\"op\":\"{}\"", op)), "missing {}", op);
    }
    assert!(prompt.contains("\"done\""));
}

#[test]
fn every_example_in_the_system_prompt_parses() {
    let prompt = system_prompt();
    let examples: Vec<&str> = prompt
        .lines()
        .filter_map(|l| l.find('{').map(|i| &l[i..]))
        .collect();

    assert!(examples.len() >= 9);
    for example in examples {
        assert!(parse_decision(example).is_ok(), "unparseable: {}", example);
    }
}

#[test]
fn state_message_has_history_state_and_screen_sections() {
    let message = state_message(&request());

    assert!(message.contains("<agent_history>\nstep 1: tap[5] ok"));
    assert!(message.contains("<user_request>\nlog in as alice\n</user_request>"));
    assert!(message.contains("Step 3 of 20 max possible steps"));
    assert!(message.contains("<app_state>\nInteractive elements"));
    assert!(message.contains("[Start of screen]"));
    assert!(message.contains("rejected: not enabled"));
    assert!(!message.contains("<memory>"));
}

#[test]
fn state_message_includes_memory_when_present() {
    let mut req = request();
    req.memory = Some("step 1: tap[5] ok".into());
    req.history.clear();

    let message = state_message(&req);

    assert!(message.contains("<memory>\nstep 1: tap[5] ok\n</memory>"));
    assert!(message.contains("(no actions yet)"));
}

// ============================================================================
// Scripted decision maker
// ============================================================================

#[tokio::test]
async fn scripted_maker_replays_then_fails() {
    let maker = ScriptedDecisionMaker::from_decisions(vec![Decision::Act(Action::back())]);

    assert_eq!(
        maker.decide(&request()).await.unwrap(),
        Decision::Act(Action::back())
    );
    assert!(matches!(
        maker.decide(&request()).await.unwrap(),
        Decision::Fail { .. }
    ));
    assert_eq!(maker.requests().len(), 2);
    assert_eq!(maker.requests()[0].step, 3);
}
