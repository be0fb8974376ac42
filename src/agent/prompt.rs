use chrono::Utc;

use crate::agent::agent_model::DecisionRequest;

/// Instructions sent once per request as the system message.
pub fn system_prompt() -> String {
    r#"You are an agent operating a mobile app. Each step you see the interactive elements of the current screen and pick exactly one action.

Elements are listed as `[id]<role> label`, indented by nesting depth. Ids are only valid for the screen they were listed with.

AVAILABLE ACTIONS (respond with exactly one as JSON):
1. tap:        {"action":{"op":"tap","target":3}}
2. long_press: {"action":{"op":"long_press","target":3,"duration_ms":800}}
3. type_text:  {"action":{"op":"type_text","target":5,"text":"hello","clear_first":true}}
4. clear_text: {"action":{"op":"clear_text","target":5}}
5. scroll:     {"action":{"op":"scroll","target":7,"direction":"down"}}
6. swipe:      {"action":{"op":"swipe","from":{"x":500,"y":1500},"to":{"x":500,"y":500},"duration_ms":400}}
7. back:       {"action":{"op":"back"}}
8. wait:       {"action":{"op":"wait","duration_ms":1000}}

When the task is finished, or cannot be finished, respond with:
{"done":{"success":true,"text":"what was achieved"}}

Rules:
- Only use ids from the current screen.
- Text fields must be enabled before typing into them.
- If an action was rejected, read the reason and choose differently.

Respond with ONLY valid JSON, no explanation."#
        .to_string()
}

/// Per-step message describing the task, progress and current screen.
pub fn state_message(request: &DecisionRequest) -> String {
    let history = if request.history.is_empty() {
        "(no actions yet)".to_string()
    } else {
        request.history.join("\n")
    };

    let memory = request
        .memory
        .as_deref()
        .map(|m| format!("\n<memory>\n{}\n</memory>", m))
        .unwrap_or_default();

    let feedback = if request.feedback.is_empty() {
        String::new()
    } else {
        format!("\n<read_state>\n{}\n</read_state>", request.feedback.join("\n"))
    };

    format!(
        "<agent_history>\n{}\n</agent_history>{}\n<agent_state>\n<user_request>\n{}\n</user_request>\n<step_info>\nStep {} of {} max possible steps\nCurrent date and time: {}\n</step_info>\n</agent_state>\n<app_state>\n{}\n</app_state>{}",
        history,
        memory,
        request.task,
        request.step,
        request.max_steps,
        Utc::now().format("%Y-%m-%d %H:%M"),
        request.screen,
        feedback,
    )
}
