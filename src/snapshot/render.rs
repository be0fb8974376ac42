use crate::snapshot::snapshot_model::{Element, Snapshot};

/// One line per element, indented by tree depth:
///
/// ```text
/// [1]<button> Login
/// [2]<text_field> Password (disabled)
/// ```
pub fn render_elements(snapshot: &Snapshot) -> String {
    snapshot
        .elements()
        .map(render_element)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_element(el: &Element) -> String {
    let mut line = format!("{}[{}]<{}>", "\t".repeat(el.depth), el.id, el.role);

    match (&el.label, &el.resource_id) {
        (Some(label), _) => {
            line.push(' ');
            line.push_str(label);
        }
        (None, Some(rid)) => {
            line.push_str(" id=");
            line.push_str(rid.rsplit('/').next().unwrap_or(rid));
        }
        (None, None) => {}
    }

    let mut flags = Vec::new();
    if !el.enabled {
        flags.push("disabled");
    }
    if el.checkable {
        flags.push(if el.checked { "checked" } else { "unchecked" });
    }
    if el.scrollable {
        flags.push("scrollable");
    }
    if !flags.is_empty() {
        line.push_str(&format!(" ({})", flags.join(", ")));
    }

    line
}

/// The `<app_state>` body handed to the decision-maker.
pub fn describe_screen(snapshot: &Snapshot) -> String {
    let elements = render_elements(snapshot);
    let body = if elements.is_empty() {
        "empty screen".to_string()
    } else {
        format!("[Start of screen]\n{}\n[End of screen]", elements)
    };

    format!(
        "Interactive elements on the current screen (snapshot #{}):\n{}",
        snapshot.sequence(),
        body
    )
}
