use app_use::driver::driver_model::RawNode;

use super::fake_driver::{SCREEN_HEIGHT, SCREEN_WIDTH};

pub fn root(children: Vec<RawNode>) -> RawNode {
    RawNode::new("android.widget.FrameLayout")
        .with_bounds(0, 0, SCREEN_WIDTH, SCREEN_HEIGHT)
        .with_children(children)
}

pub fn button(label: &str, y: i32) -> RawNode {
    RawNode::new("android.widget.Button")
        .with_text(label)
        .with_bounds(40, y, 1000, 120)
        .clickable()
}

pub fn text_field(label: &str, y: i32) -> RawNode {
    RawNode::new("android.widget.EditText")
        .with_text(label)
        .with_bounds(40, y, 1000, 120)
        .clickable()
}

pub fn text(label: &str, y: i32) -> RawNode {
    RawNode::new("android.widget.TextView")
        .with_text(label)
        .with_bounds(40, y, 1000, 60)
}

/// Button "Login" (id 1) and a disabled text field (id 2).
pub fn login_screen() -> RawNode {
    root(vec![
        button("Login", 400),
        text_field("Password", 600).disabled(),
    ])
}

/// Username and password fields with a login button.
pub fn form_screen() -> RawNode {
    root(vec![
        text("Welcome back", 100),
        text_field("Username", 300).with_resource_id("com.example:id/username"),
        text_field("Password", 500).with_resource_id("com.example:id/password"),
        button("Sign in", 700).with_resource_id("com.example:id/sign_in"),
    ])
}

/// A scrollable list of clickable rows.
pub fn list_screen(rows: &[&str]) -> RawNode {
    let items = rows
        .iter()
        .enumerate()
        .map(|(i, label)| {
            RawNode::new("android.widget.LinearLayout")
                .with_bounds(0, 200 + i as i32 * 150, SCREEN_WIDTH, 150)
                .clickable()
                .with_children(vec![text(label, 220 + i as i32 * 150)])
        })
        .collect();

    root(vec![
        RawNode::new("androidx.recyclerview.widget.RecyclerView")
            .with_resource_id("com.example:id/list")
            .with_bounds(0, 200, SCREEN_WIDTH, 2000)
            .scrollable()
            .with_children(items),
    ])
}
