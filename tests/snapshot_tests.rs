use std::time::Duration;

use app_use::{
    driver::{
        driver_model::{Bounds, LocatorStrategy, RawNode},
        error::DriverError,
    },
    snapshot::{
        builder::{SnapshotBuilder, SnapshotError},
        normalize::{MAX_LABEL_CHARS, classify_role, normalize_label},
        render::{describe_screen, render_elements},
        snapshot_model::{ElementId, Role},
    },
};

use crate::common::{
    fake_driver::{FakeDriver, SCREEN_HEIGHT, SCREEN_WIDTH},
    trees::{button, form_screen, list_screen, login_screen, root, text, text_field},
};

mod common;

fn screen() -> Bounds {
    Bounds::new(0, 0, SCREEN_WIDTH, SCREEN_HEIGHT)
}

// =========================================================================
// Identity
// =========================================================================

#[test]
fn fresh_session_numbers_elements_in_traversal_order() {
    let mut builder = SnapshotBuilder::default();
    let snapshot = builder.assemble(&login_screen(), screen());

    assert_eq!(snapshot.sequence(), 1);
    assert_eq!(snapshot.ids(), &[ElementId(1), ElementId(2)]);

    let login = snapshot.find_by_label("login").unwrap();
    assert_eq!(login.id, ElementId(1));
    assert_eq!(login.role, Role::Button);
    assert!(login.enabled);

    let password = snapshot.resolve(ElementId(2)).unwrap();
    assert_eq!(password.role, Role::TextField);
    assert!(password.editable);
    assert!(!password.enabled);
}

#[test]
fn unchanged_tree_keeps_ids_with_new_sequence() {
    let mut builder = SnapshotBuilder::default();
    let first = builder.assemble(&form_screen(), screen());
    let second = builder.assemble(&form_screen(), screen());

    assert_eq!(first.ids(), second.ids());
    assert_eq!(second.sequence(), first.sequence() + 1);
    assert_eq!(builder.registry().retired_count(), 0);
}

#[test]
fn removed_element_id_is_retired_and_never_reused() {
    let mut builder = SnapshotBuilder::default();
    let first = builder.assemble(&form_screen(), screen());
    let username = first.find_by_label("Username").unwrap().id;
    let password = first.find_by_label("Password").unwrap().id;
    let sign_in = first.find_by_label("Sign in").unwrap().id;

    let without_username = root(vec![
        text("Welcome back", 100),
        text_field("Password", 500).with_resource_id("com.example:id/password"),
        button("Sign in", 700).with_resource_id("com.example:id/sign_in"),
    ]);
    let second = builder.assemble(&without_username, screen());

    assert!(!second.contains(username));
    assert_eq!(second.find_by_label("Password").unwrap().id, password);
    assert_eq!(second.find_by_label("Sign in").unwrap().id, sign_in);
    assert_eq!(builder.registry().retired_count(), 1);

    let third = builder.assemble(&form_screen(), screen());
    let reappeared = third.find_by_label("Username").unwrap().id;
    assert_ne!(reappeared, username);
    assert!(reappeared > sign_in);
}

#[test]
fn typing_into_a_field_keeps_its_id() {
    let mut builder = SnapshotBuilder::default();
    let before = builder.assemble(&form_screen(), screen());
    let username = before.find_by_label("Username").unwrap().id;

    let typed = root(vec![
        text("Welcome back", 100),
        text_field("alice", 300).with_resource_id("com.example:id/username"),
        text_field("Password", 500).with_resource_id("com.example:id/password"),
        button("Sign in", 700).with_resource_id("com.example:id/sign_in"),
    ]);
    let after = builder.assemble(&typed, screen());

    let field = after.resolve(username).unwrap();
    assert_eq!(field.label.as_deref(), Some("alice"));
}

#[test]
fn relabelled_button_gets_a_new_id() {
    let mut builder = SnapshotBuilder::default();
    let before = builder.assemble(&root(vec![button("Follow", 400)]), screen());
    let after = builder.assemble(&root(vec![button("Unfollow", 400)]), screen());

    assert_ne!(before.ids(), after.ids());
}

#[test]
fn separate_sessions_assign_identical_ids_to_identical_trees() {
    let a = SnapshotBuilder::default().assemble(&list_screen(&["One", "Two"]), screen());
    let b = SnapshotBuilder::default().assemble(&list_screen(&["One", "Two"]), screen());

    assert_eq!(a.ids(), b.ids());
}

// =========================================================================
// Filtering and structure
// =========================================================================

#[test]
fn hidden_and_offscreen_nodes_are_dropped() {
    let tree = root(vec![
        button("Visible", 400),
        button("Hidden", 600).hidden(),
        button("Below the fold", SCREEN_HEIGHT + 500),
    ]);
    let snapshot = SnapshotBuilder::default().assemble(&tree, screen());

    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.find_by_label("Visible").is_some());
    assert!(snapshot.find_by_label("Hidden").is_none());
    assert!(snapshot.find_by_label("Below the fold").is_none());
    assert!(snapshot.elements().all(|e| e.visible));
}

#[test]
fn static_text_is_not_interactable() {
    let snapshot = SnapshotBuilder::default().assemble(&form_screen(), screen());

    assert!(snapshot.find_by_label("Welcome back").is_none());
    assert_eq!(snapshot.len(), 3);
}

#[test]
fn list_rows_nest_under_the_scroll_container() {
    let snapshot = SnapshotBuilder::default()
        .assemble(&list_screen(&["Inbox", "Sent", "Drafts"]), screen());

    let list = snapshot.resolve(ElementId(1)).unwrap();
    assert_eq!(list.role, Role::List);
    assert!(list.scrollable);
    assert_eq!(list.children.len(), 3);
    assert_eq!(snapshot.roots(), &[ElementId(1)]);

    let sent = snapshot.find_by_label("Sent").unwrap();
    assert_eq!(sent.parent, Some(ElementId(1)));
    assert_eq!(sent.depth, 1);
    assert!(sent.clickable);
}

#[test]
fn layout_grouping_two_controls_is_kept_as_container() {
    let tree = root(vec![
        RawNode::new("android.widget.LinearLayout")
            .with_bounds(0, 300, SCREEN_WIDTH, 300)
            .with_children(vec![button("Cancel", 320), button("OK", 450)]),
        RawNode::new("android.widget.LinearLayout")
            .with_bounds(0, 700, SCREEN_WIDTH, 200)
            .with_children(vec![button("Help", 720)]),
    ]);
    let snapshot = SnapshotBuilder::default().assemble(&tree, screen());

    let group = snapshot.resolve(ElementId(1)).unwrap();
    assert_eq!(group.role, Role::Container);
    assert_eq!(group.children.len(), 2);

    let help = snapshot.find_by_label("Help").unwrap();
    assert_eq!(help.parent, None);
    assert_eq!(help.depth, 0);
}

#[test]
fn icon_button_borrows_descendant_label() {
    let tree = root(vec![
        RawNode::new("android.widget.FrameLayout")
            .with_bounds(900, 100, 120, 120)
            .clickable()
            .with_children(vec![
                RawNode::new("android.widget.ImageView")
                    .with_content_desc("Settings")
                    .with_bounds(910, 110, 100, 100),
            ]),
    ]);
    let snapshot = SnapshotBuilder::default().assemble(&tree, screen());

    let settings = snapshot.find_by_label("Settings").unwrap();
    assert!(settings.clickable);
    assert_eq!(snapshot.len(), 1);
}

#[test]
fn locator_falls_back_to_xpath() {
    let snapshot = SnapshotBuilder::default().assemble(&login_screen(), screen());
    let login = snapshot.resolve(ElementId(1)).unwrap();

    assert_eq!(login.locator().strategy, LocatorStrategy::Xpath);
    assert_eq!(
        login.locator().value,
        "/android.widget.FrameLayout/android.widget.Button[1]"
    );
}

#[test]
fn backend_handle_is_preferred_as_locator() {
    let mut node = button("Login", 400);
    node.handle = Some("element-42".into());
    let snapshot = SnapshotBuilder::default().assemble(&root(vec![node]), screen());

    let login = snapshot.resolve(ElementId(1)).unwrap();
    assert_eq!(login.locator().strategy, LocatorStrategy::Handle);
    assert_eq!(login.locator().value, "element-42");
}

#[test]
fn serialized_view_does_not_expose_locators() {
    let snapshot = SnapshotBuilder::default().assemble(&login_screen(), screen());
    let json = serde_json::to_value(snapshot.view()).unwrap();

    assert_eq!(json["sequence"], 1);
    assert_eq!(json["elements"].as_array().unwrap().len(), 2);
    assert!(json["elements"][0].get("locator").is_none());
    assert_eq!(json["elements"][0]["role"], "button");
}

// =========================================================================
// Normalization and rendering
// =========================================================================

#[test]
fn labels_are_collapsed_and_truncated() {
    assert_eq!(normalize_label("  Sign \n in  ").as_deref(), Some("Sign in"));
    assert_eq!(normalize_label("   "), None);

    let long = "x".repeat(200);
    let label = normalize_label(&long).unwrap();
    assert_eq!(label.chars().count(), MAX_LABEL_CHARS);
    assert!(label.ends_with('…'));
}

#[test]
fn roles_cover_android_and_ios_classes() {
    assert_eq!(classify_role(&RawNode::new("android.widget.ImageButton")), Role::Button);
    assert_eq!(classify_role(&RawNode::new("XCUIElementTypeSecureTextField")), Role::TextField);
    assert_eq!(classify_role(&RawNode::new("XCUIElementTypeTextView")), Role::TextField);
    assert_eq!(classify_role(&RawNode::new("android.widget.TextView")), Role::Text);
    assert_eq!(classify_role(&RawNode::new("android.widget.Switch")), Role::Toggle);
    assert_eq!(classify_role(&RawNode::new("com.vendor.FancyWidget")), Role::Other);
}

#[test]
fn rendering_lists_ids_roles_and_flags() {
    let snapshot = SnapshotBuilder::default().assemble(&login_screen(), screen());
    let rendered = render_elements(&snapshot);

    assert_eq!(
        rendered,
        "[1]<button> Login\n[2]<text_field> Password (disabled)"
    );

    let described = describe_screen(&snapshot);
    assert!(described.contains("snapshot #1"));
    assert!(described.contains("[Start of screen]"));
    assert!(described.contains("[End of screen]"));
}

#[test]
fn nested_elements_are_indented() {
    let snapshot = SnapshotBuilder::default().assemble(&list_screen(&["Inbox"]), screen());
    let rendered = render_elements(&snapshot);

    assert!(rendered.contains("\n\t[2]<container> Inbox"));
}

#[test]
fn screen_without_interactables_is_described_as_empty() {
    let snapshot = SnapshotBuilder::default().assemble(&root(vec![text("Loading", 100)]), screen());

    assert!(snapshot.is_empty());
    assert!(describe_screen(&snapshot).ends_with("empty screen"));
}

// =========================================================================
// Driver interaction
// =========================================================================

#[tokio::test]
async fn build_reads_tree_from_driver() {
    let mut driver = FakeDriver::new(login_screen());
    let mut builder = SnapshotBuilder::default();

    let snapshot = builder.build(&mut driver).await.unwrap();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.screen(), screen());
    assert_eq!(driver.fetches(), 1);
    assert_eq!(builder.last_sequence(), 1);
}

#[tokio::test]
async fn disconnected_driver_fails_without_fetching() {
    let mut driver = FakeDriver::new(login_screen());
    driver.set_connected(false);

    let result = SnapshotBuilder::default().build(&mut driver).await;

    assert!(matches!(result, Err(SnapshotError::DriverUnavailable(_))));
    assert_eq!(driver.fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_tree_retrieval_times_out() {
    let mut driver = FakeDriver::new(login_screen());
    driver.set_fetch_delay(Duration::from_secs(30));
    let mut builder = SnapshotBuilder::new(Duration::from_secs(5));

    let result = builder.build(&mut driver).await;

    assert_eq!(result.unwrap_err(), SnapshotError::Timeout(Duration::from_secs(5)));
    assert_eq!(builder.last_sequence(), 0);
}

#[tokio::test]
async fn lost_session_during_fetch_is_unavailable() {
    let mut driver = FakeDriver::new(login_screen());
    driver.fail_next_fetch(DriverError::Unavailable("socket closed".into()));

    let result = SnapshotBuilder::default().build(&mut driver).await;

    assert_eq!(
        result.unwrap_err(),
        SnapshotError::DriverUnavailable("socket closed".into())
    );
}
