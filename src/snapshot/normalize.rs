use crate::{driver::driver_model::RawNode, snapshot::snapshot_model::Role};

pub const MAX_LABEL_CHARS: usize = 80;

pub fn normalize_label(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        return None;
    }

    if collapsed.chars().count() > MAX_LABEL_CHARS {
        let truncated: String = collapsed.chars().take(MAX_LABEL_CHARS - 1).collect();
        return Some(format!("{}…", truncated.trim_end()));
    }

    Some(collapsed)
}

/// Visible text first, then the accessibility description.
pub fn node_label(node: &RawNode) -> Option<String> {
    node.text
        .as_deref()
        .and_then(normalize_label)
        .or_else(|| node.content_desc.as_deref().and_then(normalize_label))
}

/// First label found in a subtree, depth-first.
pub fn descendant_label(node: &RawNode) -> Option<String> {
    node.children
        .iter()
        .find_map(|child| node_label(child).or_else(|| descendant_label(child)))
}

/// Map Android widget classes and XCUITest element types onto roles.
pub fn classify_role(node: &RawNode) -> Role {
    // Editable on iOS, static text on Android.
    if node.class_name == "XCUIElementTypeTextView" {
        return Role::TextField;
    }

    let class = node
        .class_name
        .rsplit('.')
        .next()
        .unwrap_or(&node.class_name)
        .trim_start_matches("XCUIElementType");

    match class {
        "Button" | "ImageButton" | "FloatingActionButton" | "MaterialButton" | "Link"
        | "MenuItem" | "Tab" => Role::Button,

        "EditText" | "AutoCompleteTextView" | "TextInputEditText" | "TextField"
        | "SecureTextField" | "SearchField" => Role::TextField,

        "CheckBox" | "Switch" | "RadioButton" | "ToggleButton" | "CheckedTextView"
        | "SwitchMaterial" => Role::Toggle,

        "ImageView" | "Image" | "Icon" => Role::Image,

        "TextView" | "StaticText" => Role::Text,

        "RecyclerView" | "ListView" | "ScrollView" | "HorizontalScrollView"
        | "NestedScrollView" | "GridView" | "ViewPager" | "Table" | "CollectionView" => {
            Role::List
        }

        "FrameLayout" | "LinearLayout" | "RelativeLayout" | "ConstraintLayout"
        | "CoordinatorLayout" | "ViewGroup" | "View" | "Other" | "Cell" | "Window"
        | "Application" | "NavigationBar" | "Toolbar" | "TabBar" | "CardView" => {
            Role::Container
        }

        _ if node.checkable => Role::Toggle,
        _ if node.scrollable => Role::List,
        _ => Role::Other,
    }
}

pub fn is_editable(node: &RawNode) -> bool {
    classify_role(node) == Role::TextField
}

pub fn text_fingerprint(text: &str) -> String {
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
