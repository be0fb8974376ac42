use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    driver::{
        driver_model::{Bounds, Driver, NativeLocator, RawNode},
        error::DriverError,
    },
    snapshot::{
        identity::IdRegistry,
        normalize::{classify_role, descendant_label, is_editable, node_label, text_fingerprint},
        snapshot_model::{Element, ElementId, Role, Snapshot},
    },
};

pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("UI tree not retrieved within {0:?}")]
    Timeout(Duration),

    #[error("snapshot failed: {0}")]
    Driver(DriverError),
}

/// Turns the live driver tree into immutable snapshots.
///
/// Owns the session's id registry and the snapshot sequence counter, so one
/// builder belongs to exactly one driver session.
pub struct SnapshotBuilder {
    registry: IdRegistry,
    sequence: u64,
    timeout: Duration,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_TIMEOUT)
    }
}

impl SnapshotBuilder {
    pub fn new(timeout: Duration) -> Self {
        Self {
            registry: IdRegistry::new(),
            sequence: 0,
            timeout,
        }
    }

    /// Sequence number of the most recent snapshot (0 before the first).
    pub fn last_sequence(&self) -> u64 {
        self.sequence
    }

    pub fn registry(&self) -> &IdRegistry {
        &self.registry
    }

    pub async fn build<D: Driver + ?Sized>(
        &mut self,
        driver: &mut D,
    ) -> Result<Snapshot, SnapshotError> {
        if !driver.is_connected().await {
            return Err(SnapshotError::DriverUnavailable(
                "automation session is not connected".into(),
            ));
        }

        let fetched = timeout(self.timeout, async {
            let tree = driver.fetch_tree().await?;
            let screen = driver.screen_size().await?;
            Ok::<_, DriverError>((tree, screen))
        })
        .await;

        let (tree, screen) = match fetched {
            Err(_) => {
                warn!(timeout = ?self.timeout, "UI tree retrieval timed out");
                return Err(SnapshotError::Timeout(self.timeout));
            }
            Ok(Err(DriverError::Unavailable(msg))) => {
                return Err(SnapshotError::DriverUnavailable(msg));
            }
            Ok(Err(DriverError::Timeout(msg))) => {
                warn!("driver timed out fetching tree: {}", msg);
                return Err(SnapshotError::Timeout(self.timeout));
            }
            Ok(Err(e)) => return Err(SnapshotError::Driver(e)),
            Ok(Ok(fetched)) => fetched,
        };

        Ok(self.assemble(&tree, screen))
    }

    /// Filter, identify and index a raw tree. No driver access.
    pub fn assemble(&mut self, tree: &RawNode, screen: Bounds) -> Snapshot {
        let root_xpath = format!("/{}", tree.class_name);
        let drafts = prune(tree, &tree.class_name, &root_xpath, &screen, true);

        let mut signatures = Vec::new();
        collect_signatures(&drafts, &mut signatures);
        let ids = self.registry.assign(&signatures);

        let mut elements = Vec::with_capacity(ids.len());
        let roots = emit(drafts, &mut ids.iter(), 0, None, &mut elements);

        self.sequence += 1;
        debug!(
            sequence = self.sequence,
            elements = elements.len(),
            retired = self.registry.retired_count(),
            "snapshot assembled"
        );

        Snapshot::new(self.sequence, screen, roots, elements)
    }
}

struct Draft<'a> {
    node: &'a RawNode,
    role: Role,
    label: Option<String>,
    signature: String,
    locator: NativeLocator,
    children: Vec<Draft<'a>>,
}

fn is_interactable(node: &RawNode, role: Role) -> bool {
    node.clickable
        || node.long_clickable
        || node.scrollable
        || node.checkable
        || role.is_inherently_interactive()
}

/// Depth-first filter. Returns the kept subtrees rooted at or below `node`.
///
/// Interactable nodes are kept. Other nodes are kept only when they group at
/// least two kept children; otherwise their kept descendants are lifted to
/// the nearest kept ancestor. The tree root is always lifted.
fn prune<'a>(
    node: &'a RawNode,
    path: &str,
    xpath: &str,
    screen: &Bounds,
    is_root: bool,
) -> Vec<Draft<'a>> {
    if !node.displayed {
        return Vec::new();
    }
    // Off-screen subtree; nodes without bounds (hierarchy roots) pass through.
    if !node.bounds.is_empty() && !node.bounds.intersects(screen) {
        return Vec::new();
    }

    let mut kept = Vec::new();
    let mut ordinals: HashMap<(&str, Option<&str>), usize> = HashMap::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for child in &node.children {
        let class = child.class_name.as_str();

        let ordinal = ordinals
            .entry((class, child.resource_id.as_deref()))
            .and_modify(|v| *v += 1)
            .or_insert(0);
        let position = positions.entry(class).and_modify(|v| *v += 1).or_insert(1);

        let child_path = format!(
            "{}/{}#{}#{}",
            path,
            class,
            child.resource_id.as_deref().unwrap_or(""),
            ordinal
        );
        let child_xpath = format!("{}/{}[{}]", xpath, class, position);

        kept.extend(prune(child, &child_path, &child_xpath, screen, false));
    }

    if node.bounds.is_empty() {
        return kept;
    }

    let role = classify_role(node);

    if is_interactable(node, role) {
        let label = node_label(node).or_else(|| descendant_label(node));
        return vec![draft(node, role, label, path, xpath, kept)];
    }

    if !is_root && kept.len() >= 2 {
        let role = match role {
            Role::List => Role::List,
            _ => Role::Container,
        };
        return vec![draft(node, role, node_label(node), path, xpath, kept)];
    }

    kept
}

fn draft<'a>(
    node: &'a RawNode,
    role: Role,
    label: Option<String>,
    path: &str,
    xpath: &str,
    children: Vec<Draft<'a>>,
) -> Draft<'a> {
    // Typed text must not change the identity of an input field.
    let identity_text = if is_editable(node) {
        ""
    } else {
        label.as_deref().unwrap_or("")
    };
    let signature = text_fingerprint(&format!("{}|{}", path, identity_text));

    let locator = match &node.handle {
        Some(handle) => NativeLocator::handle(handle.clone()),
        None => NativeLocator::xpath(xpath),
    };

    Draft {
        node,
        role,
        label,
        signature,
        locator,
        children,
    }
}

fn collect_signatures(drafts: &[Draft<'_>], out: &mut Vec<String>) {
    for d in drafts {
        out.push(d.signature.clone());
        collect_signatures(&d.children, out);
    }
}

fn emit(
    drafts: Vec<Draft<'_>>,
    ids: &mut std::slice::Iter<'_, ElementId>,
    depth: usize,
    parent: Option<ElementId>,
    out: &mut Vec<Element>,
) -> Vec<ElementId> {
    let mut emitted = Vec::with_capacity(drafts.len());

    for d in drafts {
        let Some(&id) = ids.next() else {
            break;
        };

        let node = d.node;
        let slot = out.len();
        out.push(Element {
            id,
            role: d.role,
            class_name: node.class_name.clone(),
            label: d.label,
            resource_id: node.resource_id.clone(),
            bounds: node.bounds,
            enabled: node.enabled,
            visible: true,
            clickable: node.clickable,
            long_clickable: node.long_clickable,
            editable: d.role == Role::TextField,
            scrollable: node.scrollable,
            checkable: node.checkable,
            checked: node.checked,
            depth,
            parent,
            children: Vec::new(),
            locator: d.locator,
        });

        let children = emit(d.children, ids, depth + 1, Some(id), out);
        out[slot].children = children;
        emitted.push(id);
    }

    emitted
}
