use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    driver::driver_model::{Bounds, NativeLocator},
    snapshot::identity::{ElementIndex, ElementNotFound},
};

/// Session-scoped element identifier shown to the decision-maker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u32);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Button,
    TextField,
    Toggle,
    Image,
    Text,
    List,
    Container,
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Button => "button",
            Role::TextField => "text_field",
            Role::Toggle => "toggle",
            Role::Image => "image",
            Role::Text => "text",
            Role::List => "list",
            Role::Container => "container",
            Role::Other => "other",
        }
    }

    /// Roles that accept taps without the backend flagging them clickable.
    pub fn is_inherently_interactive(&self) -> bool {
        matches!(self, Role::Button | Role::TextField | Role::Toggle)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub id: ElementId,
    pub role: Role,
    pub class_name: String,
    pub label: Option<String>,
    pub resource_id: Option<String>,
    pub bounds: Bounds,
    pub enabled: bool,
    pub visible: bool,
    pub clickable: bool,
    pub long_clickable: bool,
    pub editable: bool,
    pub scrollable: bool,
    pub checkable: bool,
    pub checked: bool,
    pub depth: usize,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,

    #[serde(skip)]
    pub(crate) locator: NativeLocator,
}

impl Element {
    /// Executor-only: the decision-maker never sees locators.
    pub fn locator(&self) -> &NativeLocator {
        &self.locator
    }

    pub fn accepts_tap(&self) -> bool {
        self.clickable || self.checkable || self.role.is_inherently_interactive()
    }

    pub fn accepts_long_press(&self) -> bool {
        self.long_clickable || self.accepts_tap()
    }
}

/// Immutable capture of the interactable UI at one instant.
///
/// Superseded by the next snapshot, never mutated. The element index is
/// owned by the snapshot and dropped with it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    sequence: u64,
    taken_at: DateTime<Utc>,
    screen: Bounds,
    roots: Vec<ElementId>,
    order: Vec<ElementId>,
    index: ElementIndex,
}

impl Snapshot {
    pub(crate) fn new(
        sequence: u64,
        screen: Bounds,
        roots: Vec<ElementId>,
        elements: Vec<Element>,
    ) -> Self {
        let order = elements.iter().map(|e| e.id).collect();
        Self {
            sequence,
            taken_at: Utc::now(),
            screen,
            roots,
            order,
            index: ElementIndex::new(elements),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn screen(&self) -> Bounds {
        self.screen
    }

    pub fn roots(&self) -> &[ElementId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[ElementId] {
        &self.order
    }

    pub fn resolve(&self, id: ElementId) -> Result<&Element, ElementNotFound> {
        self.index.resolve(id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.index.resolve(id).is_ok()
    }

    /// Elements in depth-first, sibling order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.order.iter().filter_map(|id| self.index.resolve(*id).ok())
    }

    pub fn find_by_label(&self, label: &str) -> Option<&Element> {
        self.elements()
            .find(|e| e.label.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(label)))
    }

    pub fn view(&self) -> SnapshotView<'_> {
        SnapshotView {
            sequence: self.sequence,
            taken_at: self.taken_at,
            screen: self.screen,
            roots: &self.roots,
            elements: self.elements().collect(),
        }
    }
}

/// Serializable form of a snapshot (locators excluded).
#[derive(Debug, Serialize)]
pub struct SnapshotView<'a> {
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    pub screen: Bounds,
    pub roots: &'a [ElementId],
    pub elements: Vec<&'a Element>,
}
