use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::driver::error::DriverError;

/// Axis-aligned rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2,
            y: self.y + self.height / 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// One node of the UI hierarchy as reported by the automation backend.
///
/// The bridge helper translates the Appium page source (UiAutomator2 or
/// XCUITest XML) into this shape before handing it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "contentDesc")]
    pub content_desc: Option<String>,
    #[serde(default, rename = "resourceId")]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub bounds: Bounds,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub displayed: bool,
    #[serde(default)]
    pub clickable: bool,
    #[serde(default, rename = "longClickable")]
    pub long_clickable: bool,
    #[serde(default)]
    pub scrollable: bool,
    #[serde(default)]
    pub checkable: bool,
    #[serde(default)]
    pub checked: bool,
    /// Backend element reference, when the backend hands one out.
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub children: Vec<RawNode>,
}

fn default_true() -> bool {
    true
}

impl RawNode {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            text: None,
            content_desc: None,
            resource_id: None,
            bounds: Bounds::default(),
            enabled: true,
            displayed: true,
            clickable: false,
            long_clickable: false,
            scrollable: false,
            checkable: false,
            checked: false,
            handle: None,
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_content_desc(mut self, desc: impl Into<String>) -> Self {
        self.content_desc = Some(desc.into());
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_bounds(mut self, x: i32, y: i32, width: i32, height: i32) -> Self {
        self.bounds = Bounds::new(x, y, width, height);
        self
    }

    pub fn with_children(mut self, children: Vec<RawNode>) -> Self {
        self.children = children;
        self
    }

    pub fn clickable(mut self) -> Self {
        self.clickable = true;
        self
    }

    pub fn scrollable(mut self) -> Self {
        self.scrollable = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// Opaque element reference handed out by the backend.
    Handle,
    Xpath,
}

/// Driver-specific handle used to find an element again at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeLocator {
    pub strategy: LocatorStrategy,
    pub value: String,
}

impl NativeLocator {
    pub fn handle(value: impl Into<String>) -> Self {
        Self {
            strategy: LocatorStrategy::Handle,
            value: value.into(),
        }
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            strategy: LocatorStrategy::Xpath,
            value: value.into(),
        }
    }
}

/// Low-level command sent to the automation backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DriverCommand {
    Tap {
        locator: NativeLocator,
    },
    LongPress {
        locator: NativeLocator,
        duration_ms: u64,
    },
    TypeText {
        locator: NativeLocator,
        text: String,
        clear_first: bool,
    },
    Clear {
        locator: NativeLocator,
    },
    Scroll {
        locator: NativeLocator,
        direction: Direction,
    },
    Swipe {
        from: Point,
        to: Point,
        duration_ms: u64,
    },
    Back,
}

impl DriverCommand {
    pub fn name(&self) -> &'static str {
        match self {
            DriverCommand::Tap { .. } => "tap",
            DriverCommand::LongPress { .. } => "long_press",
            DriverCommand::TypeText { .. } => "type_text",
            DriverCommand::Clear { .. } => "clear",
            DriverCommand::Scroll { .. } => "scroll",
            DriverCommand::Swipe { .. } => "swipe",
            DriverCommand::Back => "back",
        }
    }
}

/// Session exposed by the automation backend.
///
/// Only the snapshot builder and the action executor talk to it.
#[async_trait]
pub trait Driver: Send {
    async fn is_connected(&mut self) -> bool;

    /// Current UI hierarchy, root first.
    async fn fetch_tree(&mut self) -> Result<RawNode, DriverError>;

    /// Visible screen area in device pixels.
    async fn screen_size(&mut self) -> Result<Bounds, DriverError>;

    async fn dispatch(&mut self, command: &DriverCommand) -> Result<(), DriverError>;

    /// End the session. Default: nothing to release.
    async fn close(&mut self) {}
}
