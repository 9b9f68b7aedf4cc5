//! Screen-reader host and screen-capture collaborator interfaces
//!
//! The controller never talks to an accessibility API or a capture backend
//! directly. The embedding host implements [`ScreenReaderHost`] and
//! [`ScreenCapture`] and hands them to the controller at construction.

use std::collections::BTreeMap;

/// Captured pixels for one region
pub type PixelBuffer = image::RgbImage;

/// A screen position in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Screen rectangle as reported by the accessibility tree: left, top, width, height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    /// A rectangle with no area cannot be captured
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Half-open containment: the right and bottom edges are outside
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x < self.right() && point.y >= self.top && point.y < self.bottom()
    }
}

/// Accessibility role of a UI object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Unknown,
    Window,
    Pane,
    Dialog,
    Document,
    Link,
    Button,
    CheckBox,
    Edit,
    StaticText,
    List,
    ListItem,
    Menu,
    MenuItem,
    Table,
    Graphic,
    ImageMap,
    Other(u32),
}

impl Role {
    pub fn display_name(&self) -> String {
        match self {
            Role::Other(raw) => format!("role({})", raw),
            other => format!("{:?}", other).to_lowercase(),
        }
    }
}

/// A UI object as seen by the screen reader at one instant.
///
/// Host objects are rebuilt on every poll, so this is a value snapshot rather
/// than a handle. Attributes a given host API version may not expose are
/// `None` instead of being probed for at runtime.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UiObject {
    /// Opaque native window handle
    pub window_handle: u64,
    pub child_id: Option<i64>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub bounds: Option<Rect>,
    /// Free-form accessibility attributes (e.g. IAccessible2 `tag`)
    pub attributes: Option<BTreeMap<String, String>>,
}

impl UiObject {
    pub fn new(window_handle: u64) -> Self {
        Self {
            window_handle,
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_child_id(mut self, child_id: i64) -> Self {
        self.child_id = Some(child_id);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.as_ref()?.get(key).map(String::as_str)
    }

    /// Bounds usable as a capture region
    pub fn capture_bounds(&self) -> Option<Rect> {
        self.bounds.filter(|b| !b.is_empty())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("Unnamed")
    }

    pub fn identity(&self) -> ObjectIdentity {
        ObjectIdentity::of(self)
    }
}

/// Non-owning key telling whether two polls saw the same logical object.
/// Only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectIdentity {
    window_handle: u64,
    child_id: Option<i64>,
    name: Option<String>,
    role: Option<Role>,
}

impl ObjectIdentity {
    pub fn of(obj: &UiObject) -> Self {
        Self {
            window_handle: obj.window_handle,
            child_id: obj.child_id,
            name: obj.name.clone(),
            role: obj.role,
        }
    }
}

/// What the controller needs from the screen reader
pub trait ScreenReaderHost: Send + Sync {
    fn current_pointer_position(&self) -> Point;

    fn object_under_point(&self, point: Point) -> Option<UiObject>;

    /// Full virtual screen size in pixels (width, height)
    fn screen_size(&self) -> (u32, u32);
}

/// Raw pixel capture primitive
pub trait ScreenCapture: Send + Sync {
    fn capture_region(&self, bounds: Rect) -> Option<PixelBuffer>;
}
