//! Predicates deciding which objects and conditions a handler reacts to
//!
//! Filters are plain values: immutable once built and free of side effects.

use crate::host::{Point, Rect, Role, UiObject};

/// Predicate over the UI object under the pointer
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectFilter {
    MatchAll,
    /// Every `include` matches and no `exclude` matches
    Combo {
        include: Vec<ObjectFilter>,
        exclude: Vec<ObjectFilter>,
    },
    Role(RoleFilter),
}

impl Default for ObjectFilter {
    fn default() -> Self {
        ObjectFilter::MatchAll
    }
}

impl ObjectFilter {
    pub fn combo(include: Vec<ObjectFilter>, exclude: Vec<ObjectFilter>) -> Self {
        ObjectFilter::Combo { include, exclude }
    }

    /// Images, image maps and video elements
    pub fn graphic() -> Self {
        ObjectFilter::Role(RoleFilter::graphic())
    }

    /// No object never matches, not even `MatchAll`
    pub fn matches(&self, obj: Option<&UiObject>) -> bool {
        let Some(obj) = obj else {
            return false;
        };
        self.matches_object(obj)
    }

    fn matches_object(&self, obj: &UiObject) -> bool {
        match self {
            ObjectFilter::MatchAll => true,
            ObjectFilter::Combo { include, exclude } => {
                include.iter().all(|f| f.matches_object(obj))
                    && !exclude.iter().any(|f| f.matches_object(obj))
            }
            ObjectFilter::Role(role) => role.matches(obj),
        }
    }
}

/// Matches by accessibility role, or by an attribute value for elements
/// whose role says nothing useful (e.g. `<video>` reports as a generic group)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoleFilter {
    pub roles: Vec<Role>,
    pub attributes: Vec<(String, String)>,
}

impl RoleFilter {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn graphic() -> Self {
        Self::new([Role::Graphic, Role::ImageMap]).with_attribute("tag", "video")
    }

    pub fn matches(&self, obj: &UiObject) -> bool {
        // Objects without a role are never graphics, attributes or not
        let Some(role) = obj.role else {
            return false;
        };
        if self.roles.contains(&role) {
            return true;
        }
        self.attributes
            .iter()
            .any(|(key, value)| obj.attribute(key) == Some(value.as_str()))
    }
}

/// Predicate over environment-wide state, gating a global handler
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalFilter {
    MatchAll,
    Combo {
        include: Vec<GlobalFilter>,
        exclude: Vec<GlobalFilter>,
    },
    PointerWithin(Rect),
}

impl Default for GlobalFilter {
    fn default() -> Self {
        GlobalFilter::MatchAll
    }
}

impl GlobalFilter {
    pub fn combo(include: Vec<GlobalFilter>, exclude: Vec<GlobalFilter>) -> Self {
        GlobalFilter::Combo { include, exclude }
    }

    pub fn matches(&self, pointer: Point) -> bool {
        match self {
            GlobalFilter::MatchAll => true,
            GlobalFilter::Combo { include, exclude } => {
                include.iter().all(|f| f.matches(pointer)) && !exclude.iter().any(|f| f.matches(pointer))
            }
            GlobalFilter::PointerWithin(rect) => rect.contains(pointer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> UiObject {
        UiObject::new(1).with_role(Role::Graphic).with_name("chart")
    }

    fn button() -> UiObject {
        UiObject::new(1).with_role(Role::Button)
    }

    #[test]
    fn test_missing_object_never_matches() {
        assert!(!ObjectFilter::MatchAll.matches(None));
        assert!(!ObjectFilter::graphic().matches(None));
    }

    #[test]
    fn test_empty_combo_matches_everything() {
        let f = ObjectFilter::combo(vec![], vec![]);
        assert!(f.matches(Some(&button())));
        assert!(f.matches(Some(&image())));
    }

    #[test]
    fn test_combo_include_all_exclude_any() {
        let named_chart = ObjectFilter::Role(RoleFilter::new([Role::Graphic]));
        let f = ObjectFilter::combo(
            vec![ObjectFilter::MatchAll, named_chart],
            vec![ObjectFilter::Role(RoleFilter::new([Role::Button]))],
        );
        assert!(f.matches(Some(&image())));
        assert!(!f.matches(Some(&button())));

        let excluded = ObjectFilter::combo(vec![], vec![ObjectFilter::graphic()]);
        assert!(!excluded.matches(Some(&image())));
        assert!(excluded.matches(Some(&button())));
    }

    #[test]
    fn test_graphic_filter_matches_video_tag() {
        let video = UiObject::new(3).with_role(Role::Pane).with_attribute("tag", "video");
        assert!(ObjectFilter::graphic().matches(Some(&video)));

        let div = UiObject::new(3).with_role(Role::Pane).with_attribute("tag", "div");
        assert!(!ObjectFilter::graphic().matches(Some(&div)));

        let roleless = UiObject::new(3).with_attribute("tag", "video");
        assert!(!ObjectFilter::graphic().matches(Some(&roleless)));
    }

    #[test]
    fn test_image_map_is_graphic() {
        let map = UiObject::new(2).with_role(Role::ImageMap);
        assert!(ObjectFilter::graphic().matches(Some(&map)));
    }

    #[test]
    fn test_global_pointer_within() {
        let top_left = GlobalFilter::PointerWithin(Rect::new(0, 0, 100, 100));
        assert!(top_left.matches(Point::new(50, 50)));
        assert!(!top_left.matches(Point::new(100, 50)));

        let outside = GlobalFilter::combo(vec![], vec![top_left]);
        assert!(outside.matches(Point::new(150, 50)));
        assert!(!outside.matches(Point::new(10, 10)));
    }
}
