//! Event names handlers bind effects to

use std::fmt;
use std::str::FromStr;

use crate::host::Point;

/// A UI condition a handler can react to.
///
/// Object events come from pointer transitions (`Enter`/`Leave`) or are pushed
/// by the screen reader. Global handlers fire their own names, such as the
/// screen border pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    Enter,
    Leave,
    GainFocus,
    LoseFocus,
    Foreground,
    NameChange,
    ValueChange,
    StateChange,
    Selection,
    Caret,
    MenuStart,
    MenuEnd,
    Alert,
    DocumentLoadComplete,
    TypedCharacter,
    BorderEnter,
    BorderLeave,
    Custom(String),
}

impl EventName {
    pub fn as_str(&self) -> &str {
        match self {
            EventName::Enter => "enter",
            EventName::Leave => "leave",
            EventName::GainFocus => "gainFocus",
            EventName::LoseFocus => "loseFocus",
            EventName::Foreground => "foreground",
            EventName::NameChange => "nameChange",
            EventName::ValueChange => "valueChange",
            EventName::StateChange => "stateChange",
            EventName::Selection => "selection",
            EventName::Caret => "caret",
            EventName::MenuStart => "menuStart",
            EventName::MenuEnd => "menuEnd",
            EventName::Alert => "alert",
            EventName::DocumentLoadComplete => "documentLoadComplete",
            EventName::TypedCharacter => "typedCharacter",
            EventName::BorderEnter => "border_enter",
            EventName::BorderLeave => "border_leave",
            EventName::Custom(name) => name,
        }
    }

    /// Events the screen reader pushes through `Controller::host_event`
    pub const HOST_EVENTS: [EventName; 13] = [
        EventName::GainFocus,
        EventName::LoseFocus,
        EventName::Foreground,
        EventName::NameChange,
        EventName::ValueChange,
        EventName::StateChange,
        EventName::Selection,
        EventName::Caret,
        EventName::MenuStart,
        EventName::MenuEnd,
        EventName::Alert,
        EventName::DocumentLoadComplete,
        EventName::TypedCharacter,
    ];

    pub fn is_host_event(&self) -> bool {
        Self::HOST_EVENTS.contains(self)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = std::convert::Infallible;

    /// Unknown names become `Custom`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let known = [
            EventName::Enter,
            EventName::Leave,
            EventName::BorderEnter,
            EventName::BorderLeave,
        ];
        Ok(known
            .into_iter()
            .chain(Self::HOST_EVENTS)
            .find(|e| e.as_str() == s)
            .unwrap_or_else(|| EventName::Custom(s.to_string())))
    }
}

/// Extra data that travels with an event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventParams {
    /// Pointer position when the event was detected
    pub pointer: Option<Point>,
    /// Character for `typedCharacter`
    pub character: Option<char>,
}

impl EventParams {
    pub fn at(pointer: Point) -> Self {
        Self {
            pointer: Some(pointer),
            ..Default::default()
        }
    }
}
