//! Core type definitions shared by every layer of the DOM.
//!
//! Key design principles:
//! 1. Use u32 for object ids (index into the arena, never a pointer)
//! 2. Per-kind metadata lives in one static descriptor table, not in the nodes
//! 3. Property values travel as one enum so undo and events share a payload

use crate::geom::{Matrix4d, Vector3d};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Object identifier (index into the arena).
/// Slots are never reused, so a disposed id stays disposed.
pub type ObjectId = u32;

/// Identifier returned by `Document::subscribe`.
pub type SubscriptionId = u64;

/// Coordinate storage. No graphic has more than four vertices.
pub type Coordinates = SmallVec<[Vector3d; 4]>;

/// Concrete node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ElementKind {
    Document = 0,
    Page = 1,
    Step = 2,
    Comment = 3,
    Line = 4,
    Triangle = 5,
    Quadrilateral = 6,
    OptionalLine = 7,
    Reference = 8,
    Group = 9,
    Colour = 10,
    Material = 11,
}

/// Static capabilities of a node kind.
#[derive(Debug)]
pub struct ElementDescriptor {
    pub type_name: &'static str,
    /// Can be placed inside a collection.
    pub is_element: bool,
    /// Owns an ordered list of children.
    pub is_collection: bool,
    /// Can be a member of a `Group`.
    pub is_groupable: bool,
    /// Has coordinates and a colour.
    pub is_graphic: bool,
    pub coordinates_count: usize,
    /// Leading number of the LDraw line this kind emits.
    pub line_type: Option<u8>,
}

const fn descriptor(
    type_name: &'static str,
    is_element: bool,
    is_collection: bool,
    is_groupable: bool,
    is_graphic: bool,
    coordinates_count: usize,
    line_type: Option<u8>,
) -> ElementDescriptor {
    ElementDescriptor {
        type_name,
        is_element,
        is_collection,
        is_groupable,
        is_graphic,
        coordinates_count,
        line_type,
    }
}

static DESCRIPTORS: [ElementDescriptor; 12] = [
    descriptor("Document", false, true, false, false, 0, None),
    descriptor("Page", true, true, false, false, 0, None),
    descriptor("Step", true, true, false, false, 0, None),
    descriptor("Comment", true, false, true, false, 0, Some(0)),
    descriptor("Line", true, false, true, true, 2, Some(2)),
    descriptor("Triangle", true, false, true, true, 3, Some(3)),
    descriptor("Quadrilateral", true, false, true, true, 4, Some(4)),
    descriptor("OptionalLine", true, false, true, true, 4, Some(5)),
    descriptor("Reference", true, false, true, false, 0, Some(1)),
    descriptor("Group", true, false, false, false, 0, Some(0)),
    descriptor("Colour", true, false, false, false, 0, Some(0)),
    descriptor("Material", false, false, false, false, 0, None),
];

impl ElementKind {
    pub fn descriptor(self) -> &'static ElementDescriptor {
        &DESCRIPTORS[self as usize]
    }

    pub fn type_name(self) -> &'static str {
        self.descriptor().type_name
    }

    /// Whether a collection of this kind may hold `child`.
    pub fn accepts(self, child: ElementKind) -> bool {
        match self {
            ElementKind::Document => child == ElementKind::Page,
            ElementKind::Page => child == ElementKind::Step,
            ElementKind::Step => matches!(
                child,
                ElementKind::Comment
                    | ElementKind::Line
                    | ElementKind::Triangle
                    | ElementKind::Quadrilateral
                    | ElementKind::OptionalLine
                    | ElementKind::Reference
                    | ElementKind::Group
                    | ElementKind::Colour
            ),
            _ => false,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Lifecycle state. `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Live,
    Disposing,
    Disposed,
}

/// Output mode of the code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CodeStandards {
    #[default]
    Full,
    OfficialModelRepository,
    PartsLibrary,
}

impl CodeStandards {
    /// Editor decorators (`GHOST`, `MLCAD`, `LOCKNEXT`, groups) are legal.
    pub fn allows_decorators(self) -> bool {
        self != CodeStandards::PartsLibrary
    }
}

/// Vertex emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindingDirection {
    #[default]
    Normal,
    Reversed,
}

impl WindingDirection {
    pub fn flipped(self) -> Self {
        match self {
            WindingDirection::Normal => WindingDirection::Reversed,
            WindingDirection::Reversed => WindingDirection::Normal,
        }
    }
}

/// LDraw `!LDRAW_ORG` page types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageType {
    #[default]
    Model,
    Part,
    Subpart,
    Primitive,
    HiresPrimitive,
    Shortcut,
}

impl PageType {
    pub fn keyword(self) -> &'static str {
        match self {
            PageType::Model => "Model",
            PageType::Part => "Part",
            PageType::Subpart => "Subpart",
            PageType::Primitive => "Primitive",
            PageType::HiresPrimitive => "48_Primitive",
            PageType::Shortcut => "Shortcut",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let keyword = keyword.strip_prefix("Unofficial_").unwrap_or(keyword);
        match keyword.to_ascii_lowercase().as_str() {
            "model" => Some(PageType::Model),
            "part" => Some(PageType::Part),
            "subpart" => Some(PageType::Subpart),
            "primitive" => Some(PageType::Primitive),
            "48_primitive" => Some(PageType::HiresPrimitive),
            "shortcut" => Some(PageType::Shortcut),
            _ => None,
        }
    }
}

/// Result of the collection mutation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertCheckResult {
    Allowed,
    NotSupported,
    AlreadyParented,
    CircularReference,
    DuplicateName,
}

/// Relaxations for `can_insert` / `can_replace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertCheckFlags {
    pub ignore_current_parent: bool,
    pub ignore_duplicate_names: bool,
}

impl InsertCheckFlags {
    pub const NONE: Self = Self {
        ignore_current_parent: false,
        ignore_duplicate_names: false,
    };
}

/// Every observable property of every node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    Parent,
    Group,
    IsLocked,
    IsGeometryLocked,
    IsVisible,
    IsGhosted,
    ColourValue,
    Coordinates,
    Matrix,
    TargetName,
    Text,
    Name,
    Title,
    Author,
    PageType,
    Code,
    Value,
    EdgeValue,
    Luminance,
    Material,
    MaterialValue,
    Fraction,
    VFraction,
    Size,
    MinSize,
    MaxSize,
}

impl Property {
    /// Properties that can be changed on a locked element.
    pub fn settable_when_locked(self) -> bool {
        matches!(
            self,
            Property::Parent | Property::Group | Property::IsLocked | Property::IsGeometryLocked
        )
    }

    /// Properties that a geometry lock protects.
    pub fn is_geometry(self) -> bool {
        matches!(self, Property::Coordinates | Property::Matrix)
    }

    /// Operation name carried by the generic `Changed` event.
    pub fn event_name(self) -> &'static str {
        match self {
            Property::Parent => "ParentChanged",
            Property::Group => "GroupChanged",
            Property::IsLocked => "IsLockedChanged",
            Property::IsGeometryLocked => "IsGeometryLockedChanged",
            Property::IsVisible => "IsVisibleChanged",
            Property::IsGhosted => "IsGhostedChanged",
            Property::ColourValue => "ColourValueChanged",
            Property::Coordinates => "CoordinatesChanged",
            Property::Matrix => "MatrixChanged",
            Property::TargetName => "TargetNameChanged",
            Property::Text => "TextChanged",
            Property::Name => "NameChanged",
            Property::Title => "TitleChanged",
            Property::Author => "AuthorChanged",
            Property::PageType => "PageTypeChanged",
            Property::Code => "CodeChanged",
            Property::Value => "ValueChanged",
            Property::EdgeValue => "EdgeValueChanged",
            Property::Luminance => "LuminanceChanged",
            Property::Material => "MaterialChanged",
            Property::MaterialValue => "MaterialValueChanged",
            Property::Fraction => "FractionChanged",
            Property::VFraction => "VFractionChanged",
            Property::Size => "SizeChanged",
            Property::MinSize => "MinSizeChanged",
            Property::MaxSize => "MaxSizeChanged",
        }
    }
}

/// A property value, as carried by events and undo records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Code(u32),
    Number(f64),
    Text(String),
    Coordinates(Coordinates),
    Matrix(Matrix4d),
    Rgba(crate::colour::Rgba),
    Luminance(Option<u8>),
    PageType(PageType),
    Link(Option<ObjectId>),
}
