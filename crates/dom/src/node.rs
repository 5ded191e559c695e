//! Arena node and per-kind payloads.
//!
//! Design philosophy:
//! - One struct for every node, kind-specific data in a tagged enum
//! - Links are ids, never references (parent, children, group, material)
//! - Lock and freeze are stored locally; inheritance is computed by walking up

use crate::colour::{Rgba, EDGE_COLOUR, MAIN_COLOUR};
use crate::geom::{BoundingBox, Matrix4d, Vector3d, EPSILON};
use crate::material::Material;
use crate::types::{Coordinates, ElementKind, NodeState, ObjectId, PageType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageData {
    pub name: String,
    pub title: String,
    pub author: String,
    pub page_type: PageType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentData {
    pub text: String,
}

/// Which geometric line a `Graphic` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphicKind {
    Line,
    Triangle,
    Quadrilateral,
    OptionalLine,
}

impl GraphicKind {
    pub fn element_kind(self) -> ElementKind {
        match self {
            GraphicKind::Line => ElementKind::Line,
            GraphicKind::Triangle => ElementKind::Triangle,
            GraphicKind::Quadrilateral => ElementKind::Quadrilateral,
            GraphicKind::OptionalLine => ElementKind::OptionalLine,
        }
    }

    pub fn coordinates_count(self) -> usize {
        self.element_kind().descriptor().coordinates_count
    }

    pub fn default_colour(self) -> u32 {
        match self {
            GraphicKind::Line | GraphicKind::OptionalLine => EDGE_COLOUR,
            GraphicKind::Triangle | GraphicKind::Quadrilateral => MAIN_COLOUR,
        }
    }
}

/// Line, triangle, quadrilateral or optional line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graphic {
    pub kind: GraphicKind,
    pub colour: u32,
    pub coordinates: Coordinates,
    pub visible: bool,
    pub ghosted: bool,
    pub geometry_locked: bool,
}

impl Graphic {
    pub fn new(kind: GraphicKind, colour: u32, coordinates: Coordinates) -> Self {
        Self {
            kind,
            colour,
            coordinates,
            visible: true,
            ghosted: false,
            geometry_locked: false,
        }
    }
}

/// A type-1 sub-file reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub colour: u32,
    pub matrix: Matrix4d,
    pub target: String,
    pub visible: bool,
    pub ghosted: bool,
    pub geometry_locked: bool,
}

impl Reference {
    pub fn new(colour: u32, matrix: Matrix4d, target: String) -> Self {
        Self {
            colour,
            matrix,
            target,
            visible: true,
            ghosted: false,
            geometry_locked: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupData {
    pub name: String,
}

/// A `!COLOUR` definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColourData {
    pub name: String,
    pub code: u32,
    pub value: Rgba,
    pub edge: Rgba,
    pub luminance: Option<u8>,
    /// Owned material node. Rewired when a snapshot is restored.
    #[serde(skip)]
    pub material: ObjectId,
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeData {
    Document,
    Page(PageData),
    Step,
    Comment(CommentData),
    Graphic(Graphic),
    Reference(Reference),
    Group(GroupData),
    Colour(ColourData),
    Material(Material),
}

impl NodeData {
    pub fn kind(&self) -> ElementKind {
        match self {
            NodeData::Document => ElementKind::Document,
            NodeData::Page(_) => ElementKind::Page,
            NodeData::Step => ElementKind::Step,
            NodeData::Comment(_) => ElementKind::Comment,
            NodeData::Graphic(g) => g.kind.element_kind(),
            NodeData::Reference(_) => ElementKind::Reference,
            NodeData::Group(_) => ElementKind::Group,
            NodeData::Colour(_) => ElementKind::Colour,
            NodeData::Material(_) => ElementKind::Material,
        }
    }

    pub fn as_geometric(&self) -> Option<&dyn Geometric> {
        match self {
            NodeData::Graphic(g) => Some(g),
            NodeData::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_colourable(&self) -> Option<&dyn Colourable> {
        match self {
            NodeData::Graphic(g) => Some(g),
            NodeData::Reference(r) => Some(r),
            _ => None,
        }
    }
}

/// Elements with positions in space.
pub trait Geometric {
    /// Points that define the element, in local space.
    fn points(&self) -> Vec<Vector3d>;

    fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.points())
    }

    /// Two or more defining points coincide.
    fn is_colocated(&self) -> bool {
        false
    }
}

impl Geometric for Graphic {
    fn points(&self) -> Vec<Vector3d> {
        self.coordinates.to_vec()
    }

    fn bounding_box(&self) -> Option<BoundingBox> {
        // control points of an optional line are not drawn
        let drawn = match self.kind {
            GraphicKind::OptionalLine => &self.coordinates[..2],
            _ => &self.coordinates[..],
        };
        BoundingBox::from_points(drawn)
    }

    fn is_colocated(&self) -> bool {
        let c = &self.coordinates;
        match self.kind {
            GraphicKind::OptionalLine => c[0].approx_eq(c[1]) || c[2].approx_eq(c[3]),
            _ => (0..c.len()).any(|i| (i + 1..c.len()).any(|j| c[i].approx_eq(c[j]))),
        }
    }
}

impl Geometric for Reference {
    fn points(&self) -> Vec<Vector3d> {
        vec![self.matrix.position()]
    }

    fn is_colocated(&self) -> bool {
        // a singular matrix collapses the referenced geometry
        self.matrix.determinant3().abs() <= EPSILON
    }
}

/// Elements that carry a colour code.
pub trait Colourable {
    fn colour_value(&self) -> u32;

    /// Replaced by the caller's colour when emitted.
    fn is_overrideable(&self) -> bool {
        self.colour_value() == MAIN_COLOUR
    }
}

impl Colourable for Graphic {
    fn colour_value(&self) -> u32 {
        self.colour
    }
}

impl Colourable for Reference {
    fn colour_value(&self) -> u32 {
        self.colour
    }
}

/// One arena slot.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: ObjectId,
    pub(crate) uuid: Uuid,
    pub(crate) data: NodeData,
    pub(crate) parent: Option<ObjectId>,
    pub(crate) children: Vec<ObjectId>,
    pub(crate) group: Option<ObjectId>,
    pub(crate) local_lock: bool,
    pub(crate) frozen: bool,
    pub(crate) read_only: bool,
    pub(crate) state: NodeState,
}

impl Node {
    pub(crate) fn new(id: ObjectId, data: NodeData) -> Self {
        Self {
            id,
            uuid: Uuid::new_v4(),
            data,
            parent: None,
            children: Vec::new(),
            group: None,
            local_lock: false,
            frozen: false,
            read_only: false,
            state: NodeState::Live,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn kind(&self) -> ElementKind {
        self.data.kind()
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    pub fn group(&self) -> Option<ObjectId> {
        self.group
    }

    pub fn is_local_lock(&self) -> bool {
        self.local_lock
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state != NodeState::Disposed
    }

    pub fn as_graphic(&self) -> Option<&Graphic> {
        match &self.data {
            NodeData::Graphic(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match &self.data {
            NodeData::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_page(&self) -> Option<&PageData> {
        match &self.data {
            NodeData::Page(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupData> {
        match &self.data {
            NodeData::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_colour(&self) -> Option<&ColourData> {
        match &self.data {
            NodeData::Colour(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_material(&self) -> Option<&Material> {
        match &self.data {
            NodeData::Material(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_comment(&self) -> Option<&CommentData> {
        match &self.data {
            NodeData::Comment(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_line_colocation() {
        let v = Vector3d::new(1.0, 0.0, 0.0);
        let line = Graphic::new(GraphicKind::Line, 24, smallvec![v, v]);
        assert!(line.is_colocated());

        let line = Graphic::new(
            GraphicKind::Line,
            24,
            smallvec![v, Vector3d::new(2.0, 0.0, 0.0)],
        );
        assert!(!line.is_colocated());
    }

    #[test]
    fn test_optional_line_bounds_ignore_controls() {
        let line = Graphic::new(
            GraphicKind::OptionalLine,
            24,
            smallvec![
                Vector3d::new(0.0, 0.0, 0.0),
                Vector3d::new(1.0, 1.0, 0.0),
                Vector3d::new(-5.0, 0.0, 0.0),
                Vector3d::new(5.0, 9.0, 0.0),
            ],
        );
        let bounds = line.bounding_box().unwrap();
        assert_eq!(bounds.max, Vector3d::new(1.0, 1.0, 0.0));
        assert_eq!(bounds.min, Vector3d::ZERO);
    }

    #[test]
    fn test_overrideable_colour() {
        let tri = Graphic::new(GraphicKind::Triangle, MAIN_COLOUR, Coordinates::new());
        assert!(tri.is_overrideable());
        let reference = Reference::new(4, Matrix4d::IDENTITY, "3001.dat".into());
        assert!(!reference.is_overrideable());
    }

    #[test]
    fn test_descriptor_counts() {
        assert_eq!(GraphicKind::Line.coordinates_count(), 2);
        assert_eq!(GraphicKind::Triangle.coordinates_count(), 3);
        assert_eq!(GraphicKind::Quadrilateral.coordinates_count(), 4);
        assert_eq!(GraphicKind::OptionalLine.coordinates_count(), 4);
    }
}
