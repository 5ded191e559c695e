//! Geometry analytics and problem detection.
//!
//! Checks run on the local coordinates of an element. Quadrilateral shape is
//! classified from the turn direction at each corner: four turns the same way
//! is convex, three is concave, two is a bowtie.

use crate::colour::{is_direct_colour, EDGE_COLOUR, MAIN_COLOUR};
use crate::document::Document;
use crate::error::{DomError, Result};
use crate::geom::{BoundingBox, Vector3d, EPSILON};
use crate::node::{Graphic, GraphicKind, NodeData};
use crate::types::{CodeStandards, ObjectId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest distance of the fourth vertex from the plane of the first three.
const COPLANAR_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProblemCode {
    Colocated,
    Colinear,
    NonCoplanar,
    Bowtie,
    Concave,
    UnknownColour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

impl ProblemCode {
    /// Parts-library output is held to a stricter standard.
    pub fn severity(self, standards: CodeStandards) -> Severity {
        let strict = standards == CodeStandards::PartsLibrary;
        match self {
            ProblemCode::Colocated | ProblemCode::Colinear | ProblemCode::Bowtie => Severity::Error,
            ProblemCode::NonCoplanar | ProblemCode::Concave if strict => Severity::Error,
            ProblemCode::UnknownColour if standards != CodeStandards::Full => Severity::Error,
            _ => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub element: ObjectId,
    pub code: ProblemCode,
    pub severity: Severity,
    pub description: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?} on element {}: {}",
            self.severity, self.code, self.element, self.description
        )
    }
}

/// Shape of a quadrilateral outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuadShape {
    Convex,
    Concave,
    Bowtie,
}

fn colinear(a: Vector3d, b: Vector3d, c: Vector3d) -> bool {
    (b - a).cross(c - a).length() <= EPSILON
}

fn quad_shape(v: &[Vector3d]) -> QuadShape {
    let turn = |i: usize| {
        let e1 = v[(i + 1) % 4] - v[i];
        let e2 = v[(i + 2) % 4] - v[(i + 1) % 4];
        e1.cross(e2)
    };
    let reference = turn(0);
    let same = (0..4).filter(|&i| turn(i).dot(reference) > 0.0).count();
    match same {
        4 | 0 => QuadShape::Convex,
        2 => QuadShape::Bowtie,
        _ => QuadShape::Concave,
    }
}

fn quad_coplanar(v: &[Vector3d]) -> bool {
    let normal = (v[1] - v[0]).cross(v[2] - v[0]);
    let length = normal.length();
    if length <= EPSILON {
        return true;
    }
    (normal * (1.0 / length)).dot(v[3] - v[0]).abs() <= COPLANAR_TOLERANCE
}

impl Document {
    fn graphic(&self, id: ObjectId) -> Result<&Graphic> {
        let node = self.node(id)?;
        node.as_graphic()
            .ok_or_else(|| DomError::wrong_kind("Graphic", node.kind()))
    }

    /// Two defining points coincide. For a reference: its matrix is singular.
    pub fn is_colocated(&self, id: ObjectId) -> Result<bool> {
        let node = self.node(id)?;
        let geometric = node
            .data
            .as_geometric()
            .ok_or_else(|| DomError::wrong_kind("Graphic or Reference", node.kind()))?;
        Ok(geometric.is_colocated())
    }

    /// Three consecutive vertices of a triangle or quadrilateral lie on one line.
    pub fn is_colinear(&self, id: ObjectId) -> Result<bool> {
        let graphic = self.graphic(id)?;
        let v = &graphic.coordinates;
        Ok(match graphic.kind {
            GraphicKind::Triangle => colinear(v[0], v[1], v[2]),
            GraphicKind::Quadrilateral => {
                (0..4).any(|i| colinear(v[i], v[(i + 1) % 4], v[(i + 2) % 4]))
            }
            GraphicKind::Line | GraphicKind::OptionalLine => false,
        })
    }

    pub fn is_coplanar(&self, id: ObjectId) -> Result<bool> {
        let graphic = self.graphic(id)?;
        Ok(match graphic.kind {
            GraphicKind::Quadrilateral => quad_coplanar(&graphic.coordinates),
            _ => true,
        })
    }

    pub fn is_convex(&self, id: ObjectId) -> Result<bool> {
        let graphic = self.graphic(id)?;
        Ok(match graphic.kind {
            GraphicKind::Quadrilateral => quad_shape(&graphic.coordinates) == QuadShape::Convex,
            _ => true,
        })
    }

    /// The outline of a quadrilateral crosses itself.
    pub fn is_bowtie(&self, id: ObjectId) -> Result<bool> {
        let graphic = self.graphic(id)?;
        Ok(match graphic.kind {
            GraphicKind::Quadrilateral => quad_shape(&graphic.coordinates) == QuadShape::Bowtie,
            _ => false,
        })
    }

    /// Bounds in local space. Collections and groups take the union of
    /// their contents; elements without geometry have none.
    pub fn bounding_box(&self, id: ObjectId) -> Result<Option<BoundingBox>> {
        let node = self.node(id)?;
        if let Some(geometric) = node.data.as_geometric() {
            return Ok(geometric.bounding_box());
        }
        let parts = match node.data {
            NodeData::Group(_) => self.group_members(id)?,
            _ => node.children.clone(),
        };
        let mut bounds: Option<BoundingBox> = None;
        for part in parts {
            if let Some(b) = self.bounding_box(part)? {
                bounds = Some(match bounds {
                    Some(existing) => existing.union(b),
                    None => b,
                });
            }
        }
        Ok(bounds)
    }

    /// Every problem in the subtree at `id`, in document order.
    pub fn problems(&self, id: ObjectId, standards: CodeStandards) -> Result<Vec<Problem>> {
        let mut found = Vec::new();
        for element in self.arena.subtree(id)? {
            self.element_problems(element, standards, &mut found)?;
        }
        Ok(found)
    }

    pub fn has_problems(&self, id: ObjectId, standards: CodeStandards) -> Result<bool> {
        Ok(!self.problems(id, standards)?.is_empty())
    }

    fn element_problems(
        &self,
        id: ObjectId,
        standards: CodeStandards,
        found: &mut Vec<Problem>,
    ) -> Result<()> {
        let node = self.node(id)?;
        let mut report = |code: ProblemCode, description: String| {
            found.push(Problem {
                element: id,
                code,
                severity: code.severity(standards),
                description,
            });
        };

        if let Some(colourable) = node.data.as_colourable() {
            let code = colourable.colour_value();
            let known = code == MAIN_COLOUR
                || code == EDGE_COLOUR
                || is_direct_colour(code)
                || self.palette().contains(code)
                || self.local_colour(id, code).is_some();
            if !known {
                report(ProblemCode::UnknownColour, format!("colour {} is not defined", code));
            }
        }

        match &node.data {
            NodeData::Reference(_) => {
                if self.is_colocated(id)? {
                    report(ProblemCode::Colocated, "matrix is singular".to_string());
                }
            }
            NodeData::Graphic(graphic) => {
                if self.is_colocated(id)? {
                    report(ProblemCode::Colocated, "vertices coincide".to_string());
                    // the remaining checks say nothing useful about a collapsed shape
                    return Ok(());
                }
                if self.is_colinear(id)? {
                    report(ProblemCode::Colinear, "vertices lie on one line".to_string());
                    return Ok(());
                }
                if graphic.kind == GraphicKind::Quadrilateral {
                    if !quad_coplanar(&graphic.coordinates) {
                        report(ProblemCode::NonCoplanar, "vertices are not coplanar".to_string());
                    }
                    match quad_shape(&graphic.coordinates) {
                        QuadShape::Bowtie => {
                            report(ProblemCode::Bowtie, "outline crosses itself".to_string())
                        }
                        QuadShape::Concave => {
                            report(ProblemCode::Concave, "outline is concave".to_string())
                        }
                        QuadShape::Convex => {}
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colour::Rgba;
    use crate::geom::Matrix4d;

    fn v(x: f64, y: f64, z: f64) -> Vector3d {
        Vector3d::new(x, y, z)
    }

    #[test]
    fn test_colocated_line_is_a_problem() {
        let mut doc = Document::new();
        let line = doc.create_line(24, v(1.0, 0.0, 0.0), v(1.0, 0.0, 0.0)).unwrap();
        assert!(doc.is_colocated(line).unwrap());
        assert!(doc.has_problems(line, CodeStandards::Full).unwrap());

        let problems = doc.problems(line, CodeStandards::Full).unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].code, ProblemCode::Colocated);
        assert_eq!(problems[0].severity, Severity::Error);
    }

    #[test]
    fn test_colinear_triangle() {
        let mut doc = Document::new();
        let tri = doc
            .create_triangle(4, [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(2.0, 0.0, 0.0)])
            .unwrap();
        assert!(!doc.is_colocated(tri).unwrap());
        assert!(doc.is_colinear(tri).unwrap());
    }

    #[test]
    fn test_quad_shapes() {
        let mut doc = Document::new();
        let square = doc
            .create_quadrilateral(
                4,
                [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(1.0, 1.0, 0.0), v(0.0, 1.0, 0.0)],
            )
            .unwrap();
        let bowtie = doc
            .create_quadrilateral(
                4,
                [v(0.0, 0.0, 0.0), v(1.0, 1.0, 0.0), v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0)],
            )
            .unwrap();
        let dart = doc
            .create_quadrilateral(
                4,
                [v(0.0, 0.0, 0.0), v(2.0, 0.0, 0.0), v(2.0, 2.0, 0.0), v(1.5, 0.5, 0.0)],
            )
            .unwrap();
        let warped = doc
            .create_quadrilateral(
                4,
                [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(1.0, 1.0, 0.5), v(0.0, 1.0, 0.0)],
            )
            .unwrap();

        assert!(doc.is_convex(square).unwrap());
        assert!(doc.is_coplanar(square).unwrap());
        assert!(!doc.has_problems(square, CodeStandards::PartsLibrary).unwrap());

        assert!(doc.is_bowtie(bowtie).unwrap());
        assert!(!doc.is_convex(bowtie).unwrap());

        assert!(!doc.is_convex(dart).unwrap());
        assert!(!doc.is_bowtie(dart).unwrap());
        let problems = doc.problems(dart, CodeStandards::Full).unwrap();
        assert_eq!(problems[0].code, ProblemCode::Concave);
        assert_eq!(problems[0].severity, Severity::Warning);

        assert!(!doc.is_coplanar(warped).unwrap());
    }

    #[test]
    fn test_unknown_colour() {
        let mut doc = Document::new();
        let page = doc.create_page("a.ldr").unwrap();
        let step = doc.create_step();
        doc.add(page, step).unwrap();
        let line = doc.create_line(321, v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0)).unwrap();
        doc.add(step, line).unwrap();

        let problems = doc.problems(page, CodeStandards::Full).unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].code, ProblemCode::UnknownColour);

        let colour = doc
            .create_colour("Custom", 321, Rgba::rgb(1, 2, 3), Rgba::rgb(0, 0, 0))
            .unwrap();
        doc.insert(step, 0, colour).unwrap();
        assert!(!doc.has_problems(page, CodeStandards::Full).unwrap());
    }

    #[test]
    fn test_bounding_box_of_collections() {
        let mut doc = Document::new();
        let step = doc.create_step();
        let line = doc.create_line(24, v(-1.0, 0.0, 0.0), v(1.0, 2.0, 0.0)).unwrap();
        let reference = doc
            .create_reference(16, Matrix4d::translation(v(5.0, 5.0, 5.0)), "3001.dat")
            .unwrap();
        let comment = doc.create_comment("no geometry").unwrap();
        doc.add_range(step, &[line, reference, comment]).unwrap();

        let bounds = doc.bounding_box(step).unwrap().unwrap();
        assert_eq!(bounds.min, v(-1.0, 0.0, 0.0));
        assert_eq!(bounds.max, v(5.0, 5.0, 5.0));
        assert_eq!(doc.bounding_box(comment).unwrap(), None);
        assert!(doc.is_colinear(comment).is_err());
    }

    #[test]
    fn test_singular_reference() {
        let mut doc = Document::new();
        let flat = Matrix4d::from_ldraw([0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        let reference = doc.create_reference(16, flat, "3001.dat").unwrap();
        assert!(doc.is_colocated(reference).unwrap());
        let problems = doc.problems(reference, CodeStandards::Full).unwrap();
        assert_eq!(problems[0].code, ProblemCode::Colocated);
    }
}
