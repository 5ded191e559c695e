//! Utility functions for code generation and library classification

use serde::{Deserialize, Serialize};

/// Shortest decimal text for a coordinate, rounded to six places.
///
/// `1.0` -> `"1"`, `0.5` -> `"0.5"`, `-0.0` -> `"0"`.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 1_000_000.0).round() / 1_000_000.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{}", rounded)
}

/// Library category of a primitive, derived from its filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Unknown,
    Box,
    Chord,
    Cone,
    Cylinder,
    Disc,
    Edge,
    NDisc,
    Rect,
    Ring,
    Sphere,
    Stud,
}

/// Classify a `.dat` filename. Directories and case are ignored.
pub fn category_from_name(name: &str) -> Category {
    let file = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(name)
        .to_ascii_lowercase();

    let Some(stem) = file.strip_suffix(".dat") else {
        return Category::Unknown;
    };

    if stem.contains("cyli") {
        return Category::Cylinder;
    }
    if stem.contains("ring") || has_numbered_suffix(stem, "r") {
        return Category::Ring;
    }
    if stem.contains("ndis") {
        return Category::NDisc;
    }
    if stem.contains("disc") {
        return Category::Disc;
    }
    if stem.contains("edge") {
        return Category::Edge;
    }
    if stem.contains("chrd") {
        return Category::Chord;
    }
    if stem.contains("sph") {
        return Category::Sphere;
    }
    if has_numbered_marker(stem, "con") {
        return Category::Cone;
    }
    if stem.starts_with("stu") {
        return Category::Stud;
    }
    if stem.starts_with("box") {
        return Category::Box;
    }
    if stem.starts_with("rect") {
        return Category::Rect;
    }

    Category::Unknown
}

/// `stem` ends with `marker` followed by one or more digits (`4-4r28`).
fn has_numbered_suffix(stem: &str, marker: &str) -> bool {
    let digits = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    digits.len() < stem.len() && digits.ends_with(marker)
}

/// `marker` occurs somewhere followed directly by a digit (`4-4con12`).
fn has_numbered_marker(stem: &str, marker: &str) -> bool {
    stem.match_indices(marker).any(|(at, _)| {
        stem[at + marker.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(-12.25), "-12.25");
        assert_eq!(format_number(0.1234567), "0.123457");
        assert_eq!(format_number(1e-9), "0");
    }

    #[test]
    fn test_category_from_name() {
        assert_eq!(category_from_name("4-4cyli.dat"), Category::Cylinder);
        assert_eq!(category_from_name("p/1-4ring3.dat"), Category::Ring);
        assert_eq!(category_from_name("4-4r28.dat"), Category::Ring);
        assert_eq!(category_from_name("1-4ndis.dat"), Category::NDisc);
        assert_eq!(category_from_name("2-4DISC.DAT"), Category::Disc);
        assert_eq!(category_from_name("4-4edge.dat"), Category::Edge);
        assert_eq!(category_from_name("1-8chrd.dat"), Category::Chord);
        assert_eq!(category_from_name("1-8sphe.dat"), Category::Sphere);
        assert_eq!(category_from_name("4-4con12.dat"), Category::Cone);
        assert_eq!(category_from_name("stud4.dat"), Category::Stud);
        assert_eq!(category_from_name("box5.dat"), Category::Box);
        assert_eq!(category_from_name("rect2p.dat"), Category::Rect);
        assert_eq!(category_from_name("3001.dat"), Category::Unknown);
        assert_eq!(category_from_name("4-4cyli.ldr"), Category::Unknown);
    }
}
