//! Colour materials (`!COLOUR` finish clauses).

use crate::colour::Rgba;
use crate::error::{DomError, Result};
use crate::utils::format_number;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlitterParams {
    pub value: Rgba,
    pub fraction: f64,
    pub vfraction: f64,
    pub size: f64,
}

impl Default for GlitterParams {
    fn default() -> Self {
        Self {
            value: Rgba::rgb(0xFF, 0xFF, 0xFF),
            fraction: 0.17,
            vfraction: 0.2,
            size: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeckleParams {
    pub value: Rgba,
    pub fraction: f64,
    pub min_size: f64,
    pub max_size: f64,
}

impl Default for SpeckleParams {
    fn default() -> Self {
        Self {
            value: Rgba::rgb(0x89, 0x87, 0x88),
            fraction: 0.4,
            min_size: 1.0,
            max_size: 3.0,
        }
    }
}

/// Surface finish of a `Colour`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Material {
    #[default]
    Plastic,
    Chrome,
    Pearlescent,
    Rubber,
    MatteMetallic,
    Metal,
    Glitter(GlitterParams),
    Speckle(SpeckleParams),
}

/// Fractions live strictly between 0 and 1.
pub fn is_valid_fraction(value: f64) -> bool {
    value > 0.0 && value < 1.0
}

impl Material {
    pub fn name(&self) -> &'static str {
        match self {
            Material::Plastic => "Plastic",
            Material::Chrome => "Chrome",
            Material::Pearlescent => "Pearlescent",
            Material::Rubber => "Rubber",
            Material::MatteMetallic => "MatteMetallic",
            Material::Metal => "Metal",
            Material::Glitter(_) => "Glitter",
            Material::Speckle(_) => "Speckle",
        }
    }

    pub fn value(&self) -> Option<Rgba> {
        match self {
            Material::Glitter(p) => Some(p.value),
            Material::Speckle(p) => Some(p.value),
            _ => None,
        }
    }

    pub fn fraction(&self) -> Option<f64> {
        match self {
            Material::Glitter(p) => Some(p.fraction),
            Material::Speckle(p) => Some(p.fraction),
            _ => None,
        }
    }

    /// Fractions in range, sizes positive, speckle sizes ordered.
    pub fn is_valid(&self) -> bool {
        let size = |s: f64| s > 0.0 && s.is_finite();
        match self {
            Material::Glitter(p) => {
                is_valid_fraction(p.fraction) && is_valid_fraction(p.vfraction) && size(p.size)
            }
            Material::Speckle(p) => {
                is_valid_fraction(p.fraction)
                    && size(p.min_size)
                    && size(p.max_size)
                    && p.min_size <= p.max_size
            }
            _ => true,
        }
    }

    /// The clause appended to a `!COLOUR` line. Empty for plastic.
    pub fn to_code(&self) -> String {
        match self {
            Material::Plastic => String::new(),
            Material::Chrome => "CHROME".to_string(),
            Material::Pearlescent => "PEARLESCENT".to_string(),
            Material::Rubber => "RUBBER".to_string(),
            Material::MatteMetallic => "MATTE_METALLIC".to_string(),
            Material::Metal => "METAL".to_string(),
            Material::Glitter(p) => format!(
                "MATERIAL GLITTER VALUE {}{} FRACTION {} VFRACTION {} SIZE {}",
                p.value.to_hex(),
                alpha_clause(p.value),
                format_number(p.fraction),
                format_number(p.vfraction),
                format_number(p.size)
            ),
            Material::Speckle(p) => format!(
                "MATERIAL SPECKLE VALUE {}{} FRACTION {} MINSIZE {} MAXSIZE {}",
                p.value.to_hex(),
                alpha_clause(p.value),
                format_number(p.fraction),
                format_number(p.min_size),
                format_number(p.max_size)
            ),
        }
    }

    /// Parse a finish clause, starting at its first keyword.
    pub fn parse(tokens: &[&str]) -> Result<Self> {
        let Some((keyword, rest)) = tokens.split_first() else {
            return Ok(Material::Plastic);
        };
        let simple = match keyword.to_ascii_uppercase().as_str() {
            "CHROME" => Some(Material::Chrome),
            "PEARLESCENT" => Some(Material::Pearlescent),
            "RUBBER" => Some(Material::Rubber),
            "MATTE_METALLIC" => Some(Material::MatteMetallic),
            "METAL" => Some(Material::Metal),
            "MATERIAL" => None,
            other => return Err(DomError::Format(format!("unknown material '{}'", other))),
        };
        if let Some(material) = simple {
            if !rest.is_empty() {
                return Err(DomError::Format(format!("unexpected '{}'", rest.join(" "))));
            }
            return Ok(material);
        }

        let (kind, params) = rest
            .split_first()
            .ok_or_else(|| DomError::Format("MATERIAL without a type".to_string()))?;
        match kind.to_ascii_uppercase().as_str() {
            "GLITTER" => {
                let mut p = GlitterParams::default();
                for pair in params.chunks(2) {
                    let (key, value) = key_value(pair)?;
                    match key.as_str() {
                        "VALUE" => p.value = Rgba::from_hex(value)?,
                        "ALPHA" => p.value.a = parse_number::<u8>(value)?,
                        "LUMINANCE" => {
                            parse_number::<u8>(value)?;
                        }
                        "FRACTION" => p.fraction = parse_fraction(value)?,
                        "VFRACTION" => p.vfraction = parse_fraction(value)?,
                        "SIZE" => p.size = parse_size(value)?,
                        _ => return Err(DomError::Format(format!("unknown glitter key '{}'", key))),
                    }
                }
                Ok(Material::Glitter(p))
            }
            "SPECKLE" => {
                let mut p = SpeckleParams::default();
                for pair in params.chunks(2) {
                    let (key, value) = key_value(pair)?;
                    match key.as_str() {
                        "VALUE" => p.value = Rgba::from_hex(value)?,
                        "ALPHA" => p.value.a = parse_number::<u8>(value)?,
                        "LUMINANCE" => {
                            parse_number::<u8>(value)?;
                        }
                        "FRACTION" => p.fraction = parse_fraction(value)?,
                        "MINSIZE" => p.min_size = parse_size(value)?,
                        "MAXSIZE" => p.max_size = parse_size(value)?,
                        _ => return Err(DomError::Format(format!("unknown speckle key '{}'", key))),
                    }
                }
                if p.min_size > p.max_size {
                    return Err(DomError::Format("MINSIZE exceeds MAXSIZE".to_string()));
                }
                Ok(Material::Speckle(p))
            }
            other => Err(DomError::Format(format!("unknown material type '{}'", other))),
        }
    }
}

fn alpha_clause(value: Rgba) -> String {
    if value.is_opaque() {
        String::new()
    } else {
        format!(" ALPHA {}", value.a)
    }
}

fn key_value<'a>(pair: &[&'a str]) -> Result<(String, &'a str)> {
    match pair {
        [key, value] => Ok((key.to_ascii_uppercase(), *value)),
        [key] => Err(DomError::Format(format!("'{}' has no value", key))),
        _ => Err(DomError::Format("empty material clause".to_string())),
    }
}

fn parse_number<T: std::str::FromStr>(text: &str) -> Result<T> {
    text.parse::<T>()
        .map_err(|_| DomError::Format(format!("invalid number '{}'", text)))
}

fn parse_fraction(text: &str) -> Result<f64> {
    let value = parse_number::<f64>(text)?;
    if !is_valid_fraction(value) {
        return Err(DomError::Format(format!("fraction '{}' outside (0,1)", text)));
    }
    Ok(value)
}

fn parse_size(text: &str) -> Result<f64> {
    let value = parse_number::<f64>(text)?;
    if !(value > 0.0 && value.is_finite()) {
        return Err(DomError::Format(format!("size '{}' must be positive", text)));
    }
    Ok(value)
}
