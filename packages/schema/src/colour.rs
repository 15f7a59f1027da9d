use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An RGBA colour stored as the `R,G,B,A` byte-quad used in both schema and
/// document markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Colour {
    pub const WHITE: Colour = Colour::rgba(255, 255, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Colour {
    fn default() -> Self {
        Self::WHITE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseColourError(pub String);

impl fmt::Display for ParseColourError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid colour '{}'", self.0)
    }
}

impl std::error::Error for ParseColourError {}

impl FromStr for Colour {
    type Err = ParseColourError;

    /// Accepts `R,G,B`, `R,G,B,A` and `#RRGGBB` / `#RRGGBBAA`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ParseColourError(s.to_string());

        if let Some(hex) = trimmed.strip_prefix('#') {
            if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
                return Err(err());
            }
            let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
            let a = if hex.len() == 8 { byte(6)? } else { 255 };
            return Ok(Colour::rgba(byte(0)?, byte(2)?, byte(4)?, a));
        }

        let parts = trimmed
            .split(',')
            .map(|part| part.trim().parse::<u8>().map_err(|_| err()))
            .collect::<Result<Vec<_>, _>>()?;

        match parts.as_slice() {
            [r, g, b] => Ok(Colour::rgba(*r, *g, *b, 255)),
            [r, g, b, a] => Ok(Colour::rgba(*r, *g, *b, *a)),
            _ => Err(err()),
        }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.r, self.g, self.b, self.a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quads() {
        assert_eq!("10,20,30,40".parse::<Colour>().unwrap(), Colour::rgba(10, 20, 30, 40));
        assert_eq!("10, 20, 30".parse::<Colour>().unwrap(), Colour::rgba(10, 20, 30, 255));
        assert_eq!("#ff000080".parse::<Colour>().unwrap(), Colour::rgba(255, 0, 0, 128));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("red".parse::<Colour>().is_err());
        assert!("1,2".parse::<Colour>().is_err());
        assert!("300,0,0".parse::<Colour>().is_err());
        assert!("#abc".parse::<Colour>().is_err());
    }

    #[test]
    fn test_display_is_quad() {
        assert_eq!(Colour::rgba(1, 2, 3, 4).to_string(), "1,2,3,4");
    }
}
