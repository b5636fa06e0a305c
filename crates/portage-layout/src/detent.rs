#![forbid(unsafe_code)]

//! Sheet detents: the resting heights a surface may snap to.

use serde::{Deserialize, Serialize};

/// A resting height expressed as a fraction of the surface container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detent {
    /// A quarter of the container.
    Small,
    /// Half of the container.
    Medium,
    /// The full container.
    Large,
    /// An arbitrary fraction in `(0, 1]`.
    Custom(f64),
}

impl Detent {
    /// Build a custom detent.
    ///
    /// Returns `None` for non-finite or non-positive fractions; fractions above
    /// one clamp to one.
    pub fn custom(fraction: f64) -> Option<Self> {
        if !fraction.is_finite() || fraction <= 0.0 {
            return None;
        }
        Some(Self::Custom(fraction.min(1.0)))
    }

    /// Parse a detent name (`small`, `medium`, `large`), case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            _ => None,
        }
    }

    /// Fraction of the container height, always in `(0, 1]`.
    pub fn fraction(self) -> f64 {
        match self {
            Self::Small => 0.25,
            Self::Medium => 0.5,
            Self::Large => 1.0,
            Self::Custom(f) if f.is_finite() && f > 0.0 => f.min(1.0),
            Self::Custom(_) => 1.0,
        }
    }

    /// Height in points for a container of `container_height` points.
    pub fn resolve(self, container_height: f64) -> f64 {
        let container = if container_height.is_finite() {
            container_height.max(0.0)
        } else {
            0.0
        };
        container * self.fraction()
    }

    /// Short label used in event payloads.
    pub fn label(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Custom(_) => "custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_fractions() {
        assert_eq!(Detent::Small.fraction(), 0.25);
        assert_eq!(Detent::Medium.fraction(), 0.5);
        assert_eq!(Detent::Large.fraction(), 1.0);
    }

    #[test]
    fn custom_rejects_out_of_range() {
        assert_eq!(Detent::custom(0.0), None);
        assert_eq!(Detent::custom(-0.3), None);
        assert_eq!(Detent::custom(f64::NAN), None);
        assert_eq!(Detent::custom(1.7), Some(Detent::Custom(1.0)));
        assert_eq!(Detent::custom(0.4), Some(Detent::Custom(0.4)));
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!(Detent::from_name("Medium"), Some(Detent::Medium));
        assert_eq!(Detent::from_name(" large "), Some(Detent::Large));
        assert_eq!(Detent::from_name("huge"), None);
    }

    #[test]
    fn resolve_scales_container() {
        assert_eq!(Detent::Medium.resolve(800.0), 400.0);
        assert_eq!(Detent::Small.resolve(-10.0), 0.0);
        assert_eq!(Detent::Custom(0.75).resolve(400.0), 300.0);
    }

    #[test]
    fn stray_custom_value_falls_back_to_full_height() {
        assert_eq!(Detent::Custom(-2.0).fraction(), 1.0);
    }

    #[test]
    fn serde_uses_snake_case_names() {
        assert_eq!(serde_json::to_string(&Detent::Medium).unwrap(), "\"medium\"");
        let custom: Detent = serde_json::from_str(r#"{"custom":0.3}"#).unwrap();
        assert_eq!(custom, Detent::Custom(0.3));
    }
}
