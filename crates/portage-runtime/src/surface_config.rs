#![forbid(unsafe_code)]

//! Typed per-surface presentation options.
//!
//! Application code hands over loosely typed props (booleans that arrive as
//! `0`/`1`, indices that arrive as strings). [`SurfaceConfig::from_props`]
//! validates and coerces them exactly once; everything downstream reads the
//! typed struct.
//!
//! # Recognized keys
//!
//! | Key | Accepted values |
//! |-----|-----------------|
//! | `transitionStyle` | `"automatic"`, `"sheet"`, `"fullScreen"`, `"overFullScreen"`, `"fade"` |
//! | `capturesStatusBar`, `definesPresentationContext`, `isDismissible`, `allowsBackgroundDismiss` | bool, `0`/`1`, `"true"`/`"false"` |
//! | `detents` | list of `"small"`/`"medium"`/`"large"` or fractions in `(0, 1]` |
//! | `selectedDetentIndex` | whole number or numeric string |
//! | `cornerRadius`, `contentGap` | non-negative number |
//! | `header` | `{title, prefixActions, suffixActions, adaptive}` or `null` |
//!
//! `null` means "use the default". Unknown keys are ignored.

use std::fmt;

use portage_core::logging::TARGET_SURFACE;
use portage_layout::Detent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Native transition used to bring a surface on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitionStyle {
    /// Let the host pick.
    #[default]
    Automatic,
    Sheet,
    FullScreen,
    OverFullScreen,
    Fade,
}

impl TransitionStyle {
    /// Parse a prop value; matching ignores case.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "automatic" | "default" => Some(Self::Automatic),
            "sheet" | "pagesheet" | "formsheet" => Some(Self::Sheet),
            "fullscreen" => Some(Self::FullScreen),
            "overfullscreen" => Some(Self::OverFullScreen),
            "fade" | "crossdissolve" => Some(Self::Fade),
            _ => None,
        }
    }
}

/// A tappable action in the surface header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderAction {
    /// Identifier reported back in `onHeaderAction`.
    pub id: String,
    pub title: String,
}

impl HeaderAction {
    /// An action whose id is its title.
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: title.clone(),
            title,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Which side of the header an action lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaderSlot {
    Prefix,
    Suffix,
}

impl HeaderSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
        }
    }
}

/// Fixed header band drawn above surface content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeaderConfig {
    pub title: Option<String>,
    pub prefix_actions: Vec<HeaderAction>,
    pub suffix_actions: Vec<HeaderAction>,
    /// Let the host collapse the header on compact size classes.
    pub adaptive: bool,
}

impl HeaderConfig {
    /// Actions in `slot`.
    pub fn actions(&self, slot: HeaderSlot) -> &[HeaderAction] {
        match slot {
            HeaderSlot::Prefix => &self.prefix_actions,
            HeaderSlot::Suffix => &self.suffix_actions,
        }
    }
}

/// Presentation options for one surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SurfaceConfig {
    pub transition_style: TransitionStyle,
    pub captures_status_bar: bool,
    pub defines_presentation_context: bool,
    /// Resting heights, smallest first. Empty means the host default.
    pub detents: Vec<Detent>,
    pub selected_detent_index: Option<usize>,
    pub corner_radius: Option<f64>,
    /// Whether drag-to-dismiss and backdrop taps may close the surface.
    pub is_dismissible: bool,
    /// Whether a tap outside the surface dismisses it.
    pub allows_background_dismiss: bool,
    pub header: Option<HeaderConfig>,
    /// Vertical gap between stacked content nodes.
    pub content_gap: f64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            transition_style: TransitionStyle::Automatic,
            captures_status_bar: false,
            defines_presentation_context: false,
            detents: Vec::new(),
            selected_detent_index: None,
            corner_radius: None,
            is_dismissible: true,
            allows_background_dismiss: false,
            header: None,
            content_gap: 0.0,
        }
    }
}

impl SurfaceConfig {
    #[must_use]
    pub fn transition_style(mut self, style: TransitionStyle) -> Self {
        self.transition_style = style;
        self
    }

    #[must_use]
    pub fn detents(mut self, detents: impl IntoIterator<Item = Detent>) -> Self {
        self.detents = detents.into_iter().collect();
        self
    }

    #[must_use]
    pub fn selected_detent(mut self, index: usize) -> Self {
        self.selected_detent_index = Some(index);
        self
    }

    #[must_use]
    pub fn dismissible(mut self, dismissible: bool) -> Self {
        self.is_dismissible = dismissible;
        self
    }

    #[must_use]
    pub fn background_dismiss(mut self, allowed: bool) -> Self {
        self.allows_background_dismiss = allowed;
        self
    }

    #[must_use]
    pub fn header(mut self, header: HeaderConfig) -> Self {
        self.header = Some(header);
        self
    }

    #[must_use]
    pub fn content_gap(mut self, gap: f64) -> Self {
        self.content_gap = gap;
        self
    }

    /// Detents in effect: the configured list, or `[Large]` when empty.
    pub fn effective_detents(&self) -> Vec<Detent> {
        if self.detents.is_empty() {
            vec![Detent::Large]
        } else {
            self.detents.clone()
        }
    }

    /// Detent at `index` among the effective detents.
    pub fn detent_at(&self, index: usize) -> Option<Detent> {
        self.effective_detents().get(index).copied()
    }

    /// Header action at `index` in `slot`.
    pub fn header_action(&self, slot: HeaderSlot, index: usize) -> Option<&HeaderAction> {
        self.header.as_ref()?.actions(slot).get(index)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), SurfaceConfigError> {
        let detent_count = self.detents.len().max(1);
        if let Some(index) = self.selected_detent_index
            && index >= detent_count
        {
            return Err(SurfaceConfigError::new(
                "selectedDetentIndex",
                "index within detents",
                format!("{index} with {detent_count} detent(s)"),
            ));
        }
        if let Some(radius) = self.corner_radius
            && !(radius.is_finite() && radius >= 0.0)
        {
            return Err(SurfaceConfigError::new(
                "cornerRadius",
                "non-negative number",
                radius.to_string(),
            ));
        }
        if !(self.content_gap.is_finite() && self.content_gap >= 0.0) {
            return Err(SurfaceConfigError::new(
                "contentGap",
                "non-negative number",
                self.content_gap.to_string(),
            ));
        }
        Ok(())
    }

    /// Build a config from raw application props.
    pub fn from_props(props: &Map<String, Value>) -> Result<Self, SurfaceConfigError> {
        let mut config = Self::default();
        for (key, value) in props {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "transitionStyle" => {
                    let raw = coerce_string(key, value)?;
                    config.transition_style = TransitionStyle::parse(&raw).ok_or_else(|| {
                        SurfaceConfigError::new(key, "transition style name", describe(value))
                    })?;
                }
                "capturesStatusBar" => config.captures_status_bar = coerce_bool(key, value)?,
                "definesPresentationContext" => {
                    config.defines_presentation_context = coerce_bool(key, value)?;
                }
                "isDismissible" => config.is_dismissible = coerce_bool(key, value)?,
                "allowsBackgroundDismiss" => {
                    config.allows_background_dismiss = coerce_bool(key, value)?;
                }
                "detents" => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| SurfaceConfigError::new(key, "array", describe(value)))?;
                    config.detents = items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| coerce_detent(&format!("detents[{i}]"), item))
                        .collect::<Result<_, _>>()?;
                }
                "selectedDetentIndex" => {
                    config.selected_detent_index = Some(coerce_index(key, value)?);
                }
                "cornerRadius" => config.corner_radius = Some(coerce_extent(key, value)?),
                "contentGap" => config.content_gap = coerce_extent(key, value)?,
                "header" => config.header = Some(coerce_header(value)?),
                other => debug!(target: TARGET_SURFACE, key = other, "ignoring unknown surface prop"),
            }
        }
        config.validate()?;
        Ok(config)
    }
}

/// A prop had the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceConfigError {
    /// Prop path, e.g. `header.prefixActions[1]`.
    pub field: String,
    pub expected: &'static str,
    pub found: String,
}

impl SurfaceConfigError {
    fn new(field: impl Into<String>, expected: &'static str, found: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            expected,
            found: found.into(),
        }
    }
}

impl fmt::Display for SurfaceConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid surface prop '{}': expected {}, found {}",
            self.field, self.expected, self.found
        )
    }
}

impl std::error::Error for SurfaceConfigError {}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("bool {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(items) => format!("array of {}", items.len()),
        Value::Object(_) => "object".into(),
    }
}

fn coerce_bool(field: &str, value: &Value) -> Result<bool, SurfaceConfigError> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 0.0 => Some(false),
            Some(v) if v == 1.0 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or_else(|| SurfaceConfigError::new(field, "boolean", describe(value)))
}

fn coerce_index(field: &str, value: &Value) -> Result<usize, SurfaceConfigError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= u32::MAX as f64)
                .map(|v| v as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| SurfaceConfigError::new(field, "non-negative integer", describe(value)))
}

fn coerce_extent(field: &str, value: &Value) -> Result<f64, SurfaceConfigError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| SurfaceConfigError::new(field, "non-negative number", describe(value)))
}

fn coerce_string(field: &str, value: &Value) -> Result<String, SurfaceConfigError> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| SurfaceConfigError::new(field, "string", describe(value)))
}

fn coerce_detent(field: &str, value: &Value) -> Result<Detent, SurfaceConfigError> {
    let parsed = match value {
        Value::String(s) => Detent::from_name(s).or_else(|| s.trim().parse::<f64>().ok().and_then(Detent::custom)),
        Value::Number(n) => n.as_f64().and_then(Detent::custom),
        _ => None,
    };
    parsed.ok_or_else(|| {
        SurfaceConfigError::new(field, "small, medium, large, or a fraction in (0, 1]", describe(value))
    })
}

fn coerce_header(value: &Value) -> Result<HeaderConfig, SurfaceConfigError> {
    let object = value
        .as_object()
        .ok_or_else(|| SurfaceConfigError::new("header", "object", describe(value)))?;
    let mut header = HeaderConfig::default();
    for (key, item) in object {
        if item.is_null() {
            continue;
        }
        let path = format!("header.{key}");
        match key.as_str() {
            "title" => header.title = Some(coerce_string(&path, item)?),
            "adaptive" => header.adaptive = coerce_bool(&path, item)?,
            "prefixActions" => header.prefix_actions = coerce_actions(&path, item)?,
            "suffixActions" => header.suffix_actions = coerce_actions(&path, item)?,
            other => debug!(target: TARGET_SURFACE, key = other, "ignoring unknown header prop"),
        }
    }
    Ok(header)
}

fn coerce_actions(field: &str, value: &Value) -> Result<Vec<HeaderAction>, SurfaceConfigError> {
    let items = value
        .as_array()
        .ok_or_else(|| SurfaceConfigError::new(field, "array", describe(value)))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let path = format!("{field}[{i}]");
            match item {
                Value::String(title) => Ok(HeaderAction::new(title.clone())),
                Value::Object(fields) => {
                    let title = fields
                        .get("title")
                        .ok_or_else(|| SurfaceConfigError::new(format!("{path}.title"), "string", "nothing"))
                        .and_then(|t| coerce_string(&format!("{path}.title"), t))?;
                    let action = HeaderAction::new(title);
                    match fields.get("id").filter(|id| !id.is_null()) {
                        Some(id) => Ok(action.with_id(coerce_string(&format!("{path}.id"), id)?)),
                        None => Ok(action),
                    }
                }
                other => Err(SurfaceConfigError::new(path, "string or action object", describe(other))),
            }
        })
        .collect()
}
