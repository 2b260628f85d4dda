//! Validated image transformation options.

pub const MAX_DIMENSION: u32 = 4096;
pub const DEFAULT_QUALITY: u8 = 85;

/// How the rendition is fitted into the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    ScaleDown,
    Contain,
    Cover,
    Crop,
    Pad,
}

impl Fit {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scale-down" => Some(Self::ScaleDown),
            "contain" => Some(Self::Contain),
            "cover" => Some(Self::Cover),
            "crop" => Some(Self::Crop),
            "pad" => Some(Self::Pad),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScaleDown => "scale-down",
            Self::Contain => "contain",
            Self::Cover => "cover",
            Self::Crop => "crop",
            Self::Pad => "pad",
        }
    }
}

/// Binary output formats the transformation service can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    WebP,
    Avif,
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "webp" => Some(Self::WebP),
            "avif" => Some(Self::Avif),
            "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Avif => "avif",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
            Self::Avif => "image/avif",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Transformation options accepted for one request.
///
/// Every field was validated on its own; a field that failed validation is
/// simply absent. Built once by the resolver and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: u8,
    pub fit: Option<Fit>,
    pub format: Option<OutputFormat>,
}

impl TransformRequest {
    /// Options as `(name, value)` pairs in a fixed order.
    ///
    /// Used both as the query string sent to the transformation service and
    /// as the canonical form when deriving rendition entity tags.
    pub fn options(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(5);
        if let Some(width) = self.width {
            pairs.push(("width", width.to_string()));
        }
        if let Some(height) = self.height {
            pairs.push(("height", height.to_string()));
        }
        pairs.push(("quality", self.quality.to_string()));
        if let Some(fit) = self.fit {
            pairs.push(("fit", fit.as_str().to_string()));
        }
        if let Some(format) = self.format {
            pairs.push(("format", format.as_str().to_string()));
        }
        pairs
    }

    pub fn canonical(&self) -> String {
        self.options()
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}
