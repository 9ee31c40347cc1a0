//! MIME types and display data.
//!
//! A result can be rendered in several formats at once (plain text, HTML, an
//! image, ...).  Each rendering is one [`DisplayData`] entry; the frontend
//! picks the richest one it understands.
//!
//! [`MimeType`] is a closed set of well-known types plus an explicit
//! [`MimeType::Unknown`] leaf.  Parsing never fails: any string that is not in
//! the table below is carried verbatim inside `Unknown`.
//!
//! | Variant      | Wire string              |
//! |--------------|--------------------------|
//! | `PlainText`  | `text/plain`             |
//! | `Html`       | `text/html`              |
//! | `Markdown`   | `text/markdown`          |
//! | `Png`        | `image/png`              |
//! | `Jpeg`       | `image/jpeg`             |
//! | `Svg`        | `image/svg+xml`          |
//! | `Latex`      | `text/latex`             |
//! | `Javascript` | `application/javascript` |
//! | `Json`       | `application/json`       |

use std::fmt;

/// Pixel dimensions attached to raster image MIME types.
///
/// Dimensions are not part of the MIME string; on the wire they travel in the
/// display payload's `metadata` object.  A zero size means "unspecified".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` when neither dimension has been set.
    pub fn is_unspecified(&self) -> bool {
        self.width == 0 && self.height == 0
    }
}

/// A rendering format for display data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MimeType {
    PlainText,
    Html,
    Markdown,
    Png(ImageSize),
    Jpeg(ImageSize),
    Svg,
    Latex,
    Javascript,
    Json,
    /// Any MIME string outside the table, kept exactly as received.
    Unknown(String),
}

impl MimeType {
    /// Returns the canonical wire string.
    pub fn as_str(&self) -> &str {
        match self {
            MimeType::PlainText => "text/plain",
            MimeType::Html => "text/html",
            MimeType::Markdown => "text/markdown",
            MimeType::Png(_) => "image/png",
            MimeType::Jpeg(_) => "image/jpeg",
            MimeType::Svg => "image/svg+xml",
            MimeType::Latex => "text/latex",
            MimeType::Javascript => "application/javascript",
            MimeType::Json => "application/json",
            MimeType::Unknown(raw) => raw,
        }
    }

    /// Parses a wire string.  Unrecognised strings become [`MimeType::Unknown`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use nbkernel_core::protocol::mime::MimeType;
    ///
    /// assert_eq!(MimeType::parse("text/html"), MimeType::Html);
    /// assert_eq!(
    ///     MimeType::parse("application/vnd.custom"),
    ///     MimeType::Unknown("application/vnd.custom".to_string())
    /// );
    /// ```
    pub fn parse(raw: &str) -> Self {
        match raw {
            "text/plain" => MimeType::PlainText,
            "text/html" => MimeType::Html,
            "text/markdown" => MimeType::Markdown,
            "image/png" => MimeType::Png(ImageSize::default()),
            "image/jpeg" => MimeType::Jpeg(ImageSize::default()),
            "image/svg+xml" => MimeType::Svg,
            "text/latex" => MimeType::Latex,
            "application/javascript" => MimeType::Javascript,
            "application/json" => MimeType::Json,
            other => MimeType::Unknown(other.to_string()),
        }
    }

    /// Image dimensions for raster types, `None` for everything else.
    pub fn image_size(&self) -> Option<ImageSize> {
        match self {
            MimeType::Png(size) | MimeType::Jpeg(size) => Some(*size),
            _ => None,
        }
    }

    /// Returns a copy with the image size replaced.  Non-image types are
    /// returned unchanged.
    pub fn with_image_size(self, size: ImageSize) -> Self {
        match self {
            MimeType::Png(_) => MimeType::Png(size),
            MimeType::Jpeg(_) => MimeType::Jpeg(size),
            other => other,
        }
    }

    /// Whether payloads of this type are JSON documents rather than text.
    pub fn is_json(&self) -> bool {
        match self {
            MimeType::Json => true,
            MimeType::Unknown(raw) => raw.ends_with("+json"),
            _ => false,
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MimeType {
    fn from(raw: &str) -> Self {
        MimeType::parse(raw)
    }
}

/// One rendering of a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayData {
    pub mime: MimeType,
    pub content: String,
}

impl DisplayData {
    pub fn new(mime: MimeType, content: impl Into<String>) -> Self {
        Self {
            mime,
            content: content.into(),
        }
    }

    /// Shorthand for a `text/plain` rendering.
    pub fn plain(content: impl Into<String>) -> Self {
        Self::new(MimeType::PlainText, content)
    }
}

/// Returns the first `text/plain` rendering, or an empty string if there is none.
///
/// # Examples
///
/// ```rust
/// use nbkernel_core::protocol::mime::{extract_plain, DisplayData, ImageSize, MimeType};
///
/// let data = vec![
///     DisplayData::new(MimeType::Png(ImageSize::new(10, 10)), "iVBORw0..."),
///     DisplayData::plain("hello"),
/// ];
/// assert_eq!(extract_plain(&data), "hello");
/// assert_eq!(extract_plain(&[]), "");
/// ```
pub fn extract_plain(data: &[DisplayData]) -> String {
    data.iter()
        .find(|d| d.mime == MimeType::PlainText)
        .map(|d| d.content.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_types() -> Vec<MimeType> {
        vec![
            MimeType::PlainText,
            MimeType::Html,
            MimeType::Markdown,
            MimeType::Png(ImageSize::default()),
            MimeType::Jpeg(ImageSize::default()),
            MimeType::Svg,
            MimeType::Latex,
            MimeType::Javascript,
            MimeType::Json,
        ]
    }

    #[test]
    fn test_every_named_type_survives_show_then_parse() {
        for mime in named_types() {
            let shown = mime.to_string();
            assert_eq!(MimeType::parse(&shown), mime, "round trip failed for {shown}");
        }
    }

    #[test]
    fn test_named_types_have_distinct_strings() {
        let types = named_types();
        let mut strings: Vec<&str> = types.iter().map(MimeType::as_str).collect();
        strings.sort_unstable();
        strings.dedup();
        assert_eq!(strings.len(), named_types().len());
    }

    #[test]
    fn test_unknown_string_round_trips_unchanged() {
        let raw = "application/vnd.jupyter.widget-view+json";

        let parsed = MimeType::parse(raw);

        assert_eq!(parsed, MimeType::Unknown(raw.to_string()));
        assert_eq!(parsed.as_str(), raw);
    }

    #[test]
    fn test_image_size_is_not_part_of_the_wire_string() {
        let png = MimeType::Png(ImageSize::new(640, 480));

        assert_eq!(png.as_str(), "image/png");
        assert_eq!(png.image_size(), Some(ImageSize::new(640, 480)));
        assert_eq!(MimeType::Html.image_size(), None);
    }

    #[test]
    fn test_with_image_size_only_touches_raster_types() {
        let size = ImageSize::new(3, 4);

        assert_eq!(
            MimeType::parse("image/jpeg").with_image_size(size),
            MimeType::Jpeg(size)
        );
        assert_eq!(MimeType::Svg.with_image_size(size), MimeType::Svg);
    }

    #[test]
    fn test_is_json_covers_json_suffix_types() {
        assert!(MimeType::Json.is_json());
        assert!(MimeType::parse("application/vnd.vegalite.v5+json").is_json());
        assert!(!MimeType::PlainText.is_json());
        assert!(!MimeType::parse("application/x-custom").is_json());
    }

    #[test]
    fn test_extract_plain_picks_plain_entry_among_mixed() {
        // Arrange
        let data = vec![
            DisplayData::new(MimeType::Png(ImageSize::default()), "…"),
            DisplayData::plain("hello"),
        ];

        // Act / Assert
        assert_eq!(extract_plain(&data), "hello");
    }

    #[test]
    fn test_extract_plain_returns_first_plain_entry() {
        let data = vec![DisplayData::plain("first"), DisplayData::plain("second")];
        assert_eq!(extract_plain(&data), "first");
    }

    #[test]
    fn test_extract_plain_is_empty_without_plain_entry() {
        let data = vec![
            DisplayData::new(MimeType::Html, "<b>x</b>"),
            DisplayData::new(MimeType::Markdown, "**x**"),
        ];
        assert_eq!(extract_plain(&data), "");
    }
}
