use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use utoipa::ToSchema;

/// How an image column is currently stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Empty,
    /// A resolvable reference: absolute `http(s)` URL or a site-absolute path.
    Url(String),
    /// Pre-migration payload stored inline in the row.
    Inline { mime: String, payload: String },
}

/// Serializable summary of an [`ImageRef`] for the admin UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ImageRefKind {
    Empty,
    Url,
    Inline,
}

// Leading bytes of common image formats, base64-encoded.
const BARE_BASE64_PREFIXES: &[(&str, &str)] = &[
    ("/9j/", "image/jpeg"),
    ("iVBORw0KGgo", "image/png"),
    ("R0lGOD", "image/gif"),
    ("UklGR", "image/webp"),
];

impl ImageRef {
    pub fn parse(value: Option<&str>) -> Self {
        let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return ImageRef::Empty;
        };

        if let Some(rest) = raw.strip_prefix("data:") {
            if let Some((meta, payload)) = rest.split_once(',') {
                let mime = meta
                    .split(';')
                    .next()
                    .filter(|m| !m.is_empty())
                    .unwrap_or("application/octet-stream")
                    .to_lowercase();
                return ImageRef::Inline {
                    mime,
                    payload: payload.to_string(),
                };
            }
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            return ImageRef::Url(raw.to_string());
        }

        // Checked before site-absolute paths: a bare JPEG payload starts with "/9j/".
        for (prefix, mime) in BARE_BASE64_PREFIXES {
            if raw.starts_with(prefix) {
                return ImageRef::Inline {
                    mime: mime.to_string(),
                    payload: raw.to_string(),
                };
            }
        }

        // Anything else is treated as a relative reference the storage layer can resolve.
        ImageRef::Url(raw.to_string())
    }

    pub fn kind(&self) -> ImageRefKind {
        match self {
            ImageRef::Empty => ImageRefKind::Empty,
            ImageRef::Url(_) => ImageRefKind::Url,
            ImageRef::Inline { .. } => ImageRefKind::Inline,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, ImageRef::Inline { .. })
    }

    /// Decodes an inline payload. Whitespace and line breaks inside the
    /// payload are tolerated.
    pub fn decode_inline(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        match self {
            ImageRef::Inline { payload, .. } => {
                let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
                Some(STANDARD.decode(compact))
            }
            _ => None,
        }
    }
}

/// File extension for an image MIME type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" | "image/heif" => "heic",
        _ => "bin",
    }
}
