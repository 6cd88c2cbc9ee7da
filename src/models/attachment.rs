//! Attachment payloads and the layout used to render them.
//!
//! A post or comment owns at most one attachment payload. The payload is
//! stored in an `attachment_url` / `attachment_type` column pair: either a
//! bare URL with its type, or a JSON-encoded ordered list of `{url, type}`
//! pairs in the URL column.

use serde::{Deserialize, Serialize};

/// Images beyond this count switch from a grid to a carousel.
const MAX_GRID_IMAGES: usize = 4;

/// A single attached file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    #[serde(rename = "type", default)]
    pub content_type: String,
}

/// Coarse classification used to pick a renderer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Pdf,
    Other,
}

/// How the media part of an attachment set is laid out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentLayout {
    /// Nothing attached.
    None,
    /// Exactly one image.
    Single,
    /// Two to four images.
    Grid,
    /// More than four images.
    Carousel,
    /// Only non-image files.
    Documents,
}

/// Render-ready view of an attachment set.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    pub layout: AttachmentLayout,
    pub media: Vec<Attachment>,
    pub documents: Vec<Attachment>,
}

impl Attachment {
    pub fn kind(&self) -> AttachmentKind {
        let ct = self.content_type.trim().to_ascii_lowercase();
        if ct.starts_with("image") {
            return AttachmentKind::Image;
        }
        if ct == "pdf" || ct == "application/pdf" {
            return AttachmentKind::Pdf;
        }
        if !ct.is_empty() {
            return AttachmentKind::Other;
        }

        // No declared type: fall back to the file extension.
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "svg" | "avif" => {
                AttachmentKind::Image
            }
            "pdf" => AttachmentKind::Pdf,
            _ => AttachmentKind::Other,
        }
    }
}

/// Request-side attachment payload: one attachment or an ordered list.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AttachmentPayload {
    Many(Vec<Attachment>),
    One(Attachment),
}

impl AttachmentPayload {
    pub fn into_vec(self) -> Vec<Attachment> {
        match self {
            AttachmentPayload::Many(list) => list,
            AttachmentPayload::One(single) => vec![single],
        }
    }
}

/// Decode the stored column pair into an ordered attachment list.
///
/// Unparseable JSON in the URL column is treated as a plain URL so legacy
/// rows never disappear from the feed.
pub fn attachments_from_columns(url: Option<&str>, content_type: Option<&str>) -> Vec<Attachment> {
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        return Vec::new();
    };

    if url.starts_with('[') || url.starts_with('{') {
        if let Ok(payload) = serde_json::from_str::<AttachmentPayload>(url) {
            return payload
                .into_vec()
                .into_iter()
                .filter(|a| !a.url.trim().is_empty())
                .collect();
        }
        tracing::debug!("Attachment column is not a JSON payload, using it as a URL");
    }

    vec![Attachment {
        url: url.to_string(),
        content_type: content_type.unwrap_or_default().to_string(),
    }]
}

/// Encode an attachment list into the stored column pair.
pub fn attachments_to_columns(attachments: &[Attachment]) -> (Option<String>, Option<String>) {
    match attachments {
        [] => (None, None),
        [single] => (
            Some(single.url.clone()),
            Some(single.content_type.clone()).filter(|t| !t.is_empty()),
        ),
        many => (serde_json::to_string(many).ok(), None),
    }
}

impl AttachmentView {
    pub fn from_attachments(attachments: &[Attachment]) -> Self {
        let (media, documents): (Vec<_>, Vec<_>) = attachments
            .iter()
            .cloned()
            .partition(|a| a.kind() == AttachmentKind::Image);

        let layout = match media.len() {
            0 if documents.is_empty() => AttachmentLayout::None,
            0 => AttachmentLayout::Documents,
            1 => AttachmentLayout::Single,
            n if n <= MAX_GRID_IMAGES => AttachmentLayout::Grid,
            _ => AttachmentLayout::Carousel,
        };

        Self {
            layout,
            media,
            documents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str) -> Attachment {
        Attachment {
            url: url.to_string(),
            content_type: "image/png".to_string(),
        }
    }

    #[test]
    fn test_single_url_column() {
        let list = attachments_from_columns(Some("https://cdn/x/notes.pdf"), Some("application/pdf"));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kind(), AttachmentKind::Pdf);
    }

    #[test]
    fn test_json_list_column_keeps_order() {
        let raw = r#"[{"url":"a.png","type":"image/png"},{"url":"b.pdf","type":"pdf"},{"url":"c.jpg","type":"image"}]"#;
        let list = attachments_from_columns(Some(raw), None);
        let urls: Vec<_> = list.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["a.png", "b.pdf", "c.jpg"]);
    }

    #[test]
    fn test_broken_json_falls_back_to_url() {
        let list = attachments_from_columns(Some("[not json"), Some("other"));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].url, "[not json");
    }

    #[test]
    fn test_kind_from_extension_when_type_missing() {
        let a = Attachment {
            url: "https://cdn/photo.JPG?size=large".to_string(),
            content_type: String::new(),
        };
        assert_eq!(a.kind(), AttachmentKind::Image);
    }

    #[test]
    fn test_layouts() {
        assert_eq!(
            AttachmentView::from_attachments(&[]).layout,
            AttachmentLayout::None
        );
        assert_eq!(
            AttachmentView::from_attachments(&[image("a")]).layout,
            AttachmentLayout::Single
        );
        let three: Vec<_> = (0..3).map(|i| image(&i.to_string())).collect();
        assert_eq!(
            AttachmentView::from_attachments(&three).layout,
            AttachmentLayout::Grid
        );
        let six: Vec<_> = (0..6).map(|i| image(&i.to_string())).collect();
        assert_eq!(
            AttachmentView::from_attachments(&six).layout,
            AttachmentLayout::Carousel
        );
    }

    #[test]
    fn test_mixed_payload_splits_documents() {
        let doc = Attachment {
            url: "syllabus.pdf".to_string(),
            content_type: "application/pdf".to_string(),
        };
        let view = AttachmentView::from_attachments(&[image("a"), doc.clone(), image("b")]);
        assert_eq!(view.layout, AttachmentLayout::Grid);
        assert_eq!(view.media.len(), 2);
        assert_eq!(view.documents, vec![doc.clone()]);

        let docs_only = AttachmentView::from_attachments(&[doc]);
        assert_eq!(docs_only.layout, AttachmentLayout::Documents);
    }

    #[test]
    fn test_columns_roundtrip_for_list() {
        let list = vec![image("a"), image("b")];
        let (url, ty) = attachments_to_columns(&list);
        assert!(ty.is_none());
        assert_eq!(attachments_from_columns(url.as_deref(), None), list);
    }
}
