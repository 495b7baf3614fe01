//! Catalog of processing operations exposed by the backend

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A processing endpoint that accepts a source and answers with a job handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Remove watermarks inside given rectangles or mask
    Inpaint,
    /// Detect and remove watermarks automatically
    WatermarkAuto,
    /// Lossless upscaling / sharpening
    Scale,
    /// ID photo with sized canvas and background colour
    IdPhoto,
    /// Colorize a black-and-white photo
    Colorize,
    /// Foreground segmentation (cut-out)
    Segment,
    /// Generate a background behind the subject
    Background,
    /// Remove watermarks from a PDF document
    PdfWatermark,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Self::Inpaint,
        Self::WatermarkAuto,
        Self::Scale,
        Self::IdPhoto,
        Self::Colorize,
        Self::Segment,
        Self::Background,
        Self::PdfWatermark,
    ];

    /// Command-line name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inpaint => "inpaint",
            Self::WatermarkAuto => "watermark-auto",
            Self::Scale => "scale",
            Self::IdPhoto => "idphoto",
            Self::Colorize => "colorize",
            Self::Segment => "segment",
            Self::Background => "background",
            Self::PdfWatermark => "pdf-watermark",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Inpaint => "Remove watermarks in marked regions",
            Self::WatermarkAuto => "Detect and remove watermarks automatically",
            Self::Scale => "Sharpen and upscale an image",
            Self::IdPhoto => "Produce an ID photo",
            Self::Colorize => "Colorize a black-and-white photo",
            Self::Segment => "Cut out the foreground subject",
            Self::Background => "Generate a new background",
            Self::PdfWatermark => "Remove watermarks from a PDF",
        }
    }

    /// Submit endpoint path
    pub fn submit_path(&self) -> &'static str {
        match self {
            Self::Inpaint => "/visual/inpaint",
            Self::WatermarkAuto => "/visual/watermark_auto",
            Self::Scale => "/visual/scale",
            Self::IdPhoto => "/visual/idphoto",
            Self::Colorize => "/visual/colorization",
            Self::Segment => "/visual/segmentation",
            Self::Background => "/visual/background",
            Self::PdfWatermark => "/pdf/remove-pdf-watermark",
        }
    }

    /// Status endpoint path for a job
    pub fn status_path(&self, job_id: &str) -> String {
        match self {
            Self::PdfWatermark => format!("/pdf/task/{}", job_id),
            _ => format!("/visual/task/{}", job_id),
        }
    }

    /// Form field carrying the source URL
    pub fn url_field(&self) -> &'static str {
        match self {
            Self::WatermarkAuto => "url",
            Self::PdfWatermark => "pdf_url",
            _ => "image_url",
        }
    }

    /// Multipart field carrying an inline source file
    pub fn file_field(&self) -> &'static str {
        match self {
            Self::WatermarkAuto => "file",
            Self::PdfWatermark => "pdf_file",
            _ => "image_file",
        }
    }

    /// Key of this operation in the backend's points cost table
    pub fn points_key(&self) -> &'static str {
        match self {
            Self::Inpaint => "inpaint",
            Self::WatermarkAuto => "watermark_auto",
            Self::Scale => "scale",
            Self::IdPhoto => "idphoto",
            Self::Colorize => "colorization",
            Self::Segment => "segmentation",
            Self::Background => "background",
            Self::PdfWatermark => "pdf_watermark",
        }
    }

    fn default_params(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Inpaint | Self::Scale => &[("return_type", "1")],
            Self::WatermarkAuto => &[],
            Self::IdPhoto => &[("format", "png"), ("return_type", "1")],
            Self::Colorize => &[("format", "jpeg/jpg"), ("return_type", "1")],
            Self::Segment => &[
                ("return_type", "1"),
                ("output_type", "2"),
                ("crop", "0"),
                ("format", "png"),
            ],
            Self::Background => &[("batch_size", "2"), ("prompt", "")],
            Self::PdfWatermark => &[("format", "doc-repair")],
        }
    }

    /// Whether the endpoint takes a `sync` flag; when it does, asynchronous
    /// mode is always requested
    fn takes_sync_flag(&self) -> bool {
        !matches!(self, Self::PdfWatermark)
    }

    /// Form fields for a submission: defaults, overridden by caller params,
    /// with `sync=0` pinned last
    pub fn form_fields(&self, params: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut fields: BTreeMap<String, String> = self
            .default_params()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        fields.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        if self.takes_sync_flag() {
            fields.insert("sync".to_string(), "0".to_string());
        }
        fields
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Unknown operation '{0}'")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name() == normalized)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}
