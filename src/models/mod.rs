use serde::{Deserialize, Serialize};

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Image formats accepted by the upload form and the model API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    /// Sniff the format from magic bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(PNG_SIGNATURE) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(JPEG_SIGNATURE) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        // "image/png; charset=binary" -> "image/png"
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        match essence.as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }

    /// Magic bytes win over the declared type; browsers sometimes lie about it.
    pub fn detect(bytes: &[u8], declared: Option<&str>) -> Option<Self> {
        Self::from_bytes(bytes).or_else(|| declared.and_then(Self::from_content_type))
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
        };
        write!(f, "{}", s)
    }
}

/// Rejections raised while validating an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    Empty,
    Unsupported(Option<String>),
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageError::Empty => write!(f, "Uploaded image is empty"),
            ImageError::Unsupported(Some(declared)) => {
                write!(f, "Unsupported image type '{}', please upload a PNG or JPEG", declared)
            }
            ImageError::Unsupported(None) => {
                write!(f, "Unsupported image type, please upload a PNG or JPEG")
            }
        }
    }
}

impl std::error::Error for ImageError {}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, declared_content_type: Option<&str>) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }

        let format = ImageFormat::detect(&bytes, declared_content_type)
            .ok_or_else(|| ImageError::Unsupported(declared_content_type.map(str::to_string)))?;

        Ok(Self { bytes, format })
    }
}

/// Everything needed for one image analysis call.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    image_bytes: Vec<u8>,
    format: ImageFormat,
    instruction_text: String,
    system_prompt: String,
}

impl AnalysisRequest {
    pub fn new(
        image_bytes: Vec<u8>,
        format: ImageFormat,
        instruction_text: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Result<Self, ImageError> {
        if image_bytes.is_empty() {
            return Err(ImageError::Empty);
        }

        Ok(Self {
            image_bytes,
            format,
            instruction_text: instruction_text.into(),
            system_prompt: system_prompt.into(),
        })
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.image_bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn instruction_text(&self) -> &str {
        &self.instruction_text
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalizationRequest {
    pub allergies: String,
    pub location: String,
}

impl PersonalizationRequest {
    /// At least one of the two answers carries something besides whitespace.
    pub fn has_input(&self) -> bool {
        !self.allergies.trim().is_empty() || !self.location.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub report_text: String,
}

impl AnalysisResult {
    pub fn new(report_text: impl Into<String>) -> Self {
        Self {
            report_text: report_text.into(),
        }
    }
}

/// Why a model call did not produce a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisFailure {
    /// DNS, connect, timeout, body read or non-2xx status.
    Transport(String),
    /// Anything else, e.g. a body that is not the expected JSON envelope.
    General(String),
}

impl AnalysisFailure {
    pub fn detail(&self) -> &str {
        match self {
            AnalysisFailure::Transport(detail) | AnalysisFailure::General(detail) => detail,
        }
    }
}

impl std::fmt::Display for AnalysisFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisFailure::Transport(detail) => write!(f, "transport error: {}", detail),
            AnalysisFailure::General(detail) => write!(f, "general error: {}", detail),
        }
    }
}

impl std::error::Error for AnalysisFailure {}

pub type ReportOutcome = Result<AnalysisResult, AnalysisFailure>;
