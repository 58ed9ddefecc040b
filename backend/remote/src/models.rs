use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One block of OCR output, newline separated.
pub type OcrTextBlock = String;

/// Uploaded photo, owned by the request until segmentation is done with it.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub buffer: Vec<u8>,
    pub mime_type: String,
}

impl RawImage {
    pub fn new(buffer: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            buffer,
            mime_type: mime_type.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSubImage {
    pub filename: String,
    pub buffer: Vec<u8>,
    pub mime_type: String,
}

#[derive(Deserialize, Default)]
pub struct OcrResponse {
    #[serde(default)]
    pub results: Vec<OcrResult>,
}

#[derive(Deserialize)]
pub struct OcrResult {
    #[serde(default)]
    pub entities: Vec<OcrEntity>,
}

#[derive(Deserialize)]
pub struct OcrEntity {
    #[serde(default)]
    pub objects: Vec<OcrObject>,
}

#[derive(Deserialize)]
pub struct OcrObject {
    #[serde(default)]
    pub entities: Vec<OcrLeaf>,
}

#[derive(Deserialize)]
pub struct OcrLeaf {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl OcrResponse {
    /// Non-empty `{kind: "text"}` leaves, in document order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .flat_map(|result| &result.entities)
            .flat_map(|entity| &entity.objects)
            .flat_map(|object| &object.entities)
            .filter(|leaf| leaf.kind == "text")
            .filter_map(|leaf| leaf.text.as_deref())
            .filter(|text| !text.is_empty())
    }
}

#[derive(Serialize)]
pub struct RtoRequest<'a> {
    pub reg_no: &'a str,
    pub consent: &'a str,
    pub consent_text: &'a str,
}

#[derive(Deserialize, Default)]
pub struct RtoResponse {
    #[serde(default)]
    pub result: Option<RtoResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RtoResult {
    #[serde(default)]
    pub reg_no: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub reg_type_descr: Option<String>,
    #[serde(default)]
    pub vehicle_class_desc: Option<String>,
    #[serde(default)]
    pub reg_upto: Option<String>,
    #[serde(default)]
    pub vehicle_pucc_details: Value,
}
