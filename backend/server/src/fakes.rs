use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use remote::{
    ExtractedSubImage, OcrTextBlock, RawImage, Recognizer, RemoteError, RtoLookup, RtoResult,
    Segmenter,
};
use serde_json::{Value, json};

use crate::broadcast::Broadcaster;

pub fn vehicle_result(pucc_details: Value) -> RtoResult {
    RtoResult {
        reg_no: None,
        owner_name: Some("A K SHARMA".to_string()),
        model: Some("SWIFT DZIRE".to_string()),
        state: Some("MAHARASHTRA".to_string()),
        reg_type_descr: Some("Permanent".to_string()),
        vehicle_class_desc: Some("Motor Car(LMV)".to_string()),
        reg_upto: Some("2034-05-11".to_string()),
        vehicle_pucc_details: pucc_details,
    }
}

pub fn valid_puc() -> Value {
    json!({"pucc_no": "MH01200340001234", "pucc_upto": "2027-01-31"})
}

#[derive(Default)]
pub struct FakeRto {
    results: HashMap<String, RtoResult>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeRto {
    pub fn valid(plates: &[&str]) -> Self {
        plates.iter().fold(Self::default(), |fake, plate| {
            fake.with(plate, vehicle_result(valid_puc()))
        })
    }

    pub fn with(mut self, plate: &str, result: RtoResult) -> Self {
        self.results.insert(plate.to_string(), result);
        self
    }

    pub fn slow(mut self) -> Self {
        self.delay = Some(Duration::from_millis(50));
        self
    }
}

#[async_trait]
impl RtoLookup for FakeRto {
    async fn lookup(&self, reg_no: &str) -> Result<Option<RtoResult>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Upstream {
                service: "rto",
                reason: "503 Service Unavailable".to_string(),
            });
        }

        Ok(self.results.get(reg_no).cloned())
    }
}

/// Hands back one crop per configured OCR text, named `crop_<n>.jpg`.
pub struct FakeSegmenter {
    crops: usize,
    error: Option<fn() -> RemoteError>,
}

impl FakeSegmenter {
    pub fn crops(crops: usize) -> Self {
        Self { crops, error: None }
    }

    pub fn failing(error: fn() -> RemoteError) -> Self {
        Self {
            crops: 0,
            error: Some(error),
        }
    }
}

#[async_trait]
impl Segmenter for FakeSegmenter {
    async fn segment(&self, image: RawImage) -> Result<Vec<ExtractedSubImage>, RemoteError> {
        if let Some(error) = self.error {
            return Err(error());
        }

        Ok((0..self.crops)
            .map(|n| ExtractedSubImage {
                filename: format!("crop_{n}.jpg"),
                buffer: image.buffer.clone(),
                mime_type: "image/jpeg".to_string(),
            })
            .collect())
    }
}

/// Reads `crop_<n>.jpg` as `texts[n]`.
#[derive(Default)]
pub struct FakeRecognizer {
    texts: Vec<Option<String>>,
    missing_key: bool,
    pub calls: AtomicUsize,
}

impl FakeRecognizer {
    pub fn reading(texts: &[Option<&str>]) -> Self {
        Self {
            texts: texts.iter().map(|t| t.map(str::to_string)).collect(),
            ..Self::default()
        }
    }

    pub fn without_key() -> Self {
        Self {
            missing_key: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn recognize(&self, image: &ExtractedSubImage) -> Option<OcrTextBlock> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let index: usize = image
            .filename
            .trim_start_matches("crop_")
            .trim_end_matches(".jpg")
            .parse()
            .ok()?;

        self.texts.get(index).cloned().flatten()
    }

    async fn recognize_all(
        &self,
        images: &[ExtractedSubImage],
    ) -> Result<Vec<Option<OcrTextBlock>>, RemoteError> {
        if self.missing_key {
            return Err(RemoteError::Config("OCR API key"));
        }

        let mut blocks = Vec::with_capacity(images.len());
        for image in images {
            blocks.push(self.recognize(image).await);
        }

        Ok(blocks)
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingBroadcaster {
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn named(&self, event: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload)
            .collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn publish(&self, event: &str, payload: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push((event.to_string(), payload));
        }
    }
}
