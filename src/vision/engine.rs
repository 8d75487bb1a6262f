//! Synchronous recognition engine
//!
//! Wraps a single [`Recognizer`], tracks which of model and image are loaded,
//! and caches layout and recognition results so repeated queries against the
//! same input do not redo work. The engine has no internal locking; it is
//! driven from exactly one thread.

use tracing::{debug, info, warn};

use super::hocr;
use super::layout::{line_boxes, line_items, normalize_words, page_text};
use super::pixels::PixelBuffer;
use super::recognizer::Recognizer;
use super::types::{clamp_confidence, BoxItem, IntRect, Orientation, TextItem, TextUnit};
use crate::config::EngineSettings;
use crate::error::{OcrError, OcrResult, PreconditionError};

/// Recognition engine owning one backend instance
pub struct Engine<R: Recognizer> {
    recognizer: R,
    settings: EngineSettings,
    model_loaded: bool,
    /// Dimensions of the loaded image
    image: Option<(u32, u32)>,
    /// Word boxes from layout analysis of the current image
    layout: Option<Vec<BoxItem>>,
    /// Word items from recognition of the current image with the current model
    recognized: Option<Vec<TextItem>>,
    destroyed: bool,
}

impl<R: Recognizer> Engine<R> {
    /// Create an engine with default settings
    pub fn new(recognizer: R) -> Self {
        Self::with_settings(recognizer, EngineSettings::default())
    }

    /// Create an engine with custom settings
    pub fn with_settings(recognizer: R, settings: EngineSettings) -> Self {
        Self {
            recognizer,
            settings,
            model_loaded: false,
            image: None,
            layout: None,
            recognized: None,
            destroyed: false,
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model_loaded
    }

    pub fn is_image_loaded(&self) -> bool {
        self.image.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Set a named recognizer variable
    ///
    /// Invalidates cached recognition results since variables may change how
    /// the page is recognized.
    pub fn set_variable(&mut self, name: &str, value: &str) -> OcrResult<()> {
        self.ensure_alive()?;
        if name.is_empty() {
            return Err(OcrError::Configuration("variable name is empty".to_string()));
        }

        self.recognizer
            .set_variable(name, value)
            .map_err(|e| OcrError::Configuration(format!("{e:#}")))?;
        self.recognized = None;
        debug!("Set variable {} = {}", name, value);
        Ok(())
    }

    /// Read a named recognizer variable
    pub fn get_variable(&self, name: &str) -> OcrResult<String> {
        self.ensure_alive()?;
        self.recognizer
            .get_variable(name)
            .ok_or_else(|| OcrError::Configuration(format!("unknown variable: {name}")))
    }

    /// Replace the trained model
    pub fn load_model(&mut self, model: &[u8]) -> OcrResult<()> {
        self.ensure_alive()?;
        if model.is_empty() {
            return Err(OcrError::ModelLoad("model data is empty".to_string()));
        }

        // Results from the previous model no longer apply
        self.recognized = None;

        match self.recognizer.load_model(model) {
            Ok(()) => {
                self.model_loaded = true;
                info!("Loaded model ({} bytes)", model.len());
                Ok(())
            }
            Err(e) => {
                self.model_loaded = false;
                warn!("Model load failed: {:#}", e);
                Err(OcrError::ModelLoad(format!("{e:#}")))
            }
        }
    }

    /// Replace the current image, discarding cached results
    ///
    /// The previous image is released before the new one is checked, so a
    /// failed load (invalid buffer or backend rejection) leaves no image
    /// loaded.
    pub fn load_image(&mut self, image: &PixelBuffer) -> OcrResult<()> {
        self.ensure_alive()?;

        self.layout = None;
        self.recognized = None;
        if self.image.take().is_some() {
            self.recognizer.clear_image();
        }

        image.validate()?;

        match self.recognizer.load_image(image) {
            Ok(()) => {
                self.image = Some(image.dimensions());
                debug!("Loaded {}x{} {:?} image", image.width, image.height, image.format);
                Ok(())
            }
            Err(e) => Err(OcrError::ImageLoad(format!("{e:#}"))),
        }
    }

    /// Release the current image and cached results; the model stays loaded
    pub fn clear_image(&mut self) -> OcrResult<()> {
        self.ensure_alive()?;
        if self.image.take().is_some() {
            self.recognizer.clear_image();
            self.layout = None;
            self.recognized = None;
            debug!("Cleared image");
        }
        Ok(())
    }

    /// Boxes of the current image in reading order
    ///
    /// Once recognition has run for the current image, its segmentation is
    /// returned instead of a separate layout analysis.
    pub fn get_bounding_boxes(&mut self, unit: TextUnit) -> OcrResult<Vec<BoxItem>> {
        self.ensure_alive()?;
        self.ensure_image()?;

        let recognized: Option<Vec<BoxItem>> = self
            .recognized
            .as_ref()
            .map(|items| items.iter().map(TextItem::to_box).collect());
        let words = match recognized {
            Some(words) => words,
            None => self.layout_words()?.to_vec(),
        };

        Ok(match unit {
            TextUnit::Word => words,
            TextUnit::Line => line_boxes(&words),
        })
    }

    /// Recognized items of the current image in reading order
    pub fn get_text_boxes(
        &mut self,
        unit: TextUnit,
        on_progress: &mut dyn FnMut(f32),
    ) -> OcrResult<Vec<TextItem>> {
        let words = self.recognized_words(on_progress)?;
        Ok(match unit {
            TextUnit::Word => words.to_vec(),
            TextUnit::Line => line_items(words),
        })
    }

    /// Recognized page text, one line per row
    pub fn get_text(&mut self, on_progress: &mut dyn FnMut(f32)) -> OcrResult<String> {
        let words = self.recognized_words(on_progress)?;
        Ok(page_text(words))
    }

    /// Recognized page as hOCR markup
    pub fn get_hocr(&mut self, on_progress: &mut dyn FnMut(f32)) -> OcrResult<String> {
        self.recognized_words(on_progress)?;
        let (width, height) = self.image.unwrap_or_default();
        let words = self.recognized.as_deref().unwrap_or_default();
        Ok(hocr::render(words, width, height))
    }

    /// Best-effort page rotation estimate
    ///
    /// Unreliable for all-uppercase or non-Latin text.
    pub fn get_orientation(&mut self) -> OcrResult<Orientation> {
        self.ensure_alive()?;
        self.ensure_image()?;
        let orientation = self
            .recognizer
            .orientation()
            .map_err(|e| OcrError::Recognition(format!("{e:#}")))?;
        Ok(Orientation {
            rotation: orientation.rotation,
            confidence: clamp_confidence(orientation.confidence),
        })
    }

    /// Release backend resources; later calls fail with `Destroyed`
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.recognizer.destroy();
        self.destroyed = true;
        self.model_loaded = false;
        self.image = None;
        self.layout = None;
        self.recognized = None;
        info!("Engine destroyed");
    }

    fn ensure_alive(&self) -> OcrResult<()> {
        if self.destroyed {
            Err(OcrError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn ensure_image(&self) -> OcrResult<()> {
        if self.image.is_none() {
            return Err(PreconditionError::ImageNotLoaded.into());
        }
        Ok(())
    }

    fn layout_words(&mut self) -> OcrResult<&[BoxItem]> {
        if self.layout.is_none() {
            let boxes = self
                .recognizer
                .analyze_layout()
                .map_err(|e| OcrError::Recognition(format!("{e:#}")))?;
            let boxes = boxes
                .into_iter()
                .map(|b| BoxItem {
                    rect: renormalize(b.rect),
                    flags: b.flags,
                })
                .collect();
            let boxes = normalize_words(boxes);
            debug!("Layout analysis found {} words", boxes.len());
            self.layout = Some(boxes);
        }
        Ok(self.layout.as_deref().unwrap_or_default())
    }

    fn recognized_words(&mut self, on_progress: &mut dyn FnMut(f32)) -> OcrResult<&[TextItem]> {
        self.ensure_alive()?;
        if !self.model_loaded {
            return Err(PreconditionError::ModelNotLoaded.into());
        }
        self.ensure_image()?;

        if self.recognized.is_none() {
            let mut gate = ProgressGate::new(self.settings.progress_step);
            let mut report = |value: f32| {
                if let Some(value) = gate.admit(value) {
                    on_progress(value);
                }
            };

            let items = self
                .recognizer
                .recognize(&mut report)
                .map_err(|e| OcrError::Recognition(format!("{e:#}")))?;

            let items = items
                .into_iter()
                .map(|item| TextItem {
                    rect: renormalize(item.rect),
                    confidence: clamp_confidence(item.confidence),
                    ..item
                })
                .collect();
            let items = normalize_words(items);
            debug!("Recognition produced {} words", items.len());
            self.recognized = Some(items);
        }

        Ok(self.recognized.as_deref().unwrap_or_default())
    }
}

impl<R: Recognizer> Drop for Engine<R> {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn renormalize(rect: IntRect) -> IntRect {
    IntRect::new(rect.left, rect.top, rect.right, rect.bottom)
}

/// Filters raw backend progress into a clamped, non-decreasing sequence
struct ProgressGate {
    last: Option<f32>,
    step: f32,
}

impl ProgressGate {
    fn new(step: f32) -> Self {
        Self {
            last: None,
            step: step.max(0.0),
        }
    }

    fn admit(&mut self, value: f32) -> Option<f32> {
        if value.is_nan() {
            return None;
        }
        let value = value.clamp(0.0, 1.0);
        match self.last {
            Some(last) if value <= last => None,
            Some(last) if value < 1.0 && value - last < self.step => None,
            _ => {
                self.last = Some(value);
                Some(value)
            }
        }
    }
}
