//! Native recognition library capability set
//!
//! The layout analysis, character recognition and orientation heuristics live
//! behind this trait. The [`Engine`](super::engine::Engine) owns exactly one
//! implementation and never calls it from more than one thread.

use anyhow::Result;

use super::pixels::PixelBuffer;
use super::types::{BoxItem, Orientation, TextItem};

/// Operations a recognition backend must provide
///
/// Word-level results are returned with `START_OF_LINE` / `END_OF_LINE` flags
/// marking line boundaries; the engine derives line items, plain text and
/// hOCR from them.
pub trait Recognizer {
    /// Read a named configuration value, `None` if the name is unknown
    fn get_variable(&self, name: &str) -> Option<String>;

    /// Set a named configuration value
    fn set_variable(&mut self, name: &str, value: &str) -> Result<()>;

    /// Replace the trained model
    fn load_model(&mut self, model: &[u8]) -> Result<()>;

    /// Replace the current image
    fn load_image(&mut self, image: &PixelBuffer) -> Result<()>;

    /// Release the current image
    fn clear_image(&mut self);

    /// Segment the current image into word boxes
    fn analyze_layout(&mut self) -> Result<Vec<BoxItem>>;

    /// Recognize the current image, reporting progress in `[0, 1]`
    fn recognize(&mut self, progress: &mut dyn FnMut(f32)) -> Result<Vec<TextItem>>;

    /// Estimate page rotation
    fn orientation(&mut self) -> Result<Orientation>;

    /// Release all native resources
    fn destroy(&mut self);
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted recognizer used by engine, worker and client tests

    use super::*;
    use crate::vision::types::{BoxFlags, IntRect};
    use anyhow::{anyhow, bail};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    /// Counters shared with the test body
    #[derive(Debug, Default)]
    pub struct Calls {
        pub layout: usize,
        pub recognize: usize,
        pub destroy: usize,
    }

    /// A page of scripted lines, each a list of (word, rect)
    #[derive(Debug, Clone)]
    pub struct ScriptedPage {
        pub lines: Vec<Vec<(&'static str, IntRect)>>,
    }

    impl ScriptedPage {
        /// Three lines of two words each, 40px apart
        pub fn three_lines() -> Self {
            let line = |y: i32, a: &'static str, b: &'static str| {
                vec![
                    (a, IntRect::new(10, y, 60, y + 20)),
                    (b, IntRect::new(70, y, 130, y + 20)),
                ]
            };
            Self {
                lines: vec![
                    line(10, "The", "quick"),
                    line(50, "brown", "fox"),
                    line(90, "jumps", "over"),
                ],
            }
        }
    }

    pub struct ScriptedRecognizer {
        page: ScriptedPage,
        variables: HashMap<String, String>,
        image: bool,
        pub calls: Arc<Mutex<Calls>>,
        /// Pause inside `recognize` so tests can observe in-flight calls
        pub recognize_delay: Duration,
        /// Panic inside `recognize` to simulate a crashed backend
        pub panic_on_recognize: bool,
    }

    impl ScriptedRecognizer {
        pub fn new(page: ScriptedPage) -> Self {
            let mut variables = HashMap::new();
            variables.insert("tessedit_pageseg_mode".to_string(), "3".to_string());
            Self {
                page,
                variables,
                image: false,
                calls: Arc::new(Mutex::new(Calls::default())),
                recognize_delay: Duration::ZERO,
                panic_on_recognize: false,
            }
        }

        fn flagged<T>(&self, mut make: impl FnMut(&'static str, IntRect, BoxFlags) -> T) -> Vec<T> {
            let mut out = Vec::new();
            for line in &self.page.lines {
                let last = line.len().saturating_sub(1);
                for (i, (word, rect)) in line.iter().enumerate() {
                    let mut flags = BoxFlags::NONE;
                    if i == 0 {
                        flags.insert(BoxFlags::START_OF_LINE);
                    }
                    if i == last {
                        flags.insert(BoxFlags::END_OF_LINE);
                    }
                    out.push(make(word, *rect, flags));
                }
            }
            out
        }
    }

    impl Recognizer for ScriptedRecognizer {
        fn get_variable(&self, name: &str) -> Option<String> {
            self.variables.get(name).cloned()
        }

        fn set_variable(&mut self, name: &str, value: &str) -> Result<()> {
            if !self.variables.contains_key(name) {
                bail!("unknown variable {name}");
            }
            self.variables.insert(name.to_string(), value.to_string());
            Ok(())
        }

        fn load_model(&mut self, model: &[u8]) -> Result<()> {
            if !model.starts_with(b"MODEL") {
                bail!("not a trained model");
            }
            Ok(())
        }

        fn load_image(&mut self, _image: &PixelBuffer) -> Result<()> {
            self.image = true;
            Ok(())
        }

        fn clear_image(&mut self) {
            self.image = false;
        }

        fn analyze_layout(&mut self) -> Result<Vec<BoxItem>> {
            if !self.image {
                return Err(anyhow!("no image"));
            }
            self.calls.lock().layout += 1;
            Ok(self.flagged(|_, rect, flags| BoxItem { rect, flags }))
        }

        fn recognize(&mut self, progress: &mut dyn FnMut(f32)) -> Result<Vec<TextItem>> {
            if self.panic_on_recognize {
                panic!("backend crashed");
            }
            self.calls.lock().recognize += 1;
            for step in 0..=4 {
                progress(step as f32 * 0.25);
                if !self.recognize_delay.is_zero() {
                    std::thread::sleep(self.recognize_delay);
                }
            }
            // Recognition re-segments slightly differently from layout analysis
            Ok(self.flagged(|word, rect, flags| TextItem {
                rect: IntRect::new(rect.left + 1, rect.top, rect.right - 1, rect.bottom + 1),
                flags,
                confidence: 0.9,
                text: word.to_string(),
            }))
        }

        fn orientation(&mut self) -> Result<Orientation> {
            Ok(Orientation {
                rotation: 0,
                confidence: 0.8,
            })
        }

        fn destroy(&mut self) {
            self.calls.lock().destroy += 1;
        }
    }

    /// A model payload the scripted recognizer accepts
    pub fn model_bytes() -> Vec<u8> {
        b"MODEL eng".to_vec()
    }

    /// A small grayscale page
    pub fn page_image() -> PixelBuffer {
        PixelBuffer::new(vec![255; 200 * 120], 200, 120, crate::vision::PixelFormat::Gray8)
    }
}
