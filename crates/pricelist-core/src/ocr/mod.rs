//! OCR pipeline: page preprocessing, recognition, and token layout.
//!
//! Recognition sits behind [`OcrBackend`]. The shipped backend is
//! `pure-onnx-ocr` (feature `native`); tests substitute canned boxes.

mod preprocessing;
#[cfg(feature = "native")]
mod pure_engine;

pub use preprocessing::{adaptive_gaussian_threshold, bilateral_filter, clahe, ImagePreprocessor};
#[cfg(feature = "native")]
pub use pure_engine::PureOcrEngine;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// A recognized text region with its quadrilateral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBox {
    /// Corner coordinates (x1, y1, x2, y2, x3, y3, x4, y4).
    pub bbox: [f32; 8],

    /// Recognized text content.
    pub text: String,

    /// Recognition confidence (0.0 - 1.0).
    pub confidence: f32,
}

impl TextBox {
    /// Get the center point of the bounding box.
    pub fn center(&self) -> (f32, f32) {
        let x = (self.bbox[0] + self.bbox[2] + self.bbox[4] + self.bbox[6]) / 4.0;
        let y = (self.bbox[1] + self.bbox[3] + self.bbox[5] + self.bbox[7]) / 4.0;
        (x, y)
    }

    /// Get the axis-aligned bounding rectangle as (min_x, min_y, max_x, max_y).
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        let xs = [self.bbox[0], self.bbox[2], self.bbox[4], self.bbox[6]];
        let ys = [self.bbox[1], self.bbox[3], self.bbox[5], self.bbox[7]];

        let min_x = xs.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_x = xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let min_y = ys.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_y = ys.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        (min_x, min_y, max_x, max_y)
    }

    pub fn height(&self) -> f32 {
        let (_, min_y, _, max_y) = self.rect();
        max_y - min_y
    }

    /// Average glyph width, from the box width over its character count.
    fn glyph_width(&self) -> f32 {
        let (min_x, _, max_x, _) = self.rect();
        let chars = self.text.chars().count().max(1);
        (max_x - min_x) / chars as f32
    }
}

/// Result of OCR processing on an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    /// Recognized text boxes, in no particular order.
    pub boxes: Vec<TextBox>,

    /// Processing time in milliseconds.
    pub processing_time_ms: u64,

    /// Image dimensions (width, height).
    pub image_size: (u32, u32),
}

/// A text recognizer over whole page images.
pub trait OcrBackend {
    fn recognize(&self, image: &DynamicImage) -> Result<OcrResult, OcrError>;
}

/// Load the configured backend from the model directory.
#[cfg(feature = "native")]
pub fn create_backend(config: &OcrConfig) -> Result<Box<dyn OcrBackend>, OcrError> {
    Ok(Box::new(PureOcrEngine::from_config(config)?))
}

#[cfg(not(feature = "native"))]
pub fn create_backend(_config: &OcrConfig) -> Result<Box<dyn OcrBackend>, OcrError> {
    Err(OcrError::Unavailable("built without the native feature".to_string()))
}

/// Boxes grouped into lines top to bottom, each sorted left to right.
///
/// A box joins the current line when its vertical center lies within the
/// band around the line's first box: `tolerance`, or half that box's height.
fn cluster_lines<'a>(boxes: impl IntoIterator<Item = &'a TextBox>, tolerance: Option<f32>) -> Vec<Vec<&'a TextBox>> {
    let mut sorted: Vec<&TextBox> = boxes.into_iter().collect();
    sorted.sort_by(|a, b| a.center().1.total_cmp(&b.center().1));

    let mut lines: Vec<(f32, f32, Vec<&TextBox>)> = Vec::new();
    for b in sorted {
        let cy = b.center().1;
        match lines.last_mut() {
            Some((anchor, band, members)) if (cy - *anchor).abs() <= *band => members.push(b),
            _ => {
                let band = tolerance.unwrap_or(b.height() / 2.0).max(1.0);
                lines.push((cy, band, vec![b]));
            }
        }
    }

    lines
        .into_iter()
        .map(|(_, _, mut members)| {
            members.sort_by(|a, b| a.rect().0.total_cmp(&b.rect().0));
            members
        })
        .collect()
}

/// Reassemble recognized boxes into text lines, preserving column gaps.
///
/// Neighboring boxes are joined with one space, or with two when the gap
/// exceeds `space_gap_ratio` average glyph widths so the line parser sees a
/// column break.
pub fn assemble_lines(result: &OcrResult, space_gap_ratio: f32) -> Vec<String> {
    cluster_lines(&result.boxes, None)
        .into_iter()
        .map(|members| {
            let mut line = String::new();
            let mut prev: Option<&TextBox> = None;
            for b in members {
                let text = b.text.trim();
                if text.is_empty() {
                    continue;
                }
                if let Some(p) = prev {
                    let gap = b.rect().0 - p.rect().2;
                    let glyph = (p.glyph_width() + b.glyph_width()) / 2.0;
                    line.push_str(if gap > space_gap_ratio * glyph { "  " } else { " " });
                }
                line.push_str(text);
                prev = Some(b);
            }
            line
        })
        .filter(|l| !l.is_empty())
        .collect()
}

/// Confident tokens clustered into spatial rows for the row parser.
pub fn group_into_rows(result: &OcrResult, min_confidence: f32, row_tolerance: f32) -> Vec<Vec<String>> {
    let confident = result
        .boxes
        .iter()
        .filter(|b| b.confidence >= min_confidence && !b.text.trim().is_empty());

    cluster_lines(confident, Some(row_tolerance))
        .into_iter()
        .map(|members| members.iter().map(|b| b.text.trim().to_string()).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_box(x: f32, y: f32, w: f32, text: &str, confidence: f32) -> TextBox {
        let h = 20.0;
        TextBox {
            bbox: [x, y, x + w, y, x + w, y + h, x, y + h],
            text: text.to_string(),
            confidence,
        }
    }

    fn result(boxes: Vec<TextBox>) -> OcrResult {
        OcrResult {
            boxes,
            processing_time_ms: 0,
            image_size: (1000, 1000),
        }
    }

    #[test]
    fn test_text_box_geometry() {
        let b = text_box(10.0, 20.0, 60.0, "103387", 0.9);
        assert_eq!(b.center(), (40.0, 30.0));
        assert_eq!(b.rect(), (10.0, 20.0, 70.0, 40.0));
        assert_eq!(b.height(), 20.0);
        assert_eq!(b.glyph_width(), 10.0);
    }

    #[test]
    fn test_assemble_lines_spacing() {
        let ocr = result(vec![
            text_box(300.0, 102.0, 50.0, "$4.99", 0.9),
            text_box(10.0, 100.0, 60.0, "103387", 0.9),
            text_box(100.0, 101.0, 40.0, "BEEF", 0.9),
            text_box(145.0, 100.0, 50.0, "CHUCK", 0.9),
            text_box(10.0, 140.0, 60.0, "103388", 0.9),
        ]);
        let lines = assemble_lines(&ocr, 1.5);
        assert_eq!(lines, vec!["103387  BEEF CHUCK  $4.99", "103388"]);
    }

    #[test]
    fn test_group_into_rows_drops_low_confidence() {
        let ocr = result(vec![
            text_box(200.0, 105.0, 50.0, "1.85", 0.95),
            text_box(10.0, 100.0, 20.0, "12", 0.9),
            text_box(50.0, 98.0, 80.0, "CHUCK ROLL", 0.8),
            text_box(400.0, 100.0, 30.0, "~~", 0.1),
            text_box(10.0, 150.0, 20.0, "13", 0.9),
        ]);
        let rows = group_into_rows(&ocr, 0.30, 10.0);
        assert_eq!(
            rows,
            vec![
                vec!["12".to_string(), "CHUCK ROLL".to_string(), "1.85".to_string()],
                vec!["13".to_string()],
            ]
        );
    }
}
