//! hOCR rendering of recognized pages

use std::fmt::Write;

use super::layout::split_lines;
use super::types::{IntRect, TextItem};

/// Render normalized word items as an hOCR page fragment
///
/// Produces `ocr_page` > `ocr_line` > `ocrx_word` elements with `bbox` and
/// `x_wconf` (confidence as an integer percentage) properties.
pub(crate) fn render(words: &[TextItem], page_width: u32, page_height: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<div class=\"ocr_page\" id=\"page_1\" title=\"bbox 0 0 {} {}\">",
        page_width, page_height
    );

    let mut word_id = 0usize;
    for (line_index, line) in split_lines(words.to_vec()).into_iter().enumerate() {
        let line_rect = line
            .iter()
            .skip(1)
            .fold(line[0].rect, |acc, w| acc.union(&w.rect));
        let line_conf = line.iter().map(|w| w.confidence).sum::<f32>() / line.len() as f32;

        let _ = writeln!(
            out,
            " <span class=\"ocr_line\" id=\"line_1_{}\" title=\"{}\">",
            line_index + 1,
            title(&line_rect, line_conf)
        );

        for word in &line {
            word_id += 1;
            let _ = writeln!(
                out,
                "  <span class=\"ocrx_word\" id=\"word_1_{}\" title=\"{}\">{}</span>",
                word_id,
                title(&word.rect, word.confidence),
                escape(&word.text)
            );
        }

        out.push_str(" </span>\n");
    }

    out.push_str("</div>\n");
    out
}

fn title(rect: &IntRect, confidence: f32) -> String {
    format!(
        "bbox {} {} {} {}; x_wconf {}",
        rect.left,
        rect.top,
        rect.right,
        rect.bottom,
        (confidence * 100.0).round() as i32
    )
}

/// Escape text for inclusion in HTML element content
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
