//! Reading order normalization and line grouping
//!
//! Backends report word-level items whose flags mark line boundaries. These
//! helpers split them into lines, order words left-to-right within a line,
//! repair the flags and derive line-level items and page text.

use super::types::{clamp_confidence, BoxFlags, BoxItem, IntRect, TextItem};

/// Anything carrying a rect and line flags
pub(crate) trait Positioned {
    fn rect(&self) -> IntRect;
    fn flags_mut(&mut self) -> &mut BoxFlags;
    fn flags(&self) -> BoxFlags;
}

impl Positioned for BoxItem {
    fn rect(&self) -> IntRect {
        self.rect
    }

    fn flags_mut(&mut self) -> &mut BoxFlags {
        &mut self.flags
    }

    fn flags(&self) -> BoxFlags {
        self.flags
    }
}

impl Positioned for TextItem {
    fn rect(&self) -> IntRect {
        self.rect
    }

    fn flags_mut(&mut self) -> &mut BoxFlags {
        &mut self.flags
    }

    fn flags(&self) -> BoxFlags {
        self.flags
    }
}

/// Split word items into lines using their flags
///
/// A new line begins at an item flagged `START_OF_LINE` or right after an
/// item flagged `END_OF_LINE`. Line order is preserved.
pub(crate) fn split_lines<T: Positioned>(items: Vec<T>) -> Vec<Vec<T>> {
    let mut lines: Vec<Vec<T>> = Vec::new();
    let mut current: Vec<T> = Vec::new();

    for item in items {
        if item.flags().contains(BoxFlags::START_OF_LINE) && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        let ends_line = item.flags().contains(BoxFlags::END_OF_LINE);
        current.push(item);
        if ends_line {
            lines.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

/// Put word items into reading order and rewrite their line flags
///
/// Lines are ordered top-to-bottom by the top edge of their union rect (ties
/// keep backend order); words are ordered left-to-right within a line.
pub(crate) fn normalize_words<T: Positioned>(items: Vec<T>) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());

    let mut lines = split_lines(items);
    lines.sort_by_key(|line| union_all(line.iter().map(|item| item.rect())).top);

    for mut line in lines {
        line.sort_by_key(|item| (item.rect().left, item.rect().top));
        let last = line.len() - 1;
        for (i, item) in line.iter_mut().enumerate() {
            let flags = item.flags_mut();
            flags.remove(BoxFlags::START_OF_LINE | BoxFlags::END_OF_LINE);
            if i == 0 {
                flags.insert(BoxFlags::START_OF_LINE);
            }
            if i == last {
                flags.insert(BoxFlags::END_OF_LINE);
            }
        }
        out.extend(line);
    }

    out
}

/// Merge normalized word boxes into one box per line
pub(crate) fn line_boxes(words: &[BoxItem]) -> Vec<BoxItem> {
    split_lines(words.to_vec())
        .into_iter()
        .map(|line| BoxItem {
            rect: union_all(line.iter().map(|b| b.rect)),
            flags: BoxFlags::START_OF_LINE | BoxFlags::END_OF_LINE,
        })
        .collect()
}

/// Merge normalized word items into one item per line
pub(crate) fn line_items(words: &[TextItem]) -> Vec<TextItem> {
    split_lines(words.to_vec())
        .into_iter()
        .map(|line| {
            let confidence =
                line.iter().map(|w| w.confidence).sum::<f32>() / line.len() as f32;
            TextItem {
                rect: union_all(line.iter().map(|w| w.rect)),
                flags: BoxFlags::START_OF_LINE | BoxFlags::END_OF_LINE,
                confidence: clamp_confidence(confidence),
                text: join_words(&line),
            }
        })
        .collect()
}

/// Page text: words joined by spaces, one line per row, trailing newline
pub(crate) fn page_text(words: &[TextItem]) -> String {
    let mut text = String::new();
    for line in split_lines(words.to_vec()) {
        text.push_str(&join_words(&line));
        text.push('\n');
    }
    text
}

fn join_words(words: &[TextItem]) -> String {
    words
        .iter()
        .map(|w| w.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn union_all(mut rects: impl Iterator<Item = IntRect>) -> IntRect {
    let first = rects.next().unwrap_or_default();
    rects.fold(first, |acc, r| acc.union(&r))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, left: i32, top: i32, flags: BoxFlags) -> TextItem {
        TextItem {
            rect: IntRect::new(left, top, left + 20, top + 10),
            flags,
            confidence: 0.8,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_split_lines_by_flags() {
        let words = vec![
            word("a", 0, 0, BoxFlags::START_OF_LINE),
            word("b", 30, 0, BoxFlags::END_OF_LINE),
            word("c", 0, 20, BoxFlags::NONE),
            word("d", 30, 20, BoxFlags::START_OF_LINE),
        ];
        let lines = split_lines(words);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 2);
        assert_eq!(lines[1][0].text, "c");
        assert_eq!(lines[2][0].text, "d");
    }

    #[test]
    fn test_normalize_sorts_within_line_and_fixes_flags() {
        let words = vec![
            word("world", 50, 0, BoxFlags::START_OF_LINE),
            word("hello", 0, 0, BoxFlags::END_OF_LINE),
            word("next", 0, 20, BoxFlags::START_OF_LINE | BoxFlags::END_OF_LINE),
        ];
        let words = normalize_words(words);

        assert_eq!(words[0].text, "hello");
        assert_eq!(words[0].flags, BoxFlags::START_OF_LINE);
        assert_eq!(words[1].text, "world");
        assert_eq!(words[1].flags, BoxFlags::END_OF_LINE);
        assert_eq!(words[2].flags, BoxFlags::START_OF_LINE | BoxFlags::END_OF_LINE);
    }

    #[test]
    fn test_normalize_orders_lines_top_to_bottom() {
        let words = normalize_words(vec![
            word("bottom", 0, 40, BoxFlags::START_OF_LINE | BoxFlags::END_OF_LINE),
            word("middle", 0, 20, BoxFlags::START_OF_LINE | BoxFlags::END_OF_LINE),
            word("top", 10, 0, BoxFlags::START_OF_LINE),
            word("left", 0, 2, BoxFlags::END_OF_LINE),
        ]);

        let text: Vec<_> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(text, vec!["left", "top", "middle", "bottom"]);
        assert_eq!(page_text(&words), "left top\nmiddle\nbottom\n");
    }

    #[test]
    fn test_line_items() {
        let mut words = vec![
            word("one", 0, 0, BoxFlags::START_OF_LINE),
            word("two", 30, 2, BoxFlags::END_OF_LINE),
        ];
        words[1].confidence = 0.6;
        let lines = line_items(&words);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "one two");
        assert_eq!(lines[0].rect, IntRect::new(0, 0, 50, 12));
        assert!((lines[0].confidence - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_line_boxes_cover_words() {
        let words: Vec<BoxItem> = normalize_words(vec![
            word("a", 0, 0, BoxFlags::START_OF_LINE),
            word("b", 40, 0, BoxFlags::NONE),
            word("c", 0, 30, BoxFlags::START_OF_LINE),
        ])
        .iter()
        .map(TextItem::to_box)
        .collect();

        let lines = line_boxes(&words);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].rect.contains(&words[0].rect));
        assert!(lines[0].rect.contains(&words[1].rect));
        assert!(lines[0].rect.top < lines[1].rect.top);
    }

    #[test]
    fn test_page_text() {
        let words = vec![
            word("Hello", 0, 0, BoxFlags::START_OF_LINE),
            word("world", 30, 0, BoxFlags::END_OF_LINE),
            word("again", 0, 20, BoxFlags::START_OF_LINE | BoxFlags::END_OF_LINE),
        ];
        assert_eq!(page_text(&words), "Hello world\nagain\n");
        assert_eq!(page_text(&[]), "");
    }
}
