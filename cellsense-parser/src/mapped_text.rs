//! Mapped text
//!
//! A [`MappedString`] is a string value together with a map from every byte of that value back
//! to a byte of some original text, or to nothing when the byte was inserted literally. Cells,
//! option blocks and YAML fragments are all carved out of the document the user is editing;
//! keeping the map lets diagnostics found in a fragment be reported in the original file.
//!
//! Composition is eager: deriving a new string from an existing one resolves every range
//! against the parent's map immediately, so all strings derived from one original share a
//! single flat segment table regardless of how many times they were sliced and glued.

use crate::error::MappedTextError;
use crate::text::{ranged_lines, LineIndex, Position};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug)]
struct Original {
    text: String,
    index: LineIndex,
    file_name: Option<String>,
}

/// A run of the value that maps contiguously to the original (or is literal when `origin`
/// is `None`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    offset: usize,
    len: usize,
    origin: Option<usize>,
}

impl Segment {
    fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// A piece of a derived mapped string: either literal text or a range of the parent value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Literal(String),
    Range(Range<usize>),
}

impl From<&str> for Piece {
    fn from(text: &str) -> Self {
        Piece::Literal(text.to_string())
    }
}

impl From<String> for Piece {
    fn from(text: String) -> Self {
        Piece::Literal(text)
    }
}

impl From<Range<usize>> for Piece {
    fn from(range: Range<usize>) -> Self {
        Piece::Range(range)
    }
}

/// A string that remembers where each of its bytes came from
#[derive(Debug, Clone)]
pub struct MappedString {
    value: String,
    original: Arc<Original>,
    segments: Arc<[Segment]>,
}

impl MappedString {
    /// The identity mapping over `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self::from_original(text.into(), None)
    }

    /// The identity mapping over the contents of a named file.
    pub fn with_file_name(text: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self::from_original(text.into(), Some(file_name.into()))
    }

    fn from_original(text: String, file_name: Option<String>) -> Self {
        let segments: Vec<Segment> = if text.is_empty() {
            Vec::new()
        } else {
            vec![Segment {
                offset: 0,
                len: text.len(),
                origin: Some(0),
            }]
        };
        let original = Original {
            index: LineIndex::new(&text),
            text: text.clone(),
            file_name,
        };
        Self {
            value: text,
            original: Arc::new(original),
            segments: segments.into(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// The text every offset of this string ultimately maps into
    pub fn original(&self) -> &str {
        &self.original.text
    }

    pub fn file_name(&self) -> Option<&str> {
        self.original.file_name.as_deref()
    }

    /// Whether `other` maps into the same original text as `self`.
    pub fn shares_original(&self, other: &MappedString) -> bool {
        Arc::ptr_eq(&self.original, &other.original)
            || (self.original.text == other.original.text
                && self.original.file_name == other.original.file_name)
    }

    /// Build a new string from literal text and ranges of this string's value.
    pub fn mapped<I, P>(&self, pieces: I) -> Result<MappedString, MappedTextError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Piece>,
    {
        let mut value = String::new();
        let mut segments = Vec::new();
        for piece in pieces {
            match piece.into() {
                Piece::Literal(text) => {
                    push_segment(&mut segments, value.len(), text.len(), None);
                    value.push_str(&text);
                }
                Piece::Range(range) => {
                    self.check_range(&range)?;
                    for seg in self.segments.iter() {
                        let start = range.start.max(seg.offset);
                        let end = range.end.min(seg.end());
                        if start >= end {
                            continue;
                        }
                        let origin = seg.origin.map(|o| o + start - seg.offset);
                        push_segment(&mut segments, value.len() + start - range.start, end - start, origin);
                    }
                    value.push_str(&self.value[range]);
                }
            }
        }
        Ok(MappedString {
            value,
            original: Arc::clone(&self.original),
            segments: segments.into(),
        })
    }

    /// The sub-string covering `range` of the value.
    pub fn slice(&self, range: Range<usize>) -> Result<MappedString, MappedTextError> {
        self.mapped([range])
    }

    /// Glue strings that share an original into one.
    pub fn concat(parts: &[MappedString]) -> Result<MappedString, MappedTextError> {
        let first = parts.first().ok_or(MappedTextError::EmptyConcat)?;
        let mut value = String::new();
        let mut segments = Vec::new();
        for part in parts {
            if !first.shares_original(part) {
                return Err(MappedTextError::MismatchedOriginals);
            }
            for seg in part.segments.iter() {
                push_segment(&mut segments, value.len() + seg.offset, seg.len, seg.origin);
            }
            value.push_str(&part.value);
        }
        Ok(MappedString {
            value,
            original: Arc::clone(&first.original),
            segments: segments.into(),
        })
    }

    /// Split the value into lines (without separators), each still mapped.
    pub fn lines(&self) -> Vec<MappedString> {
        ranged_lines(&self.value)
            .into_iter()
            .filter_map(|line| self.slice(line.range).ok())
            .collect()
    }

    /// Map an offset of the value to the original. `None` when the byte was inserted
    /// literally or the offset is out of range. The end offset maps to the end of the last
    /// segment when that segment came from the original.
    pub fn map(&self, offset: usize) -> Option<usize> {
        if offset > self.value.len() {
            return None;
        }
        let idx = self.segments.partition_point(|s| s.end() <= offset);
        match self.segments.get(idx) {
            Some(seg) => seg.origin.map(|o| o + offset - seg.offset),
            None if self.segments.is_empty() && self.value.is_empty() => Some(0),
            None => {
                let last = self.segments.last()?;
                last.origin.map(|o| o + last.len)
            }
        }
    }

    /// Like [`map`](Self::map) but never gives up on literal text: an offset inside literal
    /// text maps to the last byte of the nearest preceding original run, or to the start of
    /// the first original run when nothing precedes it. `None` only when the offset is out of
    /// range or nothing in the value came from the original.
    pub fn map_closest(&self, offset: usize) -> Option<usize> {
        if offset > self.value.len() {
            return None;
        }
        if let Some(mapped) = self.map(offset) {
            return Some(mapped);
        }
        let idx = self.segments.partition_point(|s| s.end() <= offset);
        let preceding = self.segments[..idx.min(self.segments.len())]
            .iter()
            .rev()
            .find_map(|seg| seg.origin.map(|o| o + seg.len - 1));
        match preceding {
            Some(last_byte) => Some(self.char_floor(last_byte)),
            None => self.segments.iter().find_map(|seg| seg.origin),
        }
    }

    /// Line/column in the original of an offset of the value.
    pub fn position_of(&self, offset: usize) -> Option<Position> {
        self.map_closest(offset)
            .map(|mapped| self.original.index.position(mapped))
    }

    /// Line/column of an offset that is already an original offset.
    pub fn original_position(&self, original_offset: usize) -> Position {
        self.original.index.position(original_offset)
    }

    fn char_floor(&self, mut offset: usize) -> usize {
        while offset > 0 && !self.original.text.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }

    fn check_range(&self, range: &Range<usize>) -> Result<(), MappedTextError> {
        if range.start > range.end || range.end > self.value.len() {
            return Err(MappedTextError::OutOfBounds {
                start: range.start,
                end: range.end,
                len: self.value.len(),
            });
        }
        if !self.value.is_char_boundary(range.start) || !self.value.is_char_boundary(range.end) {
            return Err(MappedTextError::NotCharBoundary {
                start: range.start,
                end: range.end,
            });
        }
        Ok(())
    }
}

fn push_segment(segments: &mut Vec<Segment>, offset: usize, len: usize, origin: Option<usize>) {
    if len == 0 {
        return;
    }
    if let Some(last) = segments.last_mut() {
        let contiguous = match (last.origin, origin) {
            (None, None) => true,
            (Some(prev), Some(next)) => prev + last.len == next,
            _ => false,
        };
        if contiguous && last.end() == offset {
            last.len += len;
            return;
        }
    }
    segments.push(Segment {
        offset,
        len,
        origin,
    });
}

impl fmt::Display for MappedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl AsRef<str> for MappedString {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl From<&str> for MappedString {
    fn from(text: &str) -> Self {
        MappedString::new(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_maps_every_offset() {
        let s = MappedString::new("hello");
        for i in 0..=5 {
            assert_eq!(s.map(i), Some(i));
        }
        assert_eq!(s.map(6), None);
    }

    #[test]
    fn literal_pieces_map_to_none() {
        let s = MappedString::new("key: value");
        let derived = s.mapped(vec![Piece::from("# "), Piece::from(0..3)]).unwrap();
        assert_eq!(derived.value(), "# key");
        assert_eq!(derived.map(0), None);
        assert_eq!(derived.map(1), None);
        assert_eq!(derived.map(2), Some(0));
        assert_eq!(derived.map(4), Some(2));
    }

    #[test]
    fn nested_slices_compose() {
        let s = MappedString::new("0123456789");
        let outer = s.slice(2..9).unwrap();
        let inner = outer.slice(3..5).unwrap();
        assert_eq!(inner.value(), "56");
        assert_eq!(inner.map(0), Some(5));
        assert_eq!(inner.map(1), Some(6));
    }

    #[test]
    fn map_closest_walks_back_over_literals() {
        let s = MappedString::new("abc");
        let derived = s.mapped(vec![Piece::from(0..2), Piece::from("XYZ")]).unwrap();
        assert_eq!(derived.map(3), None);
        assert_eq!(derived.map_closest(3), Some(1));
        let leading = s.mapped(vec![Piece::from("XY"), Piece::from(1..3)]).unwrap();
        assert_eq!(leading.map_closest(0), Some(1));
    }

    #[test]
    fn map_closest_respects_char_boundaries() {
        let s = MappedString::new("aé");
        let derived = s.mapped(vec![Piece::from(0..3), Piece::from("!")]).unwrap();
        assert_eq!(derived.map_closest(3), Some(1));
    }

    #[test]
    fn concat_rejects_foreign_originals() {
        let a = MappedString::new("abc");
        let b = MappedString::new("xyz");
        assert_eq!(
            MappedString::concat(&[a.clone(), b]).unwrap_err(),
            MappedTextError::MismatchedOriginals
        );
        assert_eq!(
            MappedString::concat(&[]).unwrap_err(),
            MappedTextError::EmptyConcat
        );
        let joined = MappedString::concat(&[a.slice(2..3).unwrap(), a.slice(0..1).unwrap()]).unwrap();
        assert_eq!(joined.value(), "ca");
        assert_eq!(joined.map(0), Some(2));
        assert_eq!(joined.map(1), Some(0));
    }

    #[test]
    fn out_of_bounds_range_is_an_error() {
        let s = MappedString::new("abc");
        assert!(matches!(
            s.slice(1..9),
            Err(MappedTextError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn position_of_reports_original_lines() {
        let s = MappedString::new("a: 1\nb: 2\n");
        let second = s.slice(5..9).unwrap();
        assert_eq!(second.position_of(3), Some(Position::new(1, 3)));
    }
}
