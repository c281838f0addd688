use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

use crate::internal_prelude::*;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Iteration { width: usize },
    Extension,
}

/// A series file name pattern.
///
/// `%T` expands to the iteration index, `%0NT` to the index zero-padded to `N` digits, `%E`
/// to the backend file extension and `%%` to a literal `%`. A pattern without `%T` stores all
/// iterations in one file. `%T` may appear at most once, and only in the file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    text: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Self> {
        ensure!(!text.is_empty(), "series pattern must not be empty");
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            let segment = match chars.next() {
                Some('%') => {
                    literal.push('%');
                    continue;
                }
                Some('T') => Segment::Iteration { width: 0 },
                Some('E') => Segment::Extension,
                Some('0') => {
                    let mut digits = String::new();
                    while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                        digits.push(d);
                        chars.next();
                    }
                    match (digits.parse::<usize>(), chars.next()) {
                        (Ok(width), Some('T')) => Segment::Iteration { width },
                        _ => fail!("invalid padding in series pattern {:?}", text),
                    }
                }
                Some(other) => fail!("unknown sequence %{} in series pattern {:?}", other, text),
                None => fail!("dangling % in series pattern {:?}", text),
            };
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let pattern = Self { text: text.to_owned(), segments };
        let count = pattern.iteration_segments();
        ensure!(count <= 1, "series pattern {:?} contains %T more than once", text);
        ensure!(
            count == 0 || pattern.file_segment_start() <= pattern.iteration_pos(),
            "%T must be part of the file name in series pattern {:?}",
            text
        );
        Ok(pattern)
    }

    fn iteration_segments(&self) -> usize {
        self.segments.iter().filter(|s| matches!(s, Segment::Iteration { .. })).count()
    }

    fn iteration_pos(&self) -> usize {
        self.segments.iter().position(|s| matches!(s, Segment::Iteration { .. })).unwrap_or(0)
    }

    /// Index of the first segment that belongs to the file name, i.e. after the last `/`.
    fn file_segment_start(&self) -> usize {
        self.segments
            .iter()
            .rposition(|s| matches!(s, Segment::Literal(l) if l.contains('/')))
            .unwrap_or(0)
    }

    /// Returns true if the pattern produces one file per iteration.
    pub fn is_file_based(&self) -> bool {
        self.iteration_segments() == 1
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    fn expand_segments(segments: &[Segment], index: Option<u64>, extension: &str) -> String {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Literal(l) => out.push_str(l),
                Segment::Extension => out.push_str(extension),
                Segment::Iteration { width } => match index {
                    Some(index) => out.push_str(&format!("{:0width$}", index, width = *width)),
                    None => out.push_str("%T"),
                },
            }
        }
        out
    }

    fn split_at_iteration(&self, extension: &str) -> (String, String) {
        let pos = self.iteration_pos();
        if !self.is_file_based() {
            return (Self::expand_segments(&self.segments, None, extension), String::new());
        }
        (
            Self::expand_segments(&self.segments[..pos], None, extension),
            Self::expand_segments(&self.segments[pos + 1..], None, extension),
        )
    }

    /// The path of iteration `index` (ignored if the pattern has no `%T`).
    pub fn expand(&self, index: u64, extension: &str) -> PathBuf {
        PathBuf::from(Self::expand_segments(&self.segments, Some(index), extension))
    }

    /// The single file of a pattern without `%T`.
    pub fn expand_series(&self, extension: &str) -> PathBuf {
        PathBuf::from(Self::expand_segments(&self.segments, None, extension))
    }

    /// The directory holding the files of this pattern.
    pub fn directory(&self, extension: &str) -> PathBuf {
        let (prefix, _) = self.split_at_iteration(extension);
        match Path::new(&prefix).parent() {
            Some(parent) if !parent.as_os_str().is_empty() && prefix.contains('/') => {
                parent.to_path_buf()
            }
            _ => PathBuf::from("."),
        }
    }

    /// Extracts the iteration index from a file name produced by this pattern.
    pub fn match_file_name(&self, file_name: &str, extension: &str) -> Option<u64> {
        if !self.is_file_based() {
            return None;
        }
        let (prefix, suffix) = self.split_at_iteration(extension);
        let prefix = prefix.rsplit('/').next().unwrap_or(&prefix);
        let digits = file_name.strip_prefix(prefix)?.strip_suffix(suffix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text)
    }
}
