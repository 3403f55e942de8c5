use super::{joined_len, Chunk, ChunkKind, Document};

/// How a segment that may exceed the size bound is turned into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Split {
    /// One chunk if it fits, otherwise consecutive runs of whole lines
    Lines,
    /// Overlapping windows of at most `lines` lines
    Windows { lines: usize, overlap: usize },
}

/// A contiguous 0-based half-open line range chosen by a strategy
#[derive(Debug, Clone)]
pub(super) struct Segment {
    pub start: usize,
    pub end: usize,
    pub name: Option<String>,
    pub kind: ChunkKind,
    pub split: Split,
}

/// Materializes segments into chunks that respect `max_chars`
pub(super) struct SegmentWriter<'a> {
    document: &'a Document,
    lines: &'a [&'a str],
    max_chars: usize,
    chunks: Vec<Chunk>,
}

impl<'a> SegmentWriter<'a> {
    pub fn new(document: &'a Document, lines: &'a [&'a str], max_chars: usize) -> Self {
        Self {
            document,
            lines,
            max_chars: max_chars.max(1),
            chunks: Vec::new(),
        }
    }

    pub fn write(&mut self, segment: Segment) {
        if segment.start >= segment.end {
            return;
        }

        match segment.split {
            Split::Lines
                if joined_len(self.lines, segment.start, segment.end) <= self.max_chars =>
            {
                self.push(
                    segment.start,
                    segment.end,
                    segment.name.clone(),
                    segment.kind,
                );
            }
            Split::Lines => self.write_windows(&segment, usize::MAX, 0),
            Split::Windows { lines, overlap } => {
                self.write_windows(&segment, lines.max(1), overlap)
            }
        }
    }

    pub fn finish(self) -> Vec<Chunk> {
        self.chunks
    }

    /// Window starts strictly increase, so every emitted id is distinct. The last window
    /// always ends at the segment end.
    fn write_windows(&mut self, segment: &Segment, window_lines: usize, overlap: usize) {
        let mut part = 0;
        let mut start = segment.start;

        loop {
            let mut end = start;
            let mut chars = 0;
            while end < segment.end && end - start < window_lines {
                let separator = usize::from(end > start);
                let added = self.lines[end].chars().count() + separator;
                if end > start && chars + added > self.max_chars {
                    break;
                }
                chars += added;
                end += 1;
            }

            if end == start + 1 && chars > self.max_chars {
                self.push_fragments(start, segment, &mut part);
            } else if !self.is_blank(start, end) {
                part += 1;
                let name = part_name(segment.name.as_deref(), part);
                self.push(start, end, name, segment.kind);
            }

            if end >= segment.end {
                break;
            }
            start = end.saturating_sub(overlap).max(start + 1);
        }
    }

    /// Split a single over-long line into character runs of at most `max_chars`
    fn push_fragments(&mut self, line: usize, segment: &Segment, part: &mut usize) {
        let chars: Vec<char> = self.lines[line].chars().collect();
        for (index, piece) in chars.chunks(self.max_chars).enumerate() {
            let text: String = piece.iter().collect();
            if text.trim().is_empty() {
                continue;
            }
            *part += 1;
            let offset = index * self.max_chars;
            self.chunks.push(Chunk {
                id: format!("{}:{}+{}", self.document.path, line + 1, offset),
                text,
                path: self.document.path.clone(),
                start_line: line + 1,
                end_line: line + 1,
                name: part_name(segment.name.as_deref(), *part),
                kind: segment.kind,
                metadata: self.document.metadata.clone(),
            });
        }
    }

    fn push(&mut self, start: usize, end: usize, name: Option<String>, kind: ChunkKind) {
        if self.is_blank(start, end) {
            return;
        }

        self.chunks.push(Chunk {
            id: format!("{}:{}", self.document.path, start + 1),
            text: self.lines[start..end].join("\n"),
            path: self.document.path.clone(),
            start_line: start + 1,
            end_line: end,
            name,
            kind,
            metadata: self.document.metadata.clone(),
        });
    }

    fn is_blank(&self, start: usize, end: usize) -> bool {
        self.lines[start..end].iter().all(|line| line.trim().is_empty())
    }
}

fn part_name(name: Option<&str>, part: usize) -> Option<String> {
    name.map(|name| format!("{}_part_{}", name, part))
}
