//! Byte offset → line lookups.

/// Start offsets of every line in a source text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            starts,
            len: source.len(),
        }
    }

    /// 1-based line number containing `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset)
    }

    /// Byte range of a 1-based line, without its newline.
    pub fn line_range(&self, line: usize) -> (usize, usize) {
        let idx = line.saturating_sub(1).min(self.starts.len() - 1);
        let start = self.starts[idx];
        let end = self
            .starts
            .get(idx + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        (start, end)
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }
}
