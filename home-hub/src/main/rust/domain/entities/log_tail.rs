/// Keeps only the most recent characters of a decoder's diagnostic output
#[derive(Debug, Clone, Default)]
pub struct LogTail {
    text: String,
    capacity: usize,
}

impl LogTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            text: String::new(),
            capacity,
        }
    }

    pub fn append(&mut self, chunk: &str) {
        self.text.push_str(chunk);

        // Capacity 0 means unbounded
        if self.capacity == 0 {
            return;
        }

        let excess = self.text.chars().count().saturating_sub(self.capacity);
        if excess > 0 {
            let cut = self
                .text
                .char_indices()
                .nth(excess)
                .map(|(idx, _)| idx)
                .unwrap_or(self.text.len());
            self.text.drain(..cut);
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
