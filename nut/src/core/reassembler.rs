//! Turns arbitrarily split text fragments back into whole lines.

/// Buffers fragments and hands out complete lines in arrival order.
///
/// After every [`feed`](Self::feed) the buffer holds no `\n`: each complete line
/// has been emitted, and only the trailing partial line is retained.
#[derive(Debug, Default)]
pub struct LineReassembler {
    buffer: String,
}

impl LineReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `fragment` and return every line it completed, terminators stripped.
    pub fn feed(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last_newline + 1);
        let mut complete = std::mem::replace(&mut self.buffer, rest);
        complete.pop();
        complete.split('\n').map(str::to_string).collect()
    }

    /// Partial line waiting for its terminator.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// End of stream: the unterminated tail is discarded, never classified.
    ///
    /// Returns the discarded text so the caller can report it.
    pub fn finish(self) -> Option<String> {
        (!self.buffer.is_empty()).then_some(self.buffer)
    }
}
