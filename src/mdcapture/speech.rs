//! Dictation: stitching streamed speech-to-text results into the note text.

use std::io::BufRead;

use tracing::{debug, warn};

use crate::errors::Result;

/// One event from a speech-to-text provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// Best guess so far for the current utterance; replaces the previous partial.
    Partial(String),
    /// Settled text for the current utterance.
    Final(String),
    Error(String),
}

/// A speech-to-text provider.
pub trait Transcriber {
    fn start(&mut self) -> Result<()>;
    /// Next event, or `None` once the provider has nothing more to say.
    fn next_event(&mut self) -> Result<Option<TranscriptEvent>>;
    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictationState {
    Idle,
    Listening,
}

/// Note text being built up from typed input and transcripts.
#[derive(Debug, Clone)]
pub struct DictationBuffer {
    text: String,
    state: DictationState,
    // in chars
    last_partial_len: usize,
}

impl DictationBuffer {
    pub fn new(initial: &str) -> DictationBuffer {
        DictationBuffer {
            text: initial.to_string(),
            state: DictationState::Idle,
            last_partial_len: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn state(&self) -> DictationState {
        self.state
    }

    /// Begin an utterance, separating it from existing text with a space.
    pub fn start(&mut self) {
        self.state = DictationState::Listening;
        self.last_partial_len = 0;
        if !self.text.is_empty() && !self.text.ends_with(' ') {
            self.text.push(' ');
        }
    }

    pub fn partial(&mut self, text: &str) {
        self.replace_tail(text);
        self.last_partial_len = text.chars().count();
    }

    pub fn finish(&mut self, text: &str) {
        self.replace_tail(text);
        self.state = DictationState::Idle;
        self.last_partial_len = 0;
    }

    pub fn error(&mut self) {
        self.state = DictationState::Idle;
        self.last_partial_len = 0;
    }

    pub fn stop(&mut self) {
        self.state = DictationState::Idle;
        self.last_partial_len = 0;
    }

    pub fn apply(&mut self, event: &TranscriptEvent) {
        match event {
            TranscriptEvent::Partial(t) => self.partial(t),
            TranscriptEvent::Final(t) => self.finish(t),
            TranscriptEvent::Error(reason) => {
                warn!(reason = %reason, "speech recognition error");
                self.error();
            }
        }
    }

    // Drop the previous partial (or everything, if the buffer is shorter)
    // and put `text` in its place.
    fn replace_tail(&mut self, text: &str) {
        let len = self.text.chars().count();
        if self.last_partial_len <= len {
            let keep = len - self.last_partial_len;
            let cut = self.text
                .char_indices()
                .nth(keep)
                .map(|(i, _)| i)
                .unwrap_or(self.text.len());
            self.text.truncate(cut);
            self.text.push_str(text);
        } else {
            self.text = text.to_string();
        }
    }
}

/// Run one dictation session: every utterance is stitched into `buffer`
/// until the transcriber runs dry.
pub fn dictate<T: Transcriber>(transcriber: &mut T, buffer: &mut DictationBuffer) -> Result<()> {
    transcriber.start()?;
    let result = (|| {
        while let Some(event) = transcriber.next_event()? {
            if buffer.state() == DictationState::Idle {
                buffer.start();
            }
            debug!(?event, "transcript event");
            buffer.apply(&event);
        }
        Ok(())
    })();
    transcriber.stop();
    buffer.stop();
    result
}

/// Reads events as tab-separated lines: `partial<TAB>text`, `final<TAB>text`,
/// `error[<TAB>reason]`. Blank and unknown lines are skipped.
pub struct LineTranscriber<R> {
    reader: R,
}

impl<R: BufRead> LineTranscriber<R> {
    pub fn new(reader: R) -> LineTranscriber<R> {
        LineTranscriber { reader }
    }
}

impl<R: BufRead> Transcriber for LineTranscriber<R> {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_event(&mut self) -> Result<Option<TranscriptEvent>> {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let line = line.trim_end_matches(['\n', '\r']);
            let (kind, text) = line.split_once('\t').unwrap_or((line, ""));
            match kind.trim() {
                "partial" => return Ok(Some(TranscriptEvent::Partial(text.to_string()))),
                "final" => return Ok(Some(TranscriptEvent::Final(text.to_string()))),
                "error" => return Ok(Some(TranscriptEvent::Error(text.to_string()))),
                "" => continue,
                other => debug!(kind = other, "skipping unknown transcript line"),
            }
        }
    }

    fn stop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partials_replace_each_other() {
        let mut b = DictationBuffer::new("");
        b.start();
        b.partial("hel");
        b.partial("hello wor");
        assert_eq!(b.text(), "hello wor");
        b.finish("hello world");
        assert_eq!(b.text(), "hello world");
        assert_eq!(b.state(), DictationState::Idle);
    }

    #[test]
    fn start_separates_from_typed_text() {
        let mut b = DictationBuffer::new("typed");
        b.start();
        assert_eq!(b.text(), "typed ");
        b.partial("spoken");
        b.finish("spoken words");
        assert_eq!(b.text(), "typed spoken words");

        let mut b = DictationBuffer::new("ends with space ");
        b.start();
        assert_eq!(b.text(), "ends with space ");
    }

    #[test]
    fn error_keeps_text_and_resets() {
        let mut b = DictationBuffer::new("");
        b.start();
        b.partial("half");
        b.error();
        assert_eq!(b.text(), "half");
        b.start();
        b.finish("next");
        assert_eq!(b.text(), "half next");
    }

    #[test]
    fn longer_partial_than_buffer_replaces_all() {
        let mut b = DictationBuffer::new("");
        b.start();
        b.partial("abcdef");
        b.text = "ab".to_string();
        b.partial("xyz");
        assert_eq!(b.text(), "xyz");
    }

    #[test]
    fn multibyte_partials() {
        let mut b = DictationBuffer::new("");
        b.start();
        b.partial("привет");
        b.finish("привет мир");
        assert_eq!(b.text(), "привет мир");
    }

    #[test]
    fn line_protocol_session() {
        let input = "partial\tbuy\npartial\tbuy mil\nfinal\tbuy milk\n\nnoise\nerror\tno match\npartial\tand eggs\nfinal\tand eggs\n";
        let mut t = LineTranscriber::new(input.as_bytes());
        let mut b = DictationBuffer::new("");
        dictate(&mut t, &mut b).unwrap();
        assert_eq!(b.text(), "buy milk and eggs");
    }
}
