//! Claude reply-shape handling.
//!
//! Claude bots on Poe may open a reply with a `<thinking>…</thinking>`
//! segment. In compatibility mode that segment is removed before the text
//! is relayed. The filter is stateful so the tags may arrive split across
//! any number of fragments; an unterminated segment is flushed verbatim at
//! end of stream, matching the strip-only-complete-pairs behavior.

const OPEN_TAG: &str = "<thinking>";
const CLOSE_TAG: &str = "</thinking>";

#[derive(Debug, PartialEq, Eq)]
enum FilterState {
    /// Still looking for the opening tag.
    Scanning,
    /// Inside the thinking segment, buffering until the closing tag.
    Suppressing,
    /// One segment stripped (or none will appear); pass everything through.
    Passthrough,
}

pub struct ThinkingFilter {
    state: FilterState,
    /// Trailing bytes that might be the start of a tag.
    pending: String,
    /// Suppressed segment content, kept so an unterminated segment can be
    /// restored at end of stream.
    suppressed: String,
}

impl Default for ThinkingFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkingFilter {
    pub fn new() -> Self {
        Self {
            state: FilterState::Scanning,
            pending: String::new(),
            suppressed: String::new(),
        }
    }

    /// Feeds one fragment through the filter, returning the text to relay.
    pub fn push(&mut self, fragment: &str) -> String {
        let mut work = std::mem::take(&mut self.pending);
        work.push_str(fragment);

        let mut output = String::new();
        loop {
            match self.state {
                FilterState::Passthrough => {
                    output.push_str(&work);
                    return output;
                }
                FilterState::Scanning => match work.find(OPEN_TAG) {
                    Some(at) => {
                        output.push_str(&work[..at]);
                        work = work[at + OPEN_TAG.len()..].to_string();
                        self.state = FilterState::Suppressing;
                    }
                    None => {
                        let keep = partial_tag_suffix(&work, OPEN_TAG);
                        output.push_str(&work[..work.len() - keep]);
                        self.pending = work[work.len() - keep..].to_string();
                        return output;
                    }
                },
                FilterState::Suppressing => match work.find(CLOSE_TAG) {
                    Some(at) => {
                        self.suppressed.clear();
                        work = work[at + CLOSE_TAG.len()..].to_string();
                        self.state = FilterState::Passthrough;
                    }
                    None => {
                        let keep = partial_tag_suffix(&work, CLOSE_TAG);
                        self.suppressed.push_str(&work[..work.len() - keep]);
                        self.pending = work[work.len() - keep..].to_string();
                        return output;
                    }
                },
            }
        }
    }

    /// Flushes any held-back text at end of stream. An opening tag that was
    /// never closed is restored, so only complete pairs are stripped.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        match self.state {
            FilterState::Suppressing => {
                let mut out = String::from(OPEN_TAG);
                out.push_str(&std::mem::take(&mut self.suppressed));
                out.push_str(&pending);
                out
            }
            _ => pending,
        }
    }
}

/// Length of the longest suffix of `s` that is a proper prefix of `tag`.
fn partial_tag_suffix(s: &str, tag: &str) -> usize {
    let max = tag.len().min(s.len());
    for len in (1..=max).rev() {
        if s.is_char_boundary(s.len() - len) && tag.starts_with(&s[s.len() - len..]) {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(fragments: &[&str]) -> String {
        let mut filter = ThinkingFilter::new();
        let mut out = String::new();
        for fragment in fragments {
            out.push_str(&filter.push(fragment));
        }
        out.push_str(&filter.finish());
        out
    }

    #[test]
    fn passes_plain_text_through() {
        assert_eq!(run(&["hello ", "world"]), "hello world");
    }

    #[test]
    fn strips_a_complete_segment() {
        assert_eq!(
            run(&["<thinking>let me reason</thinking>the answer"]),
            "the answer"
        );
    }

    #[test]
    fn strips_a_segment_split_across_fragments() {
        assert_eq!(
            run(&["<thi", "nking>hidden ", "reasoning</thin", "king>visible"]),
            "visible"
        );
    }

    #[test]
    fn preserves_text_around_the_segment() {
        assert_eq!(run(&["pre<thinking>x</thinking>post"]), "prepost");
    }

    #[test]
    fn restores_an_unterminated_segment() {
        assert_eq!(
            run(&["<thinking>never closed"]),
            "<thinking>never closed"
        );
    }

    #[test]
    fn only_the_first_segment_is_stripped() {
        assert_eq!(
            run(&["<thinking>a</thinking>text<thinking>b</thinking>"]),
            "text<thinking>b</thinking>"
        );
    }

    #[test]
    fn lone_angle_bracket_is_not_held_forever() {
        assert_eq!(run(&["2 < 3 and 4 > 3"]), "2 < 3 and 4 > 3");
    }
}
