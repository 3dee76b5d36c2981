//! Line-timestamped lyrics (`[mm:ss.xx]text`) parsing and lookup.

use tracing::warn;

/// One timed line of a lyrics document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub offset_ms: u64,
    pub line: String,
}

/// Time-to-line index built from a lyrics document.
///
/// Entries are always sorted by `offset_ms` (non-decreasing). The last entry's
/// offset is the natural end of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricsTimeline {
    entries: Vec<TimelineEntry>,
}

/// The three display slots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayLines {
    pub previous: String,
    pub current: String,
    pub next: String,
}

impl DisplayLines {
    #[must_use]
    pub fn new(previous: &str, current: &str, next: &str) -> Self {
        Self {
            previous: previous.to_string(),
            current: current.to_string(),
            next: next.to_string(),
        }
    }

    /// A placeholder message shown in the middle slot
    #[must_use]
    pub fn message(text: &str) -> Self {
        Self::new("", text, "")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.previous.is_empty() && self.current.is_empty() && self.next.is_empty()
    }
}

/// Where a playback offset falls on the timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cue {
    /// Lines to show and the offset at which they stop being valid
    Show { lines: DisplayLines, until_ms: u64 },
    /// The offset is at or past the final entry
    Finished,
}

impl LyricsTimeline {
    /// Parse a lyrics document. Lines without a leading timestamp are ignored;
    /// malformed timestamps are logged and skipped.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut offset_ms: i64 = 0;
        let mut entries = Vec::new();

        for raw in input.lines() {
            let line = raw.trim();
            if !line.starts_with('[') {
                continue;
            }

            if let Some((tag, value)) = parse_id_tag(line) {
                if tag.eq_ignore_ascii_case("offset") {
                    match value.trim().parse::<i64>() {
                        Ok(parsed) => offset_ms = parsed,
                        Err(_) => warn!("Ignoring malformed offset tag: {}", line),
                    }
                }
                continue;
            }

            parse_lyric_line(line, &mut entries);
        }

        if offset_ms != 0 {
            for entry in &mut entries {
                entry.offset_ms = apply_offset(entry.offset_ms, offset_ms);
            }
        }

        // sort_by_key is stable, so equal timestamps keep document order
        entries.sort_by_key(|entry| entry.offset_ms);

        Self { entries }
    }

    #[must_use]
    pub fn from_entries(mut entries: Vec<TimelineEntry>) -> Self {
        entries.sort_by_key(|entry| entry.offset_ms);
        Self { entries }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Parallel timestamp view
    #[must_use]
    pub fn offsets(&self) -> Vec<u64> {
        self.entries.iter().map(|entry| entry.offset_ms).collect()
    }

    /// Parallel text view
    #[must_use]
    pub fn lines(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.line.as_str()).collect()
    }

    /// Offset of the final entry
    #[must_use]
    pub fn end_offset(&self) -> Option<u64> {
        self.entries.last().map(|entry| entry.offset_ms)
    }

    /// Find the lines to display at `offset_ms`.
    ///
    /// Before the first entry this is a lead-in cue showing only the upcoming
    /// line. Inside `[t[n-1], t[n])` it is `(line[n-2], line[n-1], line[n])`.
    #[must_use]
    pub fn locate(&self, offset_ms: u64) -> Cue {
        let Some(end) = self.end_offset() else {
            return Cue::Finished;
        };
        if offset_ms >= end {
            return Cue::Finished;
        }

        // index of the first entry strictly after the offset
        let n = self.entries.partition_point(|entry| entry.offset_ms <= offset_ms);
        let upcoming = &self.entries[n];

        if n == 0 {
            return Cue::Show {
                lines: DisplayLines::new("", "", &upcoming.line),
                until_ms: upcoming.offset_ms,
            };
        }

        let previous = if n >= 2 {
            self.entries[n - 2].line.as_str()
        } else {
            ""
        };

        Cue::Show {
            lines: DisplayLines::new(previous, &self.entries[n - 1].line, &upcoming.line),
            until_ms: upcoming.offset_ms,
        }
    }
}

/// Parse an ID tag like [ti:Title] or [offset:+250]
fn parse_id_tag(line: &str) -> Option<(&str, &str)> {
    let end = line.find(']')?;
    let content = &line[1..end];
    let (tag, value) = content.split_once(':')?;

    // A numeric tag part means this is a timestamp, not an ID tag
    if tag.is_empty() || tag.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((tag, value))
}

/// Parse `[00:12.34]Hello` or `[00:05.00][00:15.00]Chorus` into entries
fn parse_lyric_line(line: &str, entries: &mut Vec<TimelineEntry>) {
    let mut remaining = line;
    let mut timestamps = Vec::new();

    while remaining.starts_with('[') {
        let Some(end) = remaining.find(']') else {
            break;
        };
        let token = &remaining[1..end];
        if !looks_like_timestamp(token) {
            break;
        }
        match parse_timestamp(token) {
            Some(ms) => timestamps.push(ms),
            None => warn!("Skipping malformed timestamp [{}]", token),
        }
        remaining = &remaining[end + 1..];
    }

    let text = remaining.trim();
    if text.is_empty() {
        return;
    }

    for offset_ms in timestamps {
        entries.push(TimelineEntry {
            offset_ms,
            line: text.to_string(),
        });
    }
}

/// `mm:` followed by anything: a timestamp attempt, well-formed or not
fn looks_like_timestamp(token: &str) -> bool {
    token
        .split_once(':')
        .is_some_and(|(minutes, _)| !minutes.is_empty() && minutes.chars().all(|c| c.is_ascii_digit()))
}

/// Parse "mm:ss.xx", "mm:ss" or "mm:ss:xx" into milliseconds
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_timestamp(token: &str) -> Option<u64> {
    let parts: Vec<&str> = token.trim().split(':').collect();

    match parts.as_slice() {
        [minutes, seconds] => {
            let minutes: u64 = minutes.parse().ok()?;
            if seconds.is_empty() || !seconds.chars().all(|c| c.is_ascii_digit() || c == '.') {
                return None;
            }
            let seconds: f64 = seconds.parse().ok()?;
            if !seconds.is_finite() || seconds < 0.0 {
                return None;
            }
            // seconds is finite and non-negative here
            minutes
                .checked_mul(60_000)?
                .checked_add((seconds * 1000.0).round() as u64)
        }
        [minutes, seconds, hundredths] => {
            let minutes: u64 = minutes.parse().ok()?;
            let seconds: u64 = seconds.parse().ok()?;
            let hundredths: u64 = hundredths.parse().ok()?;
            minutes
                .checked_mul(60_000)?
                .checked_add(seconds.checked_mul(1000)?)?
                .checked_add(hundredths.checked_mul(10)?)
        }
        _ => None,
    }
}

/// Apply a millisecond offset (can be negative), saturating at zero
fn apply_offset(offset_ms: u64, shift_ms: i64) -> u64 {
    if shift_ms >= 0 {
        offset_ms.saturating_add(shift_ms.unsigned_abs())
    } else {
        offset_ms.saturating_sub(shift_ms.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> LyricsTimeline {
        LyricsTimeline::parse("[00:00.00]a\n[00:01.00]b\n[00:02.00]c\n")
    }

    #[test]
    fn test_parse_simple_lrc() {
        let timeline = LyricsTimeline::parse("[00:12.34]Hello world");
        assert_eq!(timeline.offsets(), vec![12340]);
        assert_eq!(timeline.lines(), vec!["Hello world"]);
    }

    #[test]
    fn test_parse_minutes() {
        let timeline = LyricsTimeline::parse("[02:03.5]Later");
        assert_eq!(timeline.offsets(), vec![123_500]);
    }

    #[test]
    fn test_untimed_and_empty_lines_ignored() {
        let input = r"
Intro text without timing
[00:05.00]First

[00:07.00]
[00:10.00]Second
";
        let timeline = LyricsTimeline::parse(input);
        assert_eq!(timeline.lines(), vec!["First", "Second"]);
    }

    #[test]
    fn test_malformed_timestamp_dropped() {
        let input = "[00:05.00]Good\n[00:xx.00]Bad\n[00:10.00]Also good";
        let timeline = LyricsTimeline::parse(input);
        assert_eq!(timeline.lines(), vec!["Good", "Also good"]);
    }

    #[test]
    fn test_no_timestamps_is_empty() {
        let timeline = LyricsTimeline::parse("just some\nplain lyrics");
        assert!(timeline.is_empty());
        assert_eq!(timeline.end_offset(), None);
    }

    #[test]
    fn test_id_tags_ignored() {
        let timeline = LyricsTimeline::parse("[ti:Song]\n[ar:Artist]\n[00:05.00]Lyrics here");
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn test_parse_offset() {
        let timeline = LyricsTimeline::parse("[offset:500]\n[00:10.00]Test");
        assert_eq!(timeline.offsets(), vec![10500]);
    }

    #[test]
    fn test_parse_negative_offset() {
        let timeline = LyricsTimeline::parse("[offset:-500]\n[00:00.20]Early\n[00:10.00]Test");
        assert_eq!(timeline.offsets(), vec![0, 9500]);
    }

    #[test]
    fn test_parse_multi_timestamp_line() {
        let timeline = LyricsTimeline::parse("[00:15.00]Verse\n[00:05.00][00:20.00]Chorus");
        assert_eq!(timeline.offsets(), vec![5000, 15000, 20000]);
        assert_eq!(timeline.lines(), vec!["Chorus", "Verse", "Chorus"]);
    }

    #[test]
    fn test_timeline_non_decreasing() {
        let input = "[00:30.00]c\n[00:10.00]a\n[00:10.00]a2\n[00:20.00]b\n[00:05:50]z";
        let timeline = LyricsTimeline::parse(input);
        let offsets = timeline.offsets();
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(timeline.lines(), vec!["z", "a", "a2", "b", "c"]);
    }

    #[test]
    fn test_alternative_timestamp_format() {
        let timeline = LyricsTimeline::parse("[00:12:34]Hello world");
        assert_eq!(timeline.offsets(), vec![12340]);
    }

    #[test]
    fn test_parse_cjk_lyrics() {
        let timeline = LyricsTimeline::parse("[00:05.00]你好世界");
        assert_eq!(timeline.lines(), vec!["你好世界"]);
    }

    #[test]
    fn test_locate_middle() {
        let timeline = abc();
        assert_eq!(
            timeline.locate(500),
            Cue::Show {
                lines: DisplayLines::new("", "a", "b"),
                until_ms: 1000
            }
        );
        assert_eq!(
            timeline.locate(1500),
            Cue::Show {
                lines: DisplayLines::new("a", "b", "c"),
                until_ms: 2000
            }
        );
    }

    #[test]
    fn test_locate_on_boundary() {
        let timeline = abc();
        assert_eq!(
            timeline.locate(1000),
            Cue::Show {
                lines: DisplayLines::new("a", "b", "c"),
                until_ms: 2000
            }
        );
    }

    #[test]
    fn test_locate_lead_in() {
        let timeline = LyricsTimeline::parse("[00:05.00]First\n[00:10.00]Second");
        assert_eq!(
            timeline.locate(1200),
            Cue::Show {
                lines: DisplayLines::new("", "", "First"),
                until_ms: 5000
            }
        );
    }

    #[test]
    fn test_locate_finished() {
        let timeline = abc();
        assert_eq!(timeline.locate(2000), Cue::Finished);
        assert_eq!(timeline.locate(90_000), Cue::Finished);
        assert_eq!(LyricsTimeline::default().locate(0), Cue::Finished);
    }

    #[test]
    fn test_display_lines_message() {
        let lines = DisplayLines::message("Lyrics not synced");
        assert_eq!(lines.current, "Lyrics not synced");
        assert!(!lines.is_empty());
        assert!(DisplayLines::default().is_empty());
    }
}
