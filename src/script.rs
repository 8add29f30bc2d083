//! Script segmentation: one text segment per character slot.
//!
//! Strategy, in priority order: explicit `[Ck]:` markers (all slots marked),
//! cyclic distribution of non-empty lines (or whitespace-delimited words when
//! no line survives trimming), then a fixed default utterance for a fully
//! empty script.

/// Spoken when a script carries no usable text at all.
pub const DEFAULT_UTTERANCE: &str = "Hello from Voxreel";

/// Split `script` into exactly `slot_count` ordered segments.
///
/// Segments may be empty; callers pad empties with a minimal utterance before
/// synthesis. `slot_count == 0` yields an empty sequence.
pub fn segment_script(script: &str, slot_count: usize) -> Vec<String> {
    if slot_count == 0 {
        return Vec::new();
    }

    if let Some(segments) = segment_by_markers(script, slot_count) {
        tracing::debug!(slot_count, mode = "marker", "segmented script");
        return segments;
    }

    let lines: Vec<&str> = script
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if !lines.is_empty() {
        tracing::debug!(slot_count, mode = "lines", "segmented script");
        return round_robin(&lines, slot_count);
    }

    let words: Vec<&str> = script.split_whitespace().collect();
    if !words.is_empty() {
        tracing::debug!(slot_count, mode = "words", "segmented script");
        return round_robin(&words, slot_count);
    }

    tracing::debug!(slot_count, mode = "default", "segmented script");
    let mut segments = vec![String::new(); slot_count];
    segments[0] = DEFAULT_UTTERANCE.to_string();
    segments
}

#[derive(Clone, Copy, Debug)]
struct MarkerHit {
    /// 0-based slot the marker names.
    slot: usize,
    /// Byte offset of the opening `[`.
    marker_start: usize,
    /// Byte offset just past the trailing `:`.
    text_start: usize,
}

/// Marker mode requires every `[C1]:` ... `[C{slot_count}]:` to appear at
/// least once; otherwise the script falls through to round-robin intact.
fn segment_by_markers(script: &str, slot_count: usize) -> Option<Vec<String>> {
    let hits = scan_markers(script, slot_count);

    // First occurrence per slot, remembered with its position-order index so
    // the segment end is simply the next hit in the scan.
    let mut first: Vec<Option<usize>> = vec![None; slot_count];
    for (idx, hit) in hits.iter().enumerate() {
        if first[hit.slot].is_none() {
            first[hit.slot] = Some(idx);
        }
    }
    if first.iter().any(Option::is_none) {
        return None;
    }

    let mut segments = Vec::with_capacity(slot_count);
    for idx in first.into_iter().flatten() {
        let start = hits[idx].text_start;
        let end = hits
            .get(idx + 1)
            .map(|next| next.marker_start)
            .unwrap_or(script.len());
        segments.push(script[start..end].trim().to_string());
    }
    Some(segments)
}

/// Single left-to-right scan for `[C<digits>]:` markers with an in-range slot
/// number. Hits come back in position order.
fn scan_markers(script: &str, slot_count: usize) -> Vec<MarkerHit> {
    let bytes = script.as_bytes();
    let mut hits = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            if let Some(hit) = parse_marker_at(bytes, i, slot_count) {
                i = hit.text_start;
                hits.push(hit);
                continue;
            }
        }
        i += 1;
    }
    hits
}

fn parse_marker_at(bytes: &[u8], at: usize, slot_count: usize) -> Option<MarkerHit> {
    let mut j = at + 1;
    if bytes.get(j) != Some(&b'C') {
        return None;
    }
    j += 1;
    let digits_start = j;
    while bytes.get(j).is_some_and(u8::is_ascii_digit) {
        j += 1;
    }
    if j == digits_start || bytes.get(j) != Some(&b']') {
        return None;
    }
    let number: usize = std::str::from_utf8(&bytes[digits_start..j])
        .ok()?
        .parse()
        .ok()?;
    j += 1;
    if bytes.get(j) != Some(&b':') {
        return None;
    }
    if number == 0 || number > slot_count {
        return None;
    }
    Some(MarkerHit {
        slot: number - 1,
        marker_start: at,
        text_start: j + 1,
    })
}

fn round_robin(units: &[&str], slot_count: usize) -> Vec<String> {
    let mut slots = vec![String::new(); slot_count];
    for (i, unit) in units.iter().enumerate() {
        let slot = &mut slots[i % slot_count];
        if !slot.is_empty() {
            slot.push(' ');
        }
        slot.push_str(unit);
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_slot_count_segments_for_all_modes() {
        let scripts = [
            "[C1]: a [C2]: b [C3]: c",
            "line one\nline two",
            "just some words here",
            "",
            "   \n \t ",
        ];
        for script in scripts {
            for n in 1..=6 {
                assert_eq!(segment_script(script, n).len(), n, "script={script:?} n={n}");
            }
        }
    }

    #[test]
    fn marker_round_trip() {
        for n in 1..=5 {
            let script: String = (1..=n)
                .map(|i| format!("[C{i}]: text_{i} "))
                .collect::<Vec<_>>()
                .join("");
            let expected: Vec<String> = (1..=n).map(|i| format!("text_{i}")).collect();
            assert_eq!(segment_script(&script, n), expected);
        }
    }

    #[test]
    fn marker_segments_follow_document_order_not_marker_order() {
        let segments = segment_script("[C2]: bye [C1]: hi", 2);
        assert_eq!(segments, vec!["hi", "bye"]);
    }

    #[test]
    fn partial_markers_fall_through_to_round_robin() {
        // Only [C1]: present for two slots: treated as one plain line.
        let segments = segment_script("[C1]: hello there", 2);
        assert_eq!(segments[0], "[C1]: hello there");
        assert_eq!(segments[1], "");
    }

    #[test]
    fn marker_with_out_of_range_number_stays_in_text() {
        let segments = segment_script("[C1]: a [C3]: b [C2]: c", 2);
        assert_eq!(segments, vec!["a [C3]: b", "c"]);
    }

    #[test]
    fn duplicate_marker_terminates_the_preceding_segment() {
        // Slot text starts at the first [C1]:; the repeat only caps [C2]:'s
        // segment, and the text after it belongs to no slot.
        let segments = segment_script("[C1]: first [C2]: mid [C1]: again", 2);
        assert_eq!(segments, vec!["first", "mid"]);
    }

    #[test]
    fn lines_round_robin_preserves_order() {
        let segments = segment_script("one\ntwo\nthree", 3);
        assert_eq!(segments, vec!["one", "two", "three"]);
    }

    #[test]
    fn lines_wrap_cyclically() {
        let segments = segment_script("a\nb\nc\nd\ne", 2);
        assert_eq!(segments, vec!["a c e", "b d"]);
    }

    #[test]
    fn single_line_goes_to_slot_zero_whole() {
        let segments = segment_script("alpha beta gamma delta", 3);
        assert_eq!(segments, vec!["alpha beta gamma delta", "", ""]);
    }

    #[test]
    fn word_units_distribute_cyclically() {
        let segments = round_robin(&["alpha", "beta", "gamma", "delta"], 3);
        assert_eq!(segments, vec!["alpha delta", "beta", "gamma"]);
    }

    #[test]
    fn empty_script_yields_default_utterance_in_slot_zero() {
        let segments = segment_script("", 3);
        assert_eq!(segments[0], DEFAULT_UTTERANCE);
        assert_eq!(&segments[1..], &["", ""]);

        let segments = segment_script(" \n\t ", 1);
        assert_eq!(segments, vec![DEFAULT_UTTERANCE]);
    }

    #[test]
    fn empty_marker_segment_is_kept_empty() {
        let segments = segment_script("[C1]: [C2]: talk", 2);
        assert_eq!(segments, vec!["", "talk"]);
    }

    #[test]
    fn multi_digit_markers_parse() {
        let script: String = (1..=12)
            .map(|i| format!("[C{i}]: s{i} "))
            .collect::<Vec<_>>()
            .join("");
        let segments = segment_script(&script, 12);
        assert_eq!(segments[11], "s12");
        assert_eq!(segments[9], "s10");
    }
}
