//! Overlap reconciler: stitch slice transcripts back into one text.
//!
//! ## Why is there duplicated text at all?
//!
//! Tall images are cut into horizontal slices that overlap by a fixed number
//! of pixels, so that no line is only ever seen cut in half. The price is
//! that the lines inside the overlap are transcribed twice: once at the end
//! of slice N and once at the start of slice N+1.
//!
//! ## Space-free comparison
//!
//! Two independent transcriptions of the same pixels rarely agree on spacing
//! (`( x )` vs `(x)`, `f'(x) = 1` vs `f'(x)=1`). All comparisons therefore
//! run on the text with every whitespace character removed. This accepts a
//! small risk of a false seam for a much lower rate of visibly duplicated
//! sentences, which is the worse failure for a reader.
//!
//! ## Steps
//!
//! 1. A slice whose space-free text already occurs in the tail of the merged
//!    text is a pure repeat and is discarded.
//! 2. Otherwise the longest suffix of the merged text that equals a prefix
//!    of the slice is searched, from `max_overlap` down to `min_overlap`
//!    characters. Shorter matches are coincidences, not seams.
//! 3. The match length is mapped back proportionally onto the slice with its
//!    whitespace, and the cut is snapped forward to the next line break,
//!    sentence end or formula delimiter so it does not land mid-sentence or
//!    mid-formula.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MergeConfig;

/// What happened to one slice transcript when it was merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeDecision {
    /// No overlap found; the slice was appended in full.
    Appended,
    /// A duplicated prefix of `removed_chars` characters was dropped.
    Trimmed { removed_chars: usize },
    /// The whole slice repeated text already merged.
    Discarded,
}

/// Return the part of `incoming` to append to `existing`, using the default
/// [`MergeConfig`].
///
/// The result is empty when the slice is a pure duplicate, the full
/// `incoming` when no overlap is found, and otherwise a suffix of `incoming`
/// with leading whitespace removed.
pub fn reconcile(existing: &str, incoming: &str) -> String {
    reconcile_with(existing, incoming, &MergeConfig::default())
}

/// [`reconcile`] with explicit thresholds.
pub fn reconcile_with(existing: &str, incoming: &str, config: &MergeConfig) -> String {
    reconcile_seam(existing, incoming, config).0
}

/// [`reconcile_with`], also reporting whether the cut landed on a natural
/// boundary. It is `false` only when a seam was found but no boundary was in
/// reach, i.e. the slices are joined mid-sentence.
fn reconcile_seam(existing: &str, incoming: &str, config: &MergeConfig) -> (String, bool) {
    if existing.trim().is_empty() {
        return (incoming.to_string(), true);
    }
    let ex = space_free(existing);
    let inc = space_free(incoming);
    if inc.is_empty() {
        return (String::new(), true);
    }

    // 1. pure repeat of the recent tail
    let tail = &ex[ex.len().saturating_sub(config.max_overlap)..];
    if contains(tail, &inc) {
        debug!("Slice of {} chars repeats merged tail; discarding", inc.len());
        return (String::new(), true);
    }

    // 2. longest suffix/prefix seam
    let Some(overlap) = longest_seam(&ex, &inc, config) else {
        return (incoming.to_string(), true);
    };

    // 3. proportional cut, snapped to a boundary
    let chars: Vec<char> = incoming.chars().collect();
    let estimate = overlap * chars.len() / inc.len();
    let cut = snap_to_boundary(&chars, estimate.min(chars.len()), config.snap_window);
    let on_boundary = at_boundary(&chars, cut);
    debug!(
        "Seam of {} space-free chars; cutting slice at char {} (estimate {}, boundary: {})",
        overlap, cut, estimate, on_boundary
    );
    let kept = chars[cut..]
        .iter()
        .collect::<String>()
        .trim_start()
        .to_string();
    (kept, on_boundary)
}

fn space_free(s: &str) -> Vec<char> {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn contains(haystack: &[char], needle: &[char]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Length of the longest suffix of `ex` equal to a prefix of `inc`, within
/// the configured bounds.
fn longest_seam(ex: &[char], inc: &[char], config: &MergeConfig) -> Option<usize> {
    let upper = config.max_overlap.min(ex.len()).min(inc.len());
    (config.min_overlap..=upper)
        .rev()
        .find(|&len| ex[ex.len() - len..] == inc[..len])
}

// ── Boundary snapping ────────────────────────────────────────────────────────

fn is_sentence_end(c: char, next: Option<char>) -> bool {
    match c {
        '。' | '！' | '？' | '!' | '?' => true,
        // 3.14 is not a sentence end
        '.' => !next.is_some_and(|n| n.is_ascii_digit()),
        _ => false,
    }
}

/// Whether `pos` sits inside a `$…$` or `$$…$$` span of `chars`.
fn inside_formula(chars: &[char], pos: usize) -> bool {
    let (mut display, mut inline) = (false, false);
    let mut i = 0;
    while i < pos {
        if chars[i] == '$' {
            if chars.get(i + 1) == Some(&'$') && !inline {
                display = !display;
                i += 2;
                continue;
            }
            if !display {
                inline = !inline;
            }
        }
        i += 1;
    }
    display || inline
}

/// Whether a cut at `pos` falls between two natural units: at either end,
/// after a line break or sentence end, or beside a formula delimiter.
fn at_boundary(chars: &[char], pos: usize) -> bool {
    if pos == 0 || pos >= chars.len() {
        return true;
    }
    let prev = chars[pos - 1];
    if prev == '\n' {
        return true;
    }
    if inside_formula(chars, pos) {
        return false;
    }
    is_sentence_end(prev, chars.get(pos).copied()) || prev == '$' || chars[pos] == '$'
}

/// Move `cut` forward to the nearest natural boundary within `window`
/// characters: just after a line break or sentence end, just after the
/// delimiter closing a formula the cut fell into, or just before a delimiter
/// opening the next formula. A cut already on a boundary stays put; when no
/// boundary is in reach the cut is returned unchanged.
pub fn snap_to_boundary(chars: &[char], cut: usize, window: usize) -> usize {
    if cut == 0 || cut >= chars.len() {
        return cut;
    }
    let prev = chars[cut - 1];
    if prev == '\n' || (is_sentence_end(prev, chars.get(cut).copied()) && !inside_formula(chars, cut))
    {
        return cut;
    }

    let end = (cut + window).min(chars.len());
    let mut k = cut;
    while k < end {
        let c = chars[k];
        if c == '\n' {
            return k + 1;
        }
        if c == '$' {
            let width = if chars.get(k + 1) == Some(&'$') { 2 } else { 1 };
            return if inside_formula(chars, k) { k + width } else { k };
        }
        if is_sentence_end(c, chars.get(k + 1).copied()) && !inside_formula(chars, k) {
            return k + 1;
        }
        k += 1;
    }
    cut
}

// ── Accumulator ──────────────────────────────────────────────────────────────

/// Running merge state over slices arriving in order.
#[derive(Debug, Clone, Default)]
pub struct SliceMerger {
    merged: String,
    config: MergeConfig,
}

impl SliceMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self {
            merged: String::new(),
            config,
        }
    }

    /// Merge the next slice transcript and report what was kept.
    pub fn push(&mut self, incoming: &str) -> MergeDecision {
        let (addition, on_boundary) = reconcile_seam(&self.merged, incoming, &self.config);
        let addition = addition.trim();

        if addition.is_empty() {
            return if incoming.trim().is_empty() {
                MergeDecision::Appended
            } else {
                MergeDecision::Discarded
            };
        }

        let full = incoming.trim();
        let decision = if addition == full {
            MergeDecision::Appended
        } else {
            MergeDecision::Trimmed {
                removed_chars: full.chars().count() - addition.chars().count(),
            }
        };

        if !self.merged.is_empty() {
            let kept = self.merged.trim_end().len();
            self.merged.truncate(kept);
            // a seam that could not be snapped continues the same sentence
            self.merged.push_str(if on_boundary { "\n\n" } else { " " });
        }
        self.merged.push_str(addition);
        decision
    }

    pub fn as_str(&self) -> &str {
        &self.merged
    }

    /// The merged transcript.
    pub fn finish(self) -> String {
        self.merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MergeConfig {
        MergeConfig::default()
    }

    #[test]
    fn test_empty_existing_returns_incoming() {
        assert_eq!(reconcile("", "hello"), "hello");
        assert_eq!(reconcile("  \n", "hello"), "hello");
    }

    #[test]
    fn test_exact_duplicate_is_discarded() {
        assert_eq!(reconcile("...tail text.", "...tail text."), "");
    }

    #[test]
    fn test_space_insensitive_duplicate() {
        let existing = "because $f'(x)=1$ so...";
        let result = reconcile(existing, "$f'(x) = 1$ so...");
        let joined = format!("{existing}{result}");
        assert_eq!(joined.matches("so...").count(), 1);
    }

    #[test]
    fn test_disjoint_text_is_kept() {
        assert_eq!(reconcile("The cat sat.", "The dog ran."), "The dog ran.");
    }

    #[test]
    fn test_short_coincidental_seam_is_ignored() {
        // shared "$x$." suffix/prefix is far below the minimum
        let existing = "First we compute $x$.";
        let incoming = "$x$. Then the second part of the problem follows here.";
        assert_eq!(reconcile(existing, incoming), incoming);
    }

    #[test]
    fn test_seam_is_trimmed_at_line_break() {
        let existing =
            "Problem 1. Solve the system below.\nGiven that the function f is even and positive,\n";
        let incoming =
            "Given that the function f is even and\npositive,\nfind its minimum value on the interval.";
        assert_eq!(
            reconcile(existing, incoming),
            "find its minimum value on the interval."
        );
    }

    #[test]
    fn test_seam_ending_in_sentence() {
        let existing = "Intro. The quadratic x squared minus one has two real roots.";
        let incoming = "The quadratic x squared minus one has two real roots. They are plus and minus one.";
        let result = reconcile(existing, incoming);
        assert_eq!(result, "They are plus and minus one.");
    }

    #[test]
    fn test_snap_after_newline() {
        let chars: Vec<char> = "abc def\nghi".chars().collect();
        assert_eq!(snap_to_boundary(&chars, 2, 40), 8);
    }

    #[test]
    fn test_snap_after_sentence_end() {
        let chars: Vec<char> = "so it holds. Next one".chars().collect();
        assert_eq!(snap_to_boundary(&chars, 4, 40), 12);
        let cjk: Vec<char> = "所以成立。下一题".chars().collect();
        assert_eq!(snap_to_boundary(&cjk, 1, 40), 5);
    }

    #[test]
    fn test_snap_skips_decimal_point() {
        let chars: Vec<char> = "x is 3.14 now. y".chars().collect();
        assert_eq!(snap_to_boundary(&chars, 2, 40), 14);
    }

    #[test]
    fn test_snap_closes_formula_it_fell_into() {
        let chars: Vec<char> = "$a+b=c$ and more".chars().collect();
        assert_eq!(snap_to_boundary(&chars, 3, 40), 7);
        let display: Vec<char> = "$$a+b$$ rest".chars().collect();
        assert_eq!(snap_to_boundary(&display, 3, 40), 7);
    }

    #[test]
    fn test_snap_stops_before_opening_formula() {
        let chars: Vec<char> = "and then $x^2$".chars().collect();
        assert_eq!(snap_to_boundary(&chars, 2, 40), 9);
    }

    #[test]
    fn test_snap_ignores_period_inside_formula() {
        let chars: Vec<char> = "$x = 1.5 . y$ end".chars().collect();
        assert_eq!(snap_to_boundary(&chars, 2, 40), 13);
    }

    #[test]
    fn test_snap_keeps_cut_on_boundary() {
        let chars: Vec<char> = "Done. More text".chars().collect();
        assert_eq!(snap_to_boundary(&chars, 5, 40), 5);
    }

    #[test]
    fn test_snap_without_boundary_keeps_cut() {
        let chars: Vec<char> = "abcdefghijklmnop".chars().collect();
        assert_eq!(snap_to_boundary(&chars, 4, 5), 4);
    }

    #[test]
    fn test_merger_decisions() {
        let mut m = SliceMerger::new(cfg());
        let first = "Problem 1. Find all real x such that x squared equals four.\n";
        assert_eq!(m.push(first), MergeDecision::Appended);

        let repeat = "Find all real x such that x squared equals four.";
        assert_eq!(m.push(repeat), MergeDecision::Discarded);

        let seam = "real x such that x squared equals four. Answer: plus or minus two.";
        match m.push(seam) {
            MergeDecision::Trimmed { removed_chars } => assert!(removed_chars > 0),
            other => panic!("expected trim, got {other:?}"),
        }

        assert_eq!(m.push("Problem 2. Unrelated."), MergeDecision::Appended);
        let merged = m.finish();
        assert_eq!(merged.matches("equals four").count(), 1);
        assert!(merged.ends_with("Answer: plus or minus two.\n\nProblem 2. Unrelated."));
    }

    #[test]
    fn test_unsnapped_seam_joins_same_paragraph() {
        let mut m = SliceMerger::new(cfg());
        m.push("the quick brown fox jumps over the lazy dog and keeps running far away");
        let decision =
            m.push("over the lazy dog and keeps running far away into the green forest");
        assert!(matches!(decision, MergeDecision::Trimmed { .. }));
        assert_eq!(
            m.finish(),
            "the quick brown fox jumps over the lazy dog and keeps running far away \
             into the green forest"
        );
    }

    #[test]
    fn test_at_boundary() {
        let chars: Vec<char> = "One. Two $x$ three\nfour".chars().collect();
        assert!(at_boundary(&chars, 0));
        assert!(at_boundary(&chars, 4)); // after "One."
        assert!(at_boundary(&chars, 9)); // before "$x$"
        assert!(at_boundary(&chars, 12)); // after "$x$"
        assert!(at_boundary(&chars, 19)); // after the line break
        assert!(!at_boundary(&chars, 6)); // inside "Two"
        assert!(!at_boundary(&chars, 10)); // inside the formula
    }
}
