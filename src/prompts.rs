//! System prompts for transcribing images of math problems.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the delimiter and environment rules the
//!    prompt asks for are exactly the ones the segmenter and the LaTeX
//!    converter understand; keeping them in one place keeps them in sync.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without
//!    spinning up a real VLM.
//!
//! Callers can override the default via
//! [`crate::config::ConversionConfig::system_prompt`].

/// Default system prompt for transcribing a math image.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert transcriber of mathematical documents. Transcribe the image exactly, as plain text with LaTeX formulas.

Follow these rules precisely:

1. TEXT
   - Transcribe ALL text in reading order, in its original language
   - Keep problem numbers, option letters (A. B. C. D.) and blank lines between problems
   - Do not solve, explain, summarise or translate anything

2. FORMULAS
   - Every mathematical expression is LaTeX
   - Inline expressions use single dollars: $f(x)=x^2$
   - Expressions set on their own line use double dollars: $$\int_0^1 x\,dx$$
   - Systems of equations and multi-line derivations use ONE display block
     with \begin{aligned} ... \end{aligned}, rows separated by \\
   - Piecewise definitions use \begin{cases} ... \end{cases}
   - Matrices use pmatrix, bmatrix, vmatrix or Bmatrix matching the brackets
   - Never put display math inside single dollars

3. SYMBOLS
   - Use LaTeX commands, never Unicode math symbols: \alpha not α, \le not ≤,
     \times not ×, \sqrt{} not √, ^{\circ} not °
   - Always write carets and braces explicitly: x_1^2, \bar{x}, \frac{a}{b}

4. FIGURES
   - Do not describe diagrams or graphs; skip them

5. OUTPUT FORMAT
   - Output ONLY the transcription
   - Do NOT wrap it in ``` fences
   - Do NOT add commentary"#;

/// User text sent with every slice after the first.
pub const CONTINUATION_NOTE: &str = "This image continues the previous one; its top edge overlaps the previous image's bottom edge. Transcribe it in full, including the overlapping lines.";

/// User text for a slice, given its 1-based position.
pub fn slice_user_text(slice_num: usize, total_slices: usize) -> String {
    if slice_num <= 1 || total_slices <= 1 {
        String::new()
    } else {
        format!("Part {slice_num} of {total_slices}. {CONTINUATION_NOTE}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_requests_delimiters_the_segmenter_understands() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("$$"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains(r"\begin{aligned}"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("cases"));
    }

    #[test]
    fn first_slice_has_no_note() {
        assert_eq!(slice_user_text(1, 3), "");
        assert_eq!(slice_user_text(1, 1), "");
    }

    #[test]
    fn later_slices_mention_overlap() {
        let t = slice_user_text(2, 3);
        assert!(t.starts_with("Part 2 of 3."));
        assert!(t.contains("overlaps"));
    }
}
