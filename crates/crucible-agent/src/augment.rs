//! Inlines web content into prompts carrying a `[FETCH_URL: <url>]` directive.
//!
//! The directive is located with a single left-to-right scan. The first
//! well-formed directive wins; anything after it, including further markers,
//! is kept verbatim in the instruction.

use std::sync::Arc;

use tracing::{info, warn};

use crucible_core::ContentFetcher;

/// Start marker of a directive, compared ASCII case-insensitively.
const DIRECTIVE_MARKER: &str = "[fetch_url:";
/// Accepted URL schemes, compared ASCII case-insensitively.
const URL_SCHEMES: [&str; 2] = ["http://", "https://"];
/// Instruction used when the prompt holds nothing but the directive.
pub const DEFAULT_INSTRUCTION: &str = "Summarize or describe the content found at the URL.";
/// Closing line appended to every augmented prompt.
pub const CLOSING_INSTRUCTION: &str = "Based on the original instruction and the context from the URL (if available and relevant), please provide your response.";
/// Marker appended to cut-off content.
pub const TRUNCATION_MARKER: &str = "... (content truncated)";

/// A directive found in a prompt, borrowing from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchDirective<'prompt> {
    /// Text before the directive.
    pub prefix: &'prompt str,
    /// URL to fetch.
    pub url: &'prompt str,
    /// Text after the directive.
    pub suffix: &'prompt str,
}

impl FetchDirective<'_> {
    /// The prompt with the directive removed, or the default instruction.
    pub fn instruction(&self) -> String {
        let joined = format!("{} {}", self.prefix.trim(), self.suffix.trim());
        let joined = joined.trim();
        if joined.is_empty() {
            DEFAULT_INSTRUCTION.to_owned()
        } else {
            joined.to_owned()
        }
    }
}

/// Finds the first well-formed directive in `prompt`.
pub fn parse_directive(prompt: &str) -> Option<FetchDirective<'_>> {
    // ASCII lowercasing keeps byte offsets identical
    let lowered = prompt.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(found) = lowered[search_from..].find(DIRECTIVE_MARKER) {
        let start = search_from + found;
        if let Some((url_start, url_end, close)) =
            match_directive_body(prompt, start + DIRECTIVE_MARKER.len())
        {
            return Some(FetchDirective {
                prefix: &prompt[..start],
                url: &prompt[url_start..url_end],
                suffix: &prompt[close + 1..],
            });
        }
        search_from = start + 1;
    }

    None
}

/// Matches `ws* URL ws* ]` at byte offset `from`.
///
/// Returns the URL's byte range and the offset of the closing bracket.
fn match_directive_body(prompt: &str, from: usize) -> Option<(usize, usize, usize)> {
    let rest = &prompt[from..];
    let url_start = from + (rest.len() - rest.trim_start().len());
    let candidate = &prompt[url_start..];

    let scheme_len = URL_SCHEMES
        .iter()
        .find(|scheme| starts_with_ignore_ascii_case(candidate, scheme))?
        .len();

    let url_len = candidate
        .find(|ch: char| ch.is_whitespace() || ch == ']')
        .unwrap_or(candidate.len());
    if url_len <= scheme_len {
        return None;
    }
    let url_end = url_start + url_len;

    let tail = &prompt[url_end..];
    let close = url_end + (tail.len() - tail.trim_start().len());
    prompt[close..].starts_with(']').then_some((url_start, url_end, close))
}

/// ASCII case-insensitive prefix test.
fn starts_with_ignore_ascii_case(text: &str, prefix: &str) -> bool {
    text.as_bytes()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
}

/// Keeps at most `max_chars` characters, marking the cut.
fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &content[..cut]),
        None => content.to_owned(),
    }
}

/// Rewrites prompts containing a fetch directive.
pub struct PromptAugmenter {
    fetcher: Arc<dyn ContentFetcher>,
    max_context_chars: usize,
}

impl PromptAugmenter {
    /// Creates an augmenter that inlines at most `max_context_chars` characters.
    pub fn new(fetcher: Arc<dyn ContentFetcher>, max_context_chars: usize) -> Self {
        Self {
            fetcher,
            max_context_chars,
        }
    }

    /// Returns the prompt to send to the worker model.
    ///
    /// Without a directive the prompt is returned unchanged. Fetch problems
    /// never fail the call; they are reported inside the prompt instead.
    pub async fn augment(&self, raw_prompt: &str) -> String {
        let Some(directive) = parse_directive(raw_prompt) else {
            return raw_prompt.to_owned();
        };

        let instruction = directive.instruction();
        info!(url = directive.url, "Fetching context for prompt");

        let context = match self.fetcher.fetch(directive.url).await {
            Ok(content) if !content.trim().is_empty() => format!(
                "--- Context from URL: {} ---\n{}\n--- End of Context ---",
                directive.url,
                truncate_content(&content, self.max_context_chars)
            ),
            Ok(_) => {
                warn!(url = directive.url, "Fetched URL returned no content");
                failure_note(directive.url)
            }
            Err(err) => {
                warn!(
                    url = directive.url,
                    category = %err.category(),
                    "Failed to fetch URL content: {err}"
                );
                failure_note(directive.url)
            }
        };

        format!("{instruction}\n\n{context}\n\n{CLOSING_INSTRUCTION}")
    }
}

/// Note inlined when the URL could not be fetched.
fn failure_note(url: &str) -> String {
    format!(
        "--- Note: Attempted to fetch content from URL {url} but failed. Please inform the user if relevant. ---"
    )
}
