//! Prompt loading utilities
//!
//! Prompts live in the workspace `prompts/` directory as markdown documents with
//! Usage and Prompt sections, and are embedded at compile time using `include_str!`.

// Embed prompt files at compile time
const EVALUATOR_MD: &str = include_str!("../../../../prompts/evaluator.md");
const REVISION_MD: &str = include_str!("../../../../prompts/revision.md");

/// Loads a prompt by name
///
/// # Errors
/// Returns an error if the prompt name is unknown or the prompt section cannot be extracted
pub fn load_prompt(name: &str) -> Result<String, String> {
    let content = match name {
        "evaluator" => EVALUATOR_MD,
        "revision" => REVISION_MD,
        _ => return Err(format!("Unknown prompt: {name}")),
    };

    extract_prompt_section(content)
}

/// Extracts the Prompt section from a markdown file
///
/// # Errors
/// Returns an error if the Prompt section cannot be found
fn extract_prompt_section(content: &str) -> Result<String, String> {
    let prompt_start = content
        .find("## Prompt")
        .ok_or_else(|| "Prompt section not found".to_owned())?;

    let prompt_content_start = content[prompt_start..]
        .find('\n')
        .ok_or_else(|| "Invalid prompt format".to_owned())?
        + prompt_start
        + 1;

    // ## Prompt is always the last top-level section
    Ok(content[prompt_content_start..].trim().to_owned())
}

/// Substitutes `{key}` placeholders in a single pass.
///
/// Braces that do not enclose a known key are copied verbatim, and substituted
/// values are never rescanned, so user text containing braces is safe.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let replacement = after_open.find('}').and_then(|close| {
            let key = &after_open[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });

        if let Some((value, close)) = replacement {
            output.push_str(value);
            rest = &after_open[close + 1..];
        } else {
            output.push('{');
            rest = after_open;
        }
    }

    output.push_str(rest);
    output
}

/// Splits a prompt into its leading paragraph and the remainder.
///
/// Used for templates whose first paragraph is the system message.
pub fn split_first_paragraph(prompt: &str) -> (&str, &str) {
    prompt
        .split_once("\n\n")
        .map_or((prompt.trim(), ""), |(head, tail)| (head.trim(), tail.trim()))
}
