use crate::Critique;

/// Prompt templates for the critic and for refined generation prompts
pub struct CriticPrompts;

impl CriticPrompts {
    /// Question sent to the image-captioning model alongside the image
    pub fn build_review_prompt(original_prompt: &str) -> String {
        format!(
            r#"What is happening in the image? From scale 1 to 10, decide how similar the image is to the text prompt "{prompt}".

Evaluate the image across the following dimensions, scoring each from 1 (bad) to 10 (good):
- Content similarity (content): Does the image present the content in the prompt? If any keyword is missing, the score must be less than 5.
- Clarity (clarity): Does the image clearly communicate the prompt? Is it easy to understand for human viewers?
- Balance and proportion (proportion): Are the elements arranged in a visually pleasing and harmonious way?
- Color and typography (color): Are the colors and fonts used effectively to enhance the message?

You MUST provide a score for each dimension in exactly this format:
{{content: 0, clarity: 0, proportion: 0, color: 0}}

Finally, suggest a list of concrete actions to improve the image, one per line, each starting with "- "."#,
            prompt = original_prompt,
        )
    }

    /// Generation prompt for the next iteration, folding in the critic's suggestions
    pub fn build_refinement_prompt(original_prompt: &str, critique: &Critique) -> String {
        if critique.suggestions.is_empty() {
            return original_prompt.to_string();
        }

        let improvements = critique
            .suggestions
            .iter()
            .map(|s| truncate_output(s, 300))
            .collect::<Vec<_>>()
            .join("; ");

        format!("{}. {}", original_prompt.trim_end_matches('.'), improvements)
    }
}

fn truncate_output(output: &str, max_len: usize) -> &str {
    if output.len() <= max_len {
        return output;
    }
    let mut end = max_len;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    // Prefer cutting at a word boundary
    match output[..end].rfind(' ') {
        Some(pos) => &output[..pos],
        None => &output[..end],
    }
}
