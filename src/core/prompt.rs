use crate::core::codec::MARKER_PREFIX;
use crate::infra::config::COMPLETION_END_OF_SEQUENCE;
use log::debug;

/// Rough size estimate used for logging only.
pub fn count_tokens(content: &str) -> usize {
    content.split_whitespace().count()
}

/// Completion prompt: the current files, the request, and an open slot for
/// the model to continue with updated files.
pub fn build_generate_prompt(filemap_text: &str, user_request: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str("## The following files are part of a repository.\n");
    prompt.push_str(&format!(
        "## Each file starts with a line beginning with \"{}\".\n\n",
        MARKER_PREFIX
    ));
    prompt.push_str(filemap_text);

    prompt.push_str("\n## Requested changes:\n");
    if user_request.trim().is_empty() {
        prompt.push_str("Improve these files.\n");
    } else {
        prompt.push_str(user_request.trim());
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "\n## Reply with every changed or new file in the same format, each starting with its marker line, then write {}.\n\n",
        COMPLETION_END_OF_SEQUENCE
    ));

    debug!("Built generate prompt with {} tokens", count_tokens(&prompt));
    prompt
}

/// Instruction for the edit endpoint, whose input is the encoded filemap.
pub fn build_edit_instruction(user_request: &str) -> String {
    let request = user_request.trim();
    let request = if request.is_empty() {
        "Improve these files."
    } else {
        request
    };
    format!(
        "{}\nKeep every line starting with \"{}\" unchanged and keep each file below its marker line.",
        request, MARKER_PREFIX
    )
}
