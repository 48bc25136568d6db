use crate::compile::CompiledMessage;

/// Merge runs of consecutive same-role messages into one.
pub fn aggregate(messages: Vec<CompiledMessage>, separator: &str) -> Vec<CompiledMessage> {
    let mut out: Vec<CompiledMessage> = Vec::with_capacity(messages.len());

    for message in messages {
        match out.last_mut() {
            Some(prev) if prev.role == message.role => {
                prev.content.push_str(separator);
                prev.content.push_str(&message.content);
                prev.commits.extend(message.commits);
                prev.edits.extend(message.edits);
            }
            _ => out.push(message),
        }
    }
    out
}
