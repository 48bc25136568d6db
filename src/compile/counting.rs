use crate::compile::CompiledMessage;

/// Counting service used for the compile accounting figure.
pub trait TokenCounter {
    fn count_tokens(&self, content: &str) -> usize;

    /// Total over final messages. Override to add per-message framing costs.
    fn count_messages(&self, messages: &[CompiledMessage]) -> usize {
        messages.iter().map(|m| self.count_tokens(&m.content)).sum()
    }

    /// Reported back in `CompileResult::token_source`.
    fn source(&self) -> &str;
}

/// Default counter: one token per four bytes of rendered text, rounded up.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn count_tokens(&self, content: &str) -> usize {
        content.len().div_ceil(4)
    }

    fn source(&self) -> &str {
        "approx:bytes/4"
    }
}

impl<T: TokenCounter + ?Sized> TokenCounter for Box<T> {
    fn count_tokens(&self, content: &str) -> usize {
        (**self).count_tokens(content)
    }

    fn count_messages(&self, messages: &[CompiledMessage]) -> usize {
        (**self).count_messages(messages)
    }

    fn source(&self) -> &str {
        (**self).source()
    }
}
