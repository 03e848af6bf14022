//! External generative model access.

mod gemini;
mod response;

pub use gemini::GeminiClient;
pub use response::strip_code_fences;

use crate::error::AiError;

/// Binary content sent alongside a prompt.
#[derive(Debug, Clone, Copy)]
pub struct Attachment<'a> {
    pub data: &'a [u8],
    pub mime_type: &'a str,
}

impl<'a> Attachment<'a> {
    pub fn pdf(data: &'a [u8]) -> Self {
        Self {
            data,
            mime_type: "application/pdf",
        }
    }
}

/// A text-generating model. Calls block until the response arrives.
pub trait GenerativeModel {
    fn generate(&self, prompt: &str, attachment: Option<Attachment<'_>>) -> Result<String, AiError>;
}

impl<T: GenerativeModel + ?Sized> GenerativeModel for Box<T> {
    fn generate(&self, prompt: &str, attachment: Option<Attachment<'_>>) -> Result<String, AiError> {
        (**self).generate(prompt, attachment)
    }
}
