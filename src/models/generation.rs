use serde::{ Deserialize, Serialize };

/// Outcome of a pre-flight check. Never touches the network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { valid: true, error: None }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self { valid: false, error: Some(error.into()) }
    }
}

/// Uniform result of a generation call. `complete` is only set by the
/// streaming form: `Some(false)` for an incremental chunk, `Some(true)` for
/// the final accumulated text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
}

impl GenerationResult {
    pub fn completed(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            error: None,
            complete: None,
        }
    }

    pub fn chunk(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            error: None,
            complete: Some(false),
        }
    }

    pub fn finished(full_text: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(full_text.into()),
            error: None,
            complete: Some(true),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
            complete: None,
        }
    }

    pub fn is_final(&self) -> bool {
        !self.success || self.complete != Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_chunks_keep_a_stream_going() {
        assert!(!GenerationResult::chunk("Hel").is_final());
        assert!(GenerationResult::finished("Hello").is_final());
        assert!(GenerationResult::completed("Hello").is_final());
        assert!(GenerationResult::failure("boom").is_final());
    }
}
