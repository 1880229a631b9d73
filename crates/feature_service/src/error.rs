/// Failure taxonomy for feature queries.
///
/// Only `Transport` is worth retrying with the same filter. `Decode` needs a
/// server-side fix and `InvalidQuery` is a caller error.
#[derive(Debug)]
pub enum FetchError {
    InvalidQuery(String),
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    Decode {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl FetchError {
    pub fn invalid_query(message: impl Into<String>) -> Self {
        FetchError::InvalidQuery(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        FetchError::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FetchError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn decode_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FetchError::Decode {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::InvalidQuery(msg) => write!(f, "invalid query: {msg}"),
            FetchError::Transport { message, .. } => write!(f, "transport error: {message}"),
            FetchError::Decode { message, .. } => write!(f, "decode error: {message}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::InvalidQuery(_) => None,
            FetchError::Transport { source, .. } | FetchError::Decode { source, .. } => {
                source.as_ref().map(|e| e.as_ref() as _)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FetchError;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(FetchError::transport("timeout").is_retryable());
        assert!(!FetchError::invalid_query("no filter").is_retryable());
        let bad_json = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(!FetchError::decode_with("body", bad_json).is_retryable());
    }

    #[test]
    fn display_names_the_category() {
        assert_eq!(
            FetchError::invalid_query("no bbox").to_string(),
            "invalid query: no bbox"
        );
        assert_eq!(
            FetchError::transport("HTTP 502").to_string(),
            "transport error: HTTP 502"
        );
    }
}
