pub type VoxreelResult<T> = Result<T, VoxreelError>;

/// Failure classes of the render pipeline. Fatal classes end the owning job
/// as `failed`; `BackgroundMix` is logged and degrades to a music-free mix.
#[derive(thiserror::Error, Debug)]
pub enum VoxreelError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("composition error: {0}")]
    Composition(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("background mix error: {0}")]
    BackgroundMix(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VoxreelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    pub fn composition(msg: impl Into<String>) -> Self {
        Self::Composition(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn background_mix(msg: impl Into<String>) -> Self {
        Self::BackgroundMix(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            VoxreelError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            VoxreelError::input("x")
                .to_string()
                .contains("input error:")
        );
        assert!(
            VoxreelError::synthesis("x")
                .to_string()
                .contains("synthesis error:")
        );
        assert!(
            VoxreelError::composition("x")
                .to_string()
                .contains("composition error:")
        );
        assert!(
            VoxreelError::encode("x")
                .to_string()
                .contains("encode error:")
        );
        assert!(
            VoxreelError::background_mix("x")
                .to_string()
                .contains("background mix error:")
        );
        assert!(
            VoxreelError::storage("x")
                .to_string()
                .contains("storage error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = VoxreelError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
