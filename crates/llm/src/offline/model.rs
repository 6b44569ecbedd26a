/// Failure modes of the local inference capability. None of these escape
/// the offline generator; they only push it onto the rule tier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    #[error("model not loaded")]
    NotLoaded,
    #[error("input shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("inference failed: {0}")]
    Backend(String),
}

/// Opaque "run inference" capability over fixed-shape integer tensors.
/// Shapes are fixed when the model is loaded.
pub trait InferenceModel: Send + Sync {
    /// Length of the input sequence the model was loaded with.
    fn input_len(&self) -> usize;

    fn run(&self, input: &[i64]) -> Result<Vec<i64>, InferenceError>;
}

/// Reference backend that echoes its input tensor.
#[derive(Debug, Clone)]
pub struct EchoModel {
    input_len: usize,
}

impl EchoModel {
    pub fn new(input_len: usize) -> Self {
        Self { input_len }
    }
}

impl InferenceModel for EchoModel {
    fn input_len(&self) -> usize {
        self.input_len
    }

    fn run(&self, input: &[i64]) -> Result<Vec<i64>, InferenceError> {
        if input.len() != self.input_len {
            return Err(InferenceError::ShapeMismatch { expected: self.input_len, actual: input.len() });
        }
        Ok(input.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_checks_shape() {
        let model = EchoModel::new(4);
        assert_eq!(model.run(&[2, 5, 3, 0]), Ok(vec![2, 5, 3, 0]));
        assert_eq!(
            model.run(&[2, 3]),
            Err(InferenceError::ShapeMismatch { expected: 4, actual: 2 })
        );
    }
}
