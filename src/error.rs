/// Errors raised by the analysis engine.
///
/// Shape errors mean the caller broke a contract and are returned rather than
/// papered over. Numeric degeneracies (silent windows, log of zero) never
/// show up here; they are floored where they occur.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transform length is zero or not a power of two.
    #[error("transform length must be a non-zero power of two, got {0}")]
    NotPowerOfTwo(usize),

    /// Invalid parameter value.
    #[error("invalid parameter `{name}`: got {value}, {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    /// The estimator needs at least one spectrum.
    #[error("spectral corpus is empty")]
    EmptyCorpus,

    /// Spectra in one corpus must share a length.
    #[error("spectrum {index} has {got} bins, expected {expected}")]
    RaggedCorpus {
        index: usize,
        expected: usize,
        got: usize,
    },

    /// Requested channel does not exist in the buffer.
    #[error("channel {channel} out of range, buffer has {available}")]
    ChannelOutOfRange { channel: usize, available: usize },

    /// The job's cancel token fired before it finished.
    #[error("analysis cancelled")]
    Cancelled,

    /// `poll` called again after the job returned its output.
    #[error("job polled after completion")]
    JobFinished,
}

pub type Result<T> = std::result::Result<T, Error>;
