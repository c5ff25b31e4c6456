use thiserror::Error;

/// Failures that end a run, as opposed to per-packet rejections which are
/// ordinary protocol replies.
#[derive(Debug, Error)]
pub enum SieveError {
    /// The partition parameters cannot describe a valid range.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// The worker exhausted its retry budget without hearing back from
    /// the coordinator. Fatal for that worker only.
    #[error("coordinator unreachable after {attempts} attempts")]
    NetworkUnavailable { attempts: u32 },
}
