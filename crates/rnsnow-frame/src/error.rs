/// Errors that can occur while fragmenting or parsing fragments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The payload would need more fragments than the configured ceiling.
    #[error("payload of {size} bytes needs {needed} fragments (max {max})")]
    TooManyFragments {
        size: usize,
        needed: usize,
        max: usize,
    },

    /// The radio MTU cannot hold the fragment header, margin and one payload byte.
    #[error("radio MTU {mtu} too small (minimum {min})")]
    MtuTooSmall { mtu: usize, min: usize },

    /// The fragment ceiling is outside `1..=256`.
    #[error("fragment ceiling {0} out of range (1..=256)")]
    InvalidFragmentLimit(usize),

    /// A received fragment is shorter than its header.
    #[error("fragment truncated ({len} bytes, header is {header})")]
    Truncated { len: usize, header: usize },

    /// A received fragment uses control bits outside the reserved range.
    #[error("invalid fragment control byte 0x{0:02x}")]
    InvalidControl(u8),

    /// First-fragment flag and sequence number disagree.
    #[error("fragment flags inconsistent with sequence {0}")]
    InconsistentSequence(u8),
}

pub type Result<T> = std::result::Result<T, FrameError>;
