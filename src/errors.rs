use std::error::Error;
use std::fmt;

/// Stores the different kinds of errors surfaced by this library.
#[derive(Debug, Clone, PartialEq)]
pub enum KinError {
    /// Operands have incompatible shapes, e.g. adding a 3x3 to a 2x2
    ShapeMismatch(usize, usize, usize, usize),
    /// The matrix is singular and cannot be inverted or factored
    Singular,
    /// The measurement vector handed to a filter update is empty
    EmptyMeasurement,
    /// The filter was used before a successful call to `initialize`, or has no
    /// applied filter to initialize from
    Uninitialized,
    /// The requested frame state tag does not exist
    UnknownState(String),
    /// The motion state no longer references a live frame
    DetachedFrame,
    /// The two frames share no common ancestor, by handle or by name
    TreeMismatch(String, String),
    /// A configuration value was out of range (the value has been clamped)
    InvalidConfig(String),
    /// The requested operation is not supported, e.g. merging rotating frames
    Unsupported(String),
    /// The named object could not be found
    ObjectNotFound(String),
    /// Raised when failing to load or parse a configuration
    LoadingError(String),
}

impl fmt::Display for KinError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ShapeMismatch(r1, c1, r2, c2) => write!(
                f,
                "shape mismatch: left is {}x{} but right is {}x{}",
                r1, c1, r2, c2
            ),
            Self::Singular => write!(f, "matrix is singular"),
            Self::EmptyMeasurement => write!(f, "measurement vector is empty"),
            Self::Uninitialized => write!(
                f,
                "filter has not been initialized, or no applied filter was selected"
            ),
            Self::UnknownState(tag) => write!(f, "unknown frame state tag `{}`", tag),
            Self::DetachedFrame => write!(f, "motion state is not attached to a live frame"),
            Self::TreeMismatch(a, b) => write!(
                f,
                "frames `{}` and `{}` share no common ancestor by handle or name",
                a, b
            ),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Self::Unsupported(msg) => write!(f, "unsupported operation: {}", msg),
            Self::ObjectNotFound(name) => write!(f, "could not find `{}`", name),
            Self::LoadingError(msg) => write!(f, "loading error: {}", msg),
        }
    }
}

impl Error for KinError {}
