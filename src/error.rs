//! Errors reported for misused node handles.

/// Why [`RbTree::erase`](crate::RbTree::erase) refused a handle.
///
/// A rejected erase leaves the tree untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EraseError {
    /// The handle was issued by a different tree, or by this tree before it was cleared.
    ForeignHandle,
    /// The node behind the handle has already been erased.
    StaleHandle,
}

impl std::fmt::Display for EraseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EraseError::ForeignHandle => write!(f, "node handle belongs to another tree"),
            EraseError::StaleHandle => write!(f, "node handle refers to an erased node"),
        }
    }
}

impl std::error::Error for EraseError {}

/// Result type for handle-checked tree operations.
pub type Result<T> = std::result::Result<T, EraseError>;
