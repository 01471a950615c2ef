//! Cohort error module.
//!
//! There are specific types for errors (e.g. `GroupAcquireError`) and
//! additionally one `Error` type that can represent them all. Each error in
//! this module has an `Into<Error>` implementation.
//!
//! Only *domain* errors live here: conditions a caller can meaningfully
//! react to. Invariant violations (type-mismatched downcasts, conflicting
//! component borrows) are bugs and panic instead.

use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use crate::world::ComponentTag;

/// A boxed error implementing `Debug`, `Display` and `Error`.
pub struct BoxedErr(pub Box<dyn StdError + Send + Sync + 'static>);

impl BoxedErr {
    /// Creates a new boxed error.
    pub fn new<T>(err: T) -> Self
    where
        T: StdError + Send + Sync + 'static,
    {
        BoxedErr(Box::new(err))
    }
}

impl AsRef<dyn StdError> for BoxedErr {
    fn as_ref(&self) -> &(dyn StdError + 'static) {
        self.0.as_ref()
    }
}

impl Debug for BoxedErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl Display for BoxedErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_ref())
    }
}

impl StdError for BoxedErr {}

/// The Cohort error type, able to represent all error types of this library.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A custom, boxed error.
    Custom(BoxedErr),
    /// Acquiring a group failed.
    GroupAcquire(GroupAcquireError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Error::Custom(e) => write!(f, "Custom: {}", e),
            Error::GroupAcquire(e) => write!(f, "Group acquisition: {}", e),
        }
    }
}

impl From<GroupAcquireError> for Error {
    fn from(e: GroupAcquireError) -> Self {
        Error::GroupAcquire(e)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Custom(e) => Some(e.as_ref()),
            Error::GroupAcquire(e) => Some(e),
        }
    }
}

/// Returned when an owning group cannot reserve one of its owned components
/// because another owning group already controls that component's dense
/// ordering.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GroupAcquireError {
    /// The component tag that is already owned elsewhere.
    pub tag: ComponentTag,
}

impl Display for GroupAcquireError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "component {:?} is already owned by another group; \
             a component's dense order can only have one owner",
            self.tag
        )
    }
}

impl StdError for GroupAcquireError {}
