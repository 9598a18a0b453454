use std::fmt::Formatter;

use thiserror::Error;

/// An error that is localised to a particular byte-offset location in the
/// bytecode.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Located<E>
where
    E: Clone,
{
    /// The byte offset in the bytecode where the error occurred.
    pub location: u64,

    /// The error data.
    pub payload: E,
}

/// Displays the error together with the program counter at which it occurred.
impl<E> std::fmt::Display for Located<E>
where
    E: std::fmt::Display + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[pc {:#x}]: {}", self.location, self.payload)
    }
}

/// A trait for types that can have a byte-offset location attached to them.
pub trait Locatable
where
    Self: Sized,
{
    /// The return type with the attached byte-offset location.
    type Located;

    /// Attach the location described by `pc` (a byte offset in the bytecode)
    /// to the error.
    fn locate(self, pc: u64) -> Self::Located;
}

/// A blanket implementation that allows for attaching a location to any
/// result.
impl<T, E> Locatable for Result<T, E>
where
    E: std::error::Error + Clone,
{
    type Located = Result<T, Located<E>>;

    fn locate(self, pc: u64) -> Self::Located {
        self.map_err(|e| Located {
            location: pc,
            payload:  e,
        })
    }
}
