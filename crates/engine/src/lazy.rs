//! Compute-once values
//!
//! Reading an actual file or resolving a symlink is deferred until a
//! comparison needs the bytes, and then done at most once.

use crate::error::{Error, Result};
use std::cell::OnceCell;
use std::fmt;

/// A value computed by a fallible function on first access and cached
///
/// A failed computation is not cached; the next access tries again.
pub struct Lazy<'a, T> {
    cell: OnceCell<T>,
    init: Option<Box<dyn Fn() -> Result<T> + 'a>>,
}

impl<'a, T> Lazy<'a, T> {
    /// Defer `init` until the value is first needed
    pub fn new(init: impl Fn() -> Result<T> + 'a) -> Self {
        Self {
            cell: OnceCell::new(),
            init: Some(Box::new(init)),
        }
    }

    /// An already computed value
    pub fn ready(value: T) -> Self {
        Self {
            cell: OnceCell::from(value),
            init: None,
        }
    }

    /// Get the value, computing it if needed
    pub fn get(&self) -> Result<&T> {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let init = self
            .init
            .as_ref()
            .ok_or_else(|| Error::State("lazy value has no initializer".to_string()))?;
        let value = init()?;
        Ok(self.cell.get_or_init(|| value))
    }

    /// Whether the value has been computed
    pub fn is_computed(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(value) => f.debug_tuple("Lazy").field(value).finish(),
            None => f.write_str("Lazy(<pending>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_computed_once() {
        let calls = Cell::new(0);
        let lazy = Lazy::new(|| {
            calls.set(calls.get() + 1);
            Ok(42)
        });
        assert!(!lazy.is_computed());
        assert_eq!(*lazy.get().unwrap(), 42);
        assert_eq!(*lazy.get().unwrap(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let calls = Cell::new(0);
        let lazy = Lazy::new(|| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(Error::Closed)
            } else {
                Ok("ok")
            }
        });
        assert!(lazy.get().is_err());
        assert_eq!(*lazy.get().unwrap(), "ok");
    }

    #[test]
    fn test_ready() {
        let lazy = Lazy::ready(vec![1u8]);
        assert!(lazy.is_computed());
        assert_eq!(lazy.get().unwrap(), &vec![1u8]);
    }
}
