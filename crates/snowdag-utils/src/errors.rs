//! Fatal-error accumulation.

use std::fmt;

/// Collects errors without stopping at the first one.
///
/// The transitive engine holds one of these: once it has errored, every
/// later issuance and poll becomes a no-op and the first error is surfaced
/// to the caller on the next opportunity.
#[derive(Default)]
pub struct Errors {
    errors: Vec<String>,
}

impl Errors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<E: fmt::Display>(&mut self, error: E) {
        self.errors.push(error.to_string());
    }

    /// Records the error of `result`, if any, and hands back the value.
    pub fn add_result<T, E: fmt::Display>(&mut self, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.add(e);
                None
            }
        }
    }

    #[must_use]
    pub fn errored(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn into_result(self) -> Result<(), ErrorList> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ErrorList(self.errors))
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_error_list(&self.errors, f)
    }
}

impl fmt::Debug for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Errors").field("errors", &self.errors).finish()
    }
}

/// The accumulated errors as an error value.
#[derive(Debug)]
pub struct ErrorList(Vec<String>);

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_error_list(&self.0, f)
    }
}

impl std::error::Error for ErrorList {}

fn fmt_error_list(errors: &[String], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match errors.len() {
        0 => write!(f, "no errors"),
        1 => write!(f, "{}", errors[0]),
        n => {
            write!(f, "{n} errors: ")?;
            for (i, err) in errors.iter().enumerate() {
                if i > 0 {
                    write!(f, "; ")?;
                }
                write!(f, "{err}")?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clean() {
        let errs = Errors::new();
        assert!(!errs.errored());
        assert!(errs.into_result().is_ok());
    }

    #[test]
    fn accumulates() {
        let mut errs = Errors::new();
        errs.add("first");
        errs.add("second");
        assert!(errs.errored());
        assert_eq!(errs.len(), 2);
        let s = errs.to_string();
        assert!(s.contains("first") && s.contains("second"));
    }

    #[test]
    fn add_result_passes_through_ok() {
        let mut errs = Errors::new();
        assert_eq!(errs.add_result(Ok::<_, String>(7)), Some(7));
        assert!(!errs.errored());
        assert_eq!(errs.add_result(Err::<i32, _>("boom")), None);
        assert!(errs.errored());
    }
}
