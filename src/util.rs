use std::fmt;

/// A guard which emits an error message when dropped while armed.
///
/// Embedded in types whose handles must be released through an explicit
/// `destroy` call, since the release needs the device.
#[derive(Default)]
pub struct ErrorOnDrop<T>
where
    T: fmt::Display + Default,
{
    error: T,
    armed: bool,
}

impl<T> Drop for ErrorOnDrop<T>
where
    T: fmt::Display + Default,
{
    fn drop(&mut self) {
        if self.armed {
            log::error!("Error on drop: {}", self.error);
        }
    }
}

impl<T> ErrorOnDrop<T>
where
    T: fmt::Display + Default,
{
    pub fn new(error: T) -> ErrorOnDrop<T> {
        ErrorOnDrop { error, armed: true }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

/// Declares a zero-sized message type for an [`ErrorOnDrop`] guard.
macro_rules! drop_message {
    ($name:ident, $msg:literal) => {
        #[derive(Default)]
        pub struct $name;

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($msg)
            }
        }
    };
}

pub(crate) use drop_message;

#[cfg(test)]
mod tests {
    use super::*;

    drop_message!(Leaked, "leaked");

    #[test]
    fn disarm() {
        let mut bomb = ErrorOnDrop::new(Leaked);
        assert!(bomb.is_armed());
        bomb.disarm();
        assert!(!bomb.is_armed());
        assert_eq!(Leaked.to_string(), "leaked");
    }

    #[test]
    fn default_is_disarmed() {
        let bomb = ErrorOnDrop::<Leaked>::default();
        assert!(!bomb.is_armed());
    }
}
