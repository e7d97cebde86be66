//! Small internal utilities

/// Convenience macro for checking a condition and returning an error if it is false.
macro_rules! require {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}
pub(crate) use require;
