// Error taxonomy for circuit construction. Every variant is fatal at the
// call site: no instruction is appended once an error is detected, and a
// partially built circuit is never handed to the caller.

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The experiment description asked for something unsupported:
    /// mismatched surgery distances, a missing or non-adjacent patch
    /// coordinate, an unsupported basis/state combination.
    Configuration(String),
    /// A reference fell outside the allocated grids. This points at a
    /// defect in the allocator, not at user input.
    Geometry(String),
    /// Region bookkeeping reached a state that must never occur, e.g. a
    /// region with no stabilizers or a qubit lacking the measurement
    /// history a detector needs.
    InvariantViolation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Error::Geometry(msg) => write!(f, "geometry error: {}", msg),
            Error::InvariantViolation(msg) => write!(f, "invariant violation: {}", msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = Error::Configuration("distances differ".to_string());
        assert_eq!(e.to_string(), "configuration error: distances differ");
        let e = Error::Geometry("ancilla (4, 0) is unknown".to_string());
        assert_eq!(e.to_string(), "geometry error: ancilla (4, 0) is unknown");
        let e = Error::InvariantViolation("no active region".to_string());
        assert_eq!(e.to_string(), "invariant violation: no active region");
    }
}
