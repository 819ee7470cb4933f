use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! internal_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Internal {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Internal {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all failure modes of the lifting and SSA transformation pipeline. Errors
/// fall into two fatal categories: malformed input (the routine's bytecode violates verifier
/// invariants and the whole routine is rejected) and internal-consistency defects (conditions
/// that cannot arise from well-formed input and indicate a bug in a transformation pass).
/// Recoverable anomalies, such as non-contiguous exception ranges, are logged and never
/// surface through this type.
///
/// # Error Categories
///
/// ## Malformed Input
/// - [`Error::Malformed`] - Bytecode that cannot be lifted (e.g. stack coherency mismatch)
/// - [`Error::UnsupportedInstruction`] - An instruction the lifter refuses to interpret
///
/// ## Internal Consistency
/// - [`Error::Internal`] - A transformation pass detected an impossible state
/// - [`Error::GraphError`] - A graph query or algorithm precondition failed
///
/// # Examples
///
/// ```rust,ignore
/// use classir::{Error, Pipeline};
///
/// match Pipeline::default().lift(routine) {
///     Ok(graph) => println!("Lifted {} blocks", graph.block_count()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed bytecode: {} ({}:{})", message, file, line);
///     }
///     Err(Error::UnsupportedInstruction(mnemonic)) => {
///         eprintln!("Unsupported instruction: {}", mnemonic);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The routine's bytecode is damaged and could not be lifted.
    ///
    /// This error indicates that the instruction stream violates an invariant that a
    /// bytecode verifier would have enforced, most commonly a stack coherency mismatch
    /// at a control-flow merge point or a branch to a label that does not exist. The
    /// error includes the source location where the malformation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The lifter encountered an instruction it does not interpret.
    ///
    /// Unstructured subroutine instructions (`jsr`/`ret`) and unrecognized opcodes abort
    /// processing of the whole routine; no instruction is ever silently skipped, so a
    /// partially-lifted graph is never produced.
    ///
    /// The associated value is the instruction's mnemonic.
    #[error("Unsupported instruction - {0}")]
    UnsupportedInstruction(String),

    /// A transformation pass reached a state that well-formed input cannot produce.
    ///
    /// Raised for phi-argument type conflicts, references to SSA versions that were
    /// never defined, and similar conditions. These are defect signals, not user
    /// errors: the input routine already passed the lifter's structural checks when
    /// one of these occurs.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the inconsistent state
    /// * `file` - Source file where the inconsistency was detected
    /// * `line` - Source line where the inconsistency was detected
    #[error("Internal - {file}:{line}: {message}")]
    Internal {
        /// The message to be printed for the Internal error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Flow graph error.
    ///
    /// Errors related to graph structure preconditions, such as running a dominance
    /// computation over a graph without a unique entry block, or querying a block
    /// that has been removed.
    #[error("{0}")]
    GraphError(String),
}

#[cfg(test)]
mod tests {
    use crate::Error;

    #[test]
    fn test_malformed_macro_plain() {
        let err = malformed_error!("bad stack");
        match err {
            Error::Malformed {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "bad stack");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            _ => panic!("expected Malformed"),
        }
    }

    #[test]
    fn test_malformed_macro_format() {
        let err = malformed_error!("height {} vs {}", 2, 3);
        match err {
            Error::Malformed { message, .. } => assert_eq!(message, "height 2 vs 3"),
            _ => panic!("expected Malformed"),
        }
    }

    #[test]
    fn test_internal_macro() {
        let err = internal_error!("no version for {}", "lvar0");
        match err {
            Error::Internal { message, .. } => assert_eq!(message, "no version for lvar0"),
            _ => panic!("expected Internal"),
        }
    }

    #[test]
    fn test_display() {
        let err = Error::UnsupportedInstruction("jsr".to_string());
        assert_eq!(err.to_string(), "Unsupported instruction - jsr");
    }
}
