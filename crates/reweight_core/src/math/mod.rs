//! Numerical helpers shared by the design matrix builder and the optimiser.
//!
//! - `loss`: symmetric relative squared error, its derivative and the
//!   within-tolerance check used for diagnostics

pub mod loss;

pub use loss::{
    is_close, relative_gap, symmetric_relative_error, symmetric_relative_error_grad,
};
