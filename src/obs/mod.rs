//! Observability.

pub mod metrics {
    pub use crate::metrics::*;
}
