//! External service integrations.

pub mod services {
    pub use crate::services::*;
}
