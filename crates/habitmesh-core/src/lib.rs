//! Core domain types for habitmesh.

pub mod aggregate;
pub mod analytics;
pub mod calendar;
pub mod completion;
pub mod config;
pub mod engine;
pub mod habit;
pub mod habit_ops;
pub mod schedule;
pub mod store;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}


#[cfg(test)]
mod tests {
    use super::version;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
