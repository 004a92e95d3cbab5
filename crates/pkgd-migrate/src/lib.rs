mod engine;
mod steps;

pub use engine::{migrate, MigrationError, CURRENT_LAYOUT_VERSION};

#[cfg(test)]
mod tests;
