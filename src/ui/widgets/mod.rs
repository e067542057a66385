// src/ui/widgets/mod.rs

pub mod footer;
pub mod input;
pub mod log_view;
pub mod report_view; // The flattened report as a key/value table.
pub mod summary;
