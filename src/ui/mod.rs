pub mod icons;
pub mod summary;

pub use summary::{print_clean_result, print_failure, print_report, print_selection};
