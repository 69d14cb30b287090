//! Command handlers - kept out of main.rs so they can be driven from tests
//! with a scripted driver factory.

pub mod check;
pub mod run;
pub mod serve;

pub use check::{execute_check, load_config, render_tree};
pub use run::{apply_workers, execute_run, write_report};
pub use serve::{banner, execute_serve, parse_addr};
