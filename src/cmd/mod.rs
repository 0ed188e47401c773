//! CLI command implementations.
//!
//! | Module   | Commands handled              |
//! |----------|-------------------------------|
//! | `review` | `Review`, `Context`, `Parse`  |
//! | `config` | `Config`                      |

pub mod config;
pub mod review;

pub use config::cmd_config;
pub use review::{cmd_context, cmd_parse, cmd_review};
