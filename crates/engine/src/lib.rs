//! TaleTable Engine library.
//!
//! ## Structure
//!
//! - `use_cases/` - The GM conversation loop and the pieces it drives
//! - `infrastructure/` - Ports and their adapters (OpenAI-compatible client, RNG, config)
//! - `app` - Application composition

pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
