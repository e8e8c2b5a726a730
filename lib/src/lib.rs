//! xschema pipeline library.
//!
//! Turns declarative JSON Schema configs into native validator modules:
//! config documents are discovered and merged ([`parser`]), their schemas
//! fetched with caching and retries ([`retriever`]), converted by external
//! adapter subprocesses ([`generator`]) and assembled into one generated
//! module per language, with the user's client file rewired to import it
//! ([`injector`]). [`pipeline`] ties the stages together.
//!
//! ## Quick start
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use xschema_lib::pipeline::{self, PipelineOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pipeline::PipelineError> {
//!     let options = PipelineOptions::new(".");
//!     let summary = pipeline::run(&options, &CancellationToken::new(), |_event| {}).await?;
//!     println!("generated {} schemas", summary.outputs);
//!     Ok(())
//! }
//! ```

pub mod generator;
pub mod injector;
pub mod language;
pub mod parser;
pub mod pipeline;
pub mod retriever;
pub mod template;
