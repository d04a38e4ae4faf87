//! A host for sandboxed WebAssembly formatting plugins.
//!
//! Plugins are single-purpose WebAssembly modules that take a file path and its text
//! and answer with formatted text, no change, or an error. Over time the plugin ABI
//! went through several incompatible generations; this crate drives all supported ones
//! through one API.
//!
//! # Core Concepts
//!
//! - [`AbiVersion`]: The calling convention a plugin speaks, read from the *names* of its
//! 	exports before anything is instantiated.
//!
//! - [`Formatter`]: One live plugin instance behind a generation independent API:
//! 	configuration, plugin information, diagnostics and formatting.
//!
//! - [`Context`]: A router owning several formatters. It picks a plugin per file by exact
//! 	file name first and extension second, and lets plugins delegate embedded regions
//! 	(say, a fenced code block inside markdown) to each other mid-format.
//!
//! - [`ConfigHandle`]: Identifies one registered configuration inside a plugin instance.
//! 	Older generations only know [`ConfigHandle::DEFAULT`].
//!
//! # Re-exports
//!
//! `Engine` and `Module` are re-exported from `wasmtime` for convenience; see the
//! [wasmtime docs](https://docs.rs/wasmtime/latest/wasmtime/) for details.
//!
//! # Example
//!
//! ```no_run
//! use wasm_format_host::{ Context, ConfigKeyMap, Engine, FormatRequest, GlobalConfiguration };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::default();
//! let context = Context::new( &engine, GlobalConfiguration::default().with_line_width( 100 ));
//!
//! context.add_plugin( std::fs::read( "markdown.wasm" )?, ConfigKeyMap::new() )?;
//! context.add_plugin( std::fs::read( "json.wasm" )?, ConfigKeyMap::new() )?;
//!
//! let text = std::fs::read( "README.md" )?;
//! let outcome = context.format_text( &FormatRequest::new( "README.md", text.clone() ))?;
//! let formatted = outcome.into_text( text )?;
//! # let _ = formatted ;
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The crate logs through [`tracing`] and never installs a subscriber. Whatever the plugins
//! write to stdout and stderr goes to the sink set with [`Formatter::set_output_sink`].

mod config ;
mod version ;
mod channel ;
mod host ;
mod adapter ;
mod formatter ;
mod loader ;
mod context ;

pub use wasmtime::{ Engine, Module };

pub use config::{ ConfigDiagnostic, ConfigKeyMap, GlobalConfiguration, NewLineKind };
pub use version::{ AbiVersion, NegotiationError, SchemaVersion };
pub use host::HostFormatter ;
pub use formatter::{ ConfigHandle, FileMatchingInfo, FormatOutcome, FormatRequest, Formatter, PluginError, PluginInfo };
pub use loader::{ load_formatter, LoadError, ModuleResponse, ModuleSource, WASM_CONTENT_TYPE };
pub use context::{ Context, ContextError, PluginHandle };
