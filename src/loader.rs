//! Turning plugin bytes, wherever they came from, into a [`Formatter`].

use thiserror::Error ;
use wasmtime::{ Engine, Module };

use crate::formatter::{ Formatter, PluginError };
use crate::version::NegotiationError ;



/// The MIME type plugin downloads are expected to carry.
pub const WASM_CONTENT_TYPE: &str = "application/wasm" ;

/// Errors that prevent a plugin from being loaded.
#[derive( Error, Debug )]
pub enum LoadError {
	/// The bytes are not a valid WebAssembly module.
	#[error( "Compilation Error: {0}" )] Compile( wasmtime::Error ),
	/// Linking or running the module's start section failed.
	#[error( "Instantiation Error: {0}" )] Instantiate( wasmtime::Error ),
	#[error( "{0}" )] Negotiation( #[from] NegotiationError ),
	/// The instance is missing something its generation requires.
	#[error( "Plugin Error: {0}" )] Plugin( #[from] PluginError ),
	/// A download answered with anything but 200.
	#[error( "Unexpected Response Status {status}: {text}" )] UnexpectedStatus { status: u16, text: String },
	#[error( "IO Error: {0}" )] Io( #[from] std::io::Error ),
}

/// A response carrying plugin bytes, as returned by whatever transport fetched them.
pub trait ModuleResponse {
	fn status( &self ) -> u16 ;
	/// The `Content-Type` header, if the transport exposes one.
	fn content_type( &self ) -> Option<&str> ;
	/// Consumes the response for its body.
	///
	/// # Errors
	/// Any error reading the body.
	fn bytes( self ) -> std::io::Result<Vec<u8>> ;
	/// Consumes the response for its body as text, used as the error detail of a failed download.
	///
	/// # Errors
	/// Any error reading the body.
	fn text( self ) -> std::io::Result<String> ;
}

/// Something a [`Formatter`] can be built from.
pub enum ModuleSource {
	Compiled( Module ),
	/// Binary or text format WebAssembly.
	Bytes( Vec<u8> ),
}

impl ModuleSource {

	/// Reads a downloaded plugin, rejecting failed responses.
	///
	/// # Errors
	/// Returns [`LoadError::UnexpectedStatus`] with the response text for any status but 200.
	pub fn from_response( response: impl ModuleResponse ) -> Result<Self, LoadError> {

		let status = response.status();
		if status != 200 {
			let text = response.text()?;
			return Err( LoadError::UnexpectedStatus { status, text })
		}

		match response.content_type() {
			Some( content_type ) if content_type.starts_with( WASM_CONTENT_TYPE ) => {}
			content_type => tracing::warn!( ?content_type, "plugin response is not served as {WASM_CONTENT_TYPE}" ),
		}

		Ok( Self::Bytes( response.bytes()? ))

	}

	/// Compiles the source if it is not compiled yet.
	///
	/// # Errors
	/// Returns [`LoadError::Compile`] for bytes that are not a valid module.
	pub fn compile( self, engine: &Engine ) -> Result<Module, LoadError> {
		match self {
			Self::Compiled( module ) => Ok( module ),
			Self::Bytes( bytes ) => Module::new( engine, bytes ).map_err( LoadError::Compile ),
		}
	}

}

impl From<Module> for ModuleSource {
	fn from( module: Module ) -> Self { Self::Compiled( module )}
}

impl From<Vec<u8>> for ModuleSource {
	fn from( bytes: Vec<u8> ) -> Self { Self::Bytes( bytes )}
}

impl From<&[u8]> for ModuleSource {
	fn from( bytes: &[u8] ) -> Self { Self::Bytes( bytes.to_vec() )}
}

/// Compiles `source` if needed and instantiates it as a [`Formatter`].
///
/// # Errors
/// Any compilation, negotiation or instantiation failure.
pub fn load_formatter( engine: &Engine, source: impl Into<ModuleSource> ) -> Result<Formatter, LoadError> {
	let module = source.into().compile( engine )?;
	Formatter::new( engine, &module )
}
