//! The generation independent formatting facade.
//!
//! A [`Formatter`] owns one live plugin instance: a wasmtime [`Store`] whose data is the
//! host side of the callback bridge, and the [`Adapter`] speaking that plugin's ABI
//! generation. Every call is synchronous and runs to completion before the next one
//! starts.

use std::collections::HashSet ;
use std::ops::Range ;
use std::string::FromUtf8Error ;
use serde::{ Deserialize, Serialize };
use thiserror::Error ;
use wasmtime::{ Engine, MemoryAccessError, Module, Store };

use crate::adapter::Adapter ;
use crate::config::{ ConfigDiagnostic, ConfigKeyMap, GlobalConfiguration };
use crate::host::HostState ;
use crate::loader::LoadError ;
use crate::version::AbiVersion ;



/// Identifies one registered (global, plugin) configuration pair inside a plugin instance.
///
/// Generation 3 plugins only know the implicit [`ConfigHandle::DEFAULT`]; generation 4
/// plugins accept any number of handles.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub struct ConfigHandle( u32 );

impl ConfigHandle {
	/// The handle used by [`Formatter::set_config`] and [`Formatter::format_text`].
	pub const DEFAULT: Self = Self( 1 );

	pub const fn new( id: u32 ) -> Self { Self( id )}

	pub const fn id( self ) -> u32 { self.0 }
}

impl std::fmt::Display for ConfigHandle {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result {
		std::fmt::Display::fmt( &self.0, f )
	}
}

/// A single request to format one file.
#[derive( Debug, Clone, PartialEq )]
pub struct FormatRequest {
	pub file_path: String,
	pub file_text: Vec<u8>,
	/// Byte range of `file_text` to format. `None` formats everything.
	pub byte_range: Option<Range<usize>>,
	/// Configuration overrides applied to this call only.
	pub override_config: Option<ConfigKeyMap>,
}

impl FormatRequest {

	pub fn new( file_path: impl Into<String>, file_text: impl Into<Vec<u8>> ) -> Self {
		Self {
			file_path: file_path.into(),
			file_text: file_text.into(),
			byte_range: None,
			override_config: None,
		}
	}

	/// Restricts formatting to `range`, given in bytes.
	pub fn with_byte_range( mut self, range: Range<usize> ) -> Self {
		self.byte_range = Some( range );
		self
	}

	/// Applies `config` on top of the registered configuration for this call only.
	pub fn with_override_config( mut self, config: ConfigKeyMap ) -> Self {
		self.override_config = Some( config );
		self
	}

	/// Validates the requested range and collapses a whole-text range to `None`.
	pub(crate) fn effective_range( &self ) -> Result<Option<Range<usize>>, PluginError> {
		let len = self.file_text.len();
		match &self.byte_range {
			None => Ok( None ),
			Some( range ) if range.start > range.end || range.end > len => Err( PluginError::InvalidByteRange {
				start: range.start,
				end: range.end,
				len,
			}),
			Some( range ) if range.start == 0 && range.end == len => Ok( None ),
			Some( range ) => Ok( Some( range.clone() )),
		}
	}

}

/// The result of one format call.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum FormatOutcome {
	/// The plugin made no changes; the input text stands as is.
	Unchanged,
	/// The plugin produced new text.
	Changed( Vec<u8> ),
	/// The plugin reported an error; carries its message verbatim.
	Failed( String ),
}

impl FormatOutcome {
	/// Resolves the outcome against the text that was sent.
	///
	/// `Unchanged` hands back `original` itself rather than a copy.
	///
	/// # Errors
	/// Returns the plugin's message for [`FormatOutcome::Failed`].
	pub fn into_text( self, original: Vec<u8> ) -> Result<Vec<u8>, String> {
		match self {
			Self::Unchanged => Ok( original ),
			Self::Changed( text ) => Ok( text ),
			Self::Failed( message ) => Err( message ),
		}
	}
}

/// Static information a plugin reports about itself.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
pub struct PluginInfo {
	pub name: String,
	pub version: String,
	pub config_key: String,
	pub help_url: String,
	pub config_schema_url: String,
	#[serde( default, skip_serializing_if = "Option::is_none" )]
	pub update_url: Option<String>,
}

/// Which files a plugin wants to format under its current configuration.
#[derive( Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
pub struct FileMatchingInfo {
	#[serde( default )]
	pub file_extensions: Vec<String>,
	#[serde( default )]
	pub file_names: Vec<String>,
}

impl FileMatchingInfo {
	/// Lower-cases every entry, strips leading dots from extensions and drops duplicates.
	pub fn normalized( self ) -> Self {
		use itertools::Itertools ;
		Self {
			file_extensions: self.file_extensions.iter()
				.map(| extension | extension.trim_start_matches( '.' ).to_lowercase() )
				.unique()
				.collect(),
			file_names: self.file_names.iter()
				.map(| name | name.to_lowercase() )
				.unique()
				.collect(),
		}
	}
}

/// Errors raised by the host while talking to a plugin.
///
/// These never describe a formatting problem the plugin reported itself; those are
/// returned as [`FormatOutcome::Failed`].
#[derive( Error, Debug )]
pub enum PluginError {
	/// A required export is missing from the module.
	#[error( "Missing Export: {0}" )] MissingExport( String ),
	/// An export exists but has an unexpected signature.
	#[error( "Export Signature Mismatch: {name}" )] ExportSignature { name: String, error: wasmtime::Error },
	/// The module exports no linear memory named `memory`.
	#[error( "Missing Memory Export" )] MissingMemory,
	/// The plugin answered a format call with a code outside the protocol.
	#[error( "Unexpected Response Code: {0}" )] UnexpectedResponseCode( u32 ),
	/// The plugin trapped.
	#[error( "Runtime Exception: {0}" )] RuntimeException( wasmtime::Error ),
	/// A transfer touched memory outside the guest's linear memory.
	#[error( "Memory Access Out Of Bounds" )] MemoryAccess( #[from] MemoryAccessError ),
	/// The plugin returned text that is not valid UTF-8.
	#[error( "Invalid UTF-8: {0}" )] InvalidUtf8( #[from] FromUtf8Error ),
	/// A JSON payload could not be encoded or decoded.
	#[error( "Malformed JSON Payload: {0}" )] Json( #[from] serde_json::Error ),
	/// The guest reported a zero sized staging buffer, so no transfer can make progress.
	#[error( "Staging Buffer Has Zero Size" )] EmptyStagingBuffer,
	/// A payload does not fit the 32-bit guest address space.
	#[error( "Payload Too Large: {0} bytes" )] PayloadTooLarge( usize ),
	/// The requested byte range lies outside the file text.
	#[error( "Invalid Byte Range: {start}..{end} for a text of {len} bytes" )] InvalidByteRange { start: usize, end: usize, len: usize },
	/// The plugin's ABI generation cannot apply a per-call override configuration.
	#[error( "Override configuration is not supported by this plugin" )] OverrideConfigUnsupported,
	/// The plugin's ABI generation only knows the default config handle.
	#[error( "Config handle {0} is not supported by this plugin" )] UnsupportedConfigHandle( ConfigHandle ),
	/// The config handle was never registered, or was released.
	#[error( "Config handle {0} is not registered" )] UnregisteredConfigHandle( ConfigHandle ),
	/// The default configuration failed to register or was released, and nothing replaced it.
	#[error( "Plugin has no default configuration; register one again" )] Unconfigured,
	/// The guest reported bytes outside its linear memory.
	#[error( "Guest Memory Out Of Bounds: {len} bytes at {pointer}" )] GuestMemoryOutOfBounds { pointer: u32, len: u32 },
}

impl From<wasmtime::Error> for PluginError {
	fn from( error: wasmtime::Error ) -> Self { Self::RuntimeException( error )}
}

/// A formatting plugin instance behind the generation independent API.
pub struct Formatter {
	store: Store<HostState>,
	adapter: Adapter,
	registered: HashSet<ConfigHandle>,
	/// Set once the default handle was registered, released or failed to register.
	default_touched: bool,
	plugin_info: Option<PluginInfo>,
}

impl std::fmt::Debug for Formatter {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		f.debug_struct( "Formatter" )
			.field( "abi_version", &self.abi_version() )
			.field( "registered", &self.registered )
			.field( "plugin_info", &self.plugin_info )
			.finish_non_exhaustive()
	}
}

impl Formatter {

	/// Detects the module's ABI generation and instantiates it.
	///
	/// # Errors
	/// Fails if the generation is unsupported, if instantiation fails, or if an export the
	/// generation requires is missing.
	pub fn new( engine: &Engine, module: &Module ) -> Result<Self, LoadError> {
		let version = AbiVersion::detect( module )?;
		let ( store, adapter ) = Adapter::instantiate( engine, module, version )?;
		tracing::debug!( abi_version = %version, "instantiated formatting plugin" );
		Ok( Self {
			store,
			adapter,
			registered: HashSet::new(),
			default_touched: false,
			plugin_info: None,
		})
	}

	/// The ABI generation this plugin speaks.
	pub fn abi_version( &self ) -> AbiVersion { self.adapter.version() }

	/// Registers `global` and `plugin` under [`ConfigHandle::DEFAULT`].
	///
	/// # Errors
	/// Fails if the configuration cannot be transferred or the plugin traps.
	pub fn set_config( &mut self, global: &GlobalConfiguration, plugin: &ConfigKeyMap ) -> Result<(), PluginError> {
		self.register_config( ConfigHandle::DEFAULT, global, plugin )
	}

	/// Registers a configuration under `handle`, releasing any previous registration first.
	///
	/// # Errors
	/// Generation 3 plugins reject any handle other than [`ConfigHandle::DEFAULT`].
	pub fn register_config(
		&mut self,
		handle: ConfigHandle,
		global: &GlobalConfiguration,
		plugin: &ConfigKeyMap,
	) -> Result<(), PluginError> {
		if handle == ConfigHandle::DEFAULT { self.default_touched = true }
		if self.registered.remove( &handle ) {
			self.adapter.release_config( &mut self.store, handle )?;
		}
		tracing::debug!( %handle, "registering plugin configuration" );
		self.adapter.register_config( &mut self.store, handle, global, plugin )?;
		self.registered.insert( handle );
		Ok(())
	}

	/// Releases the configuration registered under `handle`.
	///
	/// # Errors
	/// Fails if `handle` is not registered.
	///
	/// Releasing [`ConfigHandle::DEFAULT`] leaves the formatter unconfigured until a new
	/// default is registered; it is not replaced with an empty one.
	pub fn release_config( &mut self, handle: ConfigHandle ) -> Result<(), PluginError> {
		if !self.registered.remove( &handle ) { return Err( PluginError::UnregisteredConfigHandle( handle ))}
		if handle == ConfigHandle::DEFAULT { self.default_touched = true }
		self.adapter.release_config( &mut self.store, handle )
	}

	/// The plugin's static information. Retrieved once, then cached.
	///
	/// # Errors
	/// Fails if the plugin's answer cannot be decoded.
	pub fn plugin_info( &mut self ) -> Result<PluginInfo, PluginError> {
		if let Some( info ) = &self.plugin_info { return Ok( info.clone() )}
		self.ensure_configured()?;
		let info = self.adapter.plugin_info( &mut self.store )?;
		self.plugin_info = Some( info.clone() );
		Ok( info )
	}

	/// The plugin's license text.
	///
	/// # Errors
	/// Fails if the plugin's answer is not valid UTF-8.
	pub fn license_text( &mut self ) -> Result<String, PluginError> {
		self.ensure_configured()?;
		self.adapter.license_text( &mut self.store )
	}

	/// The configuration the plugin resolved from the registered global and plugin keys.
	///
	/// # Errors
	/// Fails if the plugin's answer cannot be decoded.
	pub fn resolved_config( &mut self ) -> Result<ConfigKeyMap, PluginError> {
		self.ensure_configured()?;
		self.adapter.resolved_config( &mut self.store, ConfigHandle::DEFAULT )
	}

	/// Problems the plugin found in the registered configuration.
	///
	/// # Errors
	/// Fails if the plugin's answer cannot be decoded.
	pub fn config_diagnostics( &mut self ) -> Result<Vec<ConfigDiagnostic>, PluginError> {
		self.ensure_configured()?;
		self.adapter.config_diagnostics( &mut self.store, ConfigHandle::DEFAULT )
	}

	/// The files the plugin handles under the registered configuration.
	///
	/// # Errors
	/// Fails if the plugin's answer cannot be decoded.
	pub fn file_matching_info( &mut self ) -> Result<FileMatchingInfo, PluginError> {
		self.ensure_configured()?;
		self.adapter.file_matching_info( &mut self.store, ConfigHandle::DEFAULT )
	}

	/// Formats `request` with the default configuration.
	///
	/// # Errors
	/// Returns an error for protocol violations and unsupported capabilities; a formatting
	/// failure reported by the plugin is an `Ok(` [`FormatOutcome::Failed`] `)`.
	pub fn format_text( &mut self, request: &FormatRequest ) -> Result<FormatOutcome, PluginError> {
		self.format_text_with( ConfigHandle::DEFAULT, request )
	}

	/// Formats `request` with the configuration registered under `handle`.
	///
	/// # Errors
	/// As [`Formatter::format_text`], plus [`PluginError::UnregisteredConfigHandle`] for a
	/// handle that was never registered.
	pub fn format_text_with( &mut self, handle: ConfigHandle, request: &FormatRequest ) -> Result<FormatOutcome, PluginError> {
		match handle == ConfigHandle::DEFAULT {
			true => self.ensure_configured()?,
			false => if !self.registered.contains( &handle ) {
				return Err( PluginError::UnregisteredConfigHandle( handle ))
			},
		}
		self.adapter.format( &mut self.store, handle, request )
	}

	/// Installs the function answering the plugin's requests to format embedded text.
	///
	/// Without one, such requests come back unchanged.
	pub fn set_host_formatter( &mut self, formatter: impl FnMut( FormatRequest ) -> FormatOutcome + Send + 'static ) {
		self.store.data_mut().set_host_formatter( Box::new( formatter ));
	}

	/// Removes the host formatter.
	pub fn clear_host_formatter( &mut self ) {
		self.store.data_mut().clear_host_formatter();
	}

	/// Redirects whatever the plugin writes to stdout and stderr.
	pub fn set_output_sink( &mut self, sink: impl std::io::Write + Send + 'static ) {
		self.store.data_mut().set_output( Box::new( sink ));
	}

	/// Registers an empty default configuration, but only if none was ever attempted.
	fn ensure_configured( &mut self ) -> Result<(), PluginError> {
		match ( self.registered.contains( &ConfigHandle::DEFAULT ), self.default_touched ) {
			( true, _ ) => Ok(()),
			( false, true ) => Err( PluginError::Unconfigured ),
			( false, false ) => self.set_config( &GlobalConfiguration::default(), &ConfigKeyMap::new() ),
		}
	}

}



#[cfg( test )]
mod tests {

	use super::* ;

	#[test]
	fn whole_text_range_is_no_range() {
		let request = FormatRequest::new( "a.txt", "hello" ).with_byte_range( 0..5 );
		assert_eq!( request.effective_range().unwrap(), None );
	}

	#[test]
	fn partial_range_is_kept() {
		let request = FormatRequest::new( "a.txt", "hello" ).with_byte_range( 1..3 );
		assert_eq!( request.effective_range().unwrap(), Some( 1..3 ));
	}

	#[test]
	fn out_of_bounds_range_is_rejected() {
		let request = FormatRequest::new( "a.txt", "hello" ).with_byte_range( 2..9 );
		assert!( matches!( request.effective_range(), Err( PluginError::InvalidByteRange { start: 2, end: 9, len: 5 })));
	}

	#[test]
	#[allow( clippy::reversed_empty_ranges )]
	fn inverted_range_is_rejected() {
		let request = FormatRequest::new( "a.txt", "hello" ).with_byte_range( 4..1 );
		assert!( matches!( request.effective_range(), Err( PluginError::InvalidByteRange { .. })));
	}

	#[test]
	fn unchanged_hands_back_the_original() {
		let original = b"keep me".to_vec();
		let pointer = original.as_ptr();
		let text = FormatOutcome::Unchanged.into_text( original ).unwrap();
		assert_eq!( text.as_ptr(), pointer );
	}

	#[test]
	fn file_matching_is_normalised() {
		let info = FileMatchingInfo {
			file_extensions: vec![ "JSON".into(), ".jsonc".into(), "json".into() ],
			file_names: vec![ "Dockerfile".into() ],
		}.normalized();
		assert_eq!( info.file_extensions, vec![ "json".to_string(), "jsonc".to_string() ]);
		assert_eq!( info.file_names, vec![ "dockerfile".to_string() ]);
	}

}
