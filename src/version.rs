//! Plugin ABI generation detection.
//!
//! Plugins announce their calling convention through the *shape* of their exports:
//! generation 3 (and the legacy generation 2 sharing its marshaling) exports
//! `get_plugin_schema_version`, later generations export a marker function named
//! `dprint_plugin_version_<N>`. Detection only looks at export names; nothing is
//! instantiated.

use thiserror::Error ;
use wasmtime::Module ;



/// Export identifying generation 3 (and legacy generation 2) plugins.
pub(crate) const SCHEMA_VERSION_EXPORT: &str = "get_plugin_schema_version" ;
/// Prefix of the marker export used from generation 4 onwards.
pub(crate) const VERSION_EXPORT_PREFIX: &str = "dprint_plugin_version_" ;

/// The ABI generations this host can drive.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum AbiVersion {
	/// Staged-copy marshaling through a bounded guest buffer and a single implicit config.
	V3,
	/// Direct-pointer marshaling with explicit config handles.
	V4,
}

impl AbiVersion {

	/// Oldest generation still accepted.
	pub const MIN_SUPPORTED: u32 = 2 ;
	/// Newest generation this host understands.
	pub const MAX_SUPPORTED: u32 = 4 ;

	/// Classifies a compiled module by its exports.
	///
	/// ```
	/// use wasm_format_host::{ AbiVersion, Engine, Module };
	///
	/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
	/// let engine = Engine::default();
	/// let module = Module::new( &engine, r#"(module (func (export "dprint_plugin_version_4")))"# )?;
	/// assert_eq!( AbiVersion::detect( &module )?, AbiVersion::V4 );
	/// # Ok(())
	/// # }
	/// ```
	///
	/// # Errors
	/// Returns a [`NegotiationError`] if the module carries no version marker or one this
	/// host cannot drive.
	pub fn detect( module: &Module ) -> Result<Self, NegotiationError> {
		let names = module.exports().map(| export | export.name().to_string() ).collect::<Vec<_>>();
		Self::from_export_names( names.iter().map( String::as_str ))
	}

	pub(crate) fn from_export_names<'a>( mut names: impl Iterator<Item = &'a str> + Clone ) -> Result<Self, NegotiationError> {

		if names.clone().any(| name | name == SCHEMA_VERSION_EXPORT ) { return Ok( Self::V3 )}

		let version = names
			.find_map(| name | name.strip_prefix( VERSION_EXPORT_PREFIX )?.parse::<u32>().ok() )
			.ok_or( NegotiationError::Undeterminable )?;

		match version {
			4 => Ok( Self::V4 ),
			version if version > Self::MAX_SUPPORTED => Err( NegotiationError::TooNew( version )),
			version => Err( NegotiationError::TooOld( version )),
		}

	}

}

impl std::fmt::Display for AbiVersion {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result {
		match self {
			Self::V3 => write!( f, "3" ),
			Self::V4 => write!( f, "4" ),
		}
	}
}

/// The schema a generation 3 module reports at runtime.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum SchemaVersion {
	/// Generation 2; predates per-call override configuration.
	V2,
	V3,
}

impl SchemaVersion {
	pub(crate) fn from_reported( reported: u32 ) -> Result<Self, NegotiationError> {
		match reported {
			2 => Ok( Self::V2 ),
			3 => Ok( Self::V3 ),
			version if version < AbiVersion::MIN_SUPPORTED => Err( NegotiationError::TooOld( version )),
			version => Err( NegotiationError::TooNew( version )),
		}
	}
}

/// Errors that prevent a plugin from being instantiated at all.
#[derive( Error, Debug, Clone, PartialEq, Eq )]
pub enum NegotiationError {
	/// No recognisable version marker was exported.
	#[error( "Could not determine the plugin's ABI version; this host is likely too old to run it" )]
	Undeterminable,
	/// The plugin targets a generation newer than this host supports.
	#[error( "Plugin ABI version {0} is newer than the supported maximum of {max}; upgrade the host", max = AbiVersion::MAX_SUPPORTED )]
	TooNew( u32 ),
	/// The plugin targets a generation that is no longer supported.
	#[error( "Plugin ABI version {0} is no longer supported; the plugin must be upgraded" )]
	TooOld( u32 ),
}



#[cfg( test )]
mod tests {

	use super::* ;

	fn detect( names: &[&str] ) -> Result<AbiVersion, NegotiationError> {
		AbiVersion::from_export_names( names.iter().copied() )
	}

	#[test]
	fn schema_export_wins_over_version_markers() {
		assert_eq!( detect( &[ "dprint_plugin_version_4", "get_plugin_schema_version" ]), Ok( AbiVersion::V3 ));
	}

	#[test]
	fn first_parseable_marker_decides() {
		assert_eq!( detect( &[ "memory", "dprint_plugin_version_x", "dprint_plugin_version_4", "dprint_plugin_version_9" ]), Ok( AbiVersion::V4 ));
	}

	#[test]
	fn newer_marker_is_too_new() {
		assert_eq!( detect( &[ "dprint_plugin_version_9" ]), Err( NegotiationError::TooNew( 9 )));
	}

	#[test]
	fn older_marker_is_too_old() {
		assert_eq!( detect( &[ "dprint_plugin_version_1" ]), Err( NegotiationError::TooOld( 1 )));
	}

	#[test]
	fn missing_marker_is_undeterminable() {
		assert_eq!( detect( &[ "memory", "format" ]), Err( NegotiationError::Undeterminable ));
	}

	#[test]
	fn reported_schema_versions() {
		assert_eq!( SchemaVersion::from_reported( 2 ), Ok( SchemaVersion::V2 ));
		assert_eq!( SchemaVersion::from_reported( 3 ), Ok( SchemaVersion::V3 ));
		assert_eq!( SchemaVersion::from_reported( 1 ), Err( NegotiationError::TooOld( 1 )));
		assert_eq!( SchemaVersion::from_reported( 4 ), Err( NegotiationError::TooNew( 4 )));
	}

}
