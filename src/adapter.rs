//! Per-generation calling conventions behind one closed enum.
//!
//! The generation is picked once, from the module's exports, and never changes for the
//! life of the instance. Everything generation specific, from how bytes move to how
//! configuration is addressed, stays inside the variant.

use wasmtime::{ Engine, Instance, Linker, Module, Store, TypedFunc, WasmParams, WasmResults };

use crate::channel::ByteChannel ;
use crate::config::{ ConfigDiagnostic, ConfigKeyMap, GlobalConfiguration };
use crate::formatter::{ ConfigHandle, FileMatchingInfo, FormatOutcome, FormatRequest, PluginError, PluginInfo };
use crate::host::{ self, HostState };
use crate::loader::LoadError ;
use crate::version::AbiVersion ;

mod v3 ;
mod v4 ;

pub(crate) use v3::V3Adapter ;
pub(crate) use v4::V4Adapter ;



/// The fixed answer codes of every `format` call, in both directions.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub(crate) enum ResponseCode {
	NoChange = 0,
	Change = 1,
	Failure = 2,
}

impl TryFrom<u32> for ResponseCode {
	type Error = PluginError ;
	fn try_from( code: u32 ) -> Result<Self, PluginError> {
		match code {
			0 => Ok( Self::NoChange ),
			1 => Ok( Self::Change ),
			2 => Ok( Self::Failure ),
			code => Err( PluginError::UnexpectedResponseCode( code )),
		}
	}
}

/// The live plugin instance, driven through its generation's exports.
pub(crate) enum Adapter {
	V3( V3Adapter ),
	V4( V4Adapter ),
}

impl Adapter {

	pub fn instantiate( engine: &Engine, module: &Module, version: AbiVersion ) -> Result<( Store<HostState>, Self ), LoadError> {

		let mut linker = Linker::new( engine );
		let imports = match version {
			AbiVersion::V3 => host::add_v3_imports( &mut linker ),
			AbiVersion::V4 => host::add_v4_imports( &mut linker ),
		};
		imports.map_err( LoadError::Instantiate )?;
		linker.define_unknown_imports_as_traps( module ).map_err( LoadError::Instantiate )?;

		let mut store = Store::new( engine, HostState::default() );
		let instance = linker.instantiate( &mut store, module ).map_err( LoadError::Instantiate )?;

		let adapter = match version {
			AbiVersion::V3 => Self::V3( V3Adapter::new( &mut store, &instance )? ),
			AbiVersion::V4 => Self::V4( V4Adapter::new( &mut store, &instance )? ),
		};
		Ok(( store, adapter ))

	}

	pub fn version( &self ) -> AbiVersion {
		match self {
			Self::V3( _ ) => AbiVersion::V3,
			Self::V4( _ ) => AbiVersion::V4,
		}
	}

	pub fn register_config(
		&self,
		store: &mut Store<HostState>,
		handle: ConfigHandle,
		global: &GlobalConfiguration,
		plugin: &ConfigKeyMap,
	) -> Result<(), PluginError> {
		match self {
			Self::V3( adapter ) => adapter.register_config( store, handle, global, plugin ),
			Self::V4( adapter ) => adapter.register_config( store, handle, global, plugin ),
		}
	}

	pub fn release_config( &self, store: &mut Store<HostState>, handle: ConfigHandle ) -> Result<(), PluginError> {
		match self {
			Self::V3( adapter ) => adapter.release_config( handle ),
			Self::V4( adapter ) => adapter.release_config( store, handle ),
		}
	}

	pub fn plugin_info( &self, store: &mut Store<HostState> ) -> Result<PluginInfo, PluginError> {
		match self {
			Self::V3( adapter ) => adapter.plugin_info( store ),
			Self::V4( adapter ) => adapter.plugin_info( store ),
		}
	}

	pub fn license_text( &self, store: &mut Store<HostState> ) -> Result<String, PluginError> {
		match self {
			Self::V3( adapter ) => adapter.license_text( store ),
			Self::V4( adapter ) => adapter.license_text( store ),
		}
	}

	pub fn resolved_config( &self, store: &mut Store<HostState>, handle: ConfigHandle ) -> Result<ConfigKeyMap, PluginError> {
		match self {
			Self::V3( adapter ) => adapter.resolved_config( store, handle ),
			Self::V4( adapter ) => adapter.resolved_config( store, handle ),
		}
	}

	pub fn config_diagnostics( &self, store: &mut Store<HostState>, handle: ConfigHandle ) -> Result<Vec<ConfigDiagnostic>, PluginError> {
		match self {
			Self::V3( adapter ) => adapter.config_diagnostics( store, handle ),
			Self::V4( adapter ) => adapter.config_diagnostics( store, handle ),
		}
	}

	pub fn file_matching_info( &self, store: &mut Store<HostState>, handle: ConfigHandle ) -> Result<FileMatchingInfo, PluginError> {
		match self {
			Self::V3( adapter ) => adapter.file_matching_info( store, handle ),
			Self::V4( adapter ) => adapter.file_matching_info( store, handle ),
		}
	}

	pub fn format( &self, store: &mut Store<HostState>, handle: ConfigHandle, request: &FormatRequest ) -> Result<FormatOutcome, PluginError> {
		match self {
			Self::V3( adapter ) => adapter.format( store, handle, request ),
			Self::V4( adapter ) => adapter.format( store, handle, request ),
		}
	}

}

/// Looks up an export the generation may or may not provide.
pub(crate) fn optional_export<P: WasmParams, R: WasmResults>(
	store: &mut Store<HostState>,
	instance: &Instance,
	name: &str,
) -> Result<Option<TypedFunc<P, R>>, PluginError> {
	instance.get_func( &mut *store, name )
		.map(| func | func.typed::<P, R>( &*store ).map_err(| error | PluginError::ExportSignature { name: name.to_string(), error }))
		.transpose()
}

/// Looks up an export the generation cannot work without.
pub(crate) fn required_export<P: WasmParams, R: WasmResults>(
	store: &mut Store<HostState>,
	instance: &Instance,
	name: &str,
) -> Result<TypedFunc<P, R>, PluginError> {
	optional_export( store, instance, name )?.ok_or_else(|| PluginError::MissingExport( name.to_string() ))
}

/// Calls an export that stages bytes and answers with their length, then collects them.
pub(crate) fn fetch<P: WasmParams>(
	store: &mut Store<HostState>,
	channel: &impl ByteChannel,
	export: &TypedFunc<P, u32>,
	params: P,
) -> Result<Vec<u8>, PluginError> {
	let len = export.call( &mut *store, params )?;
	channel.receive( store, len )
}

/// The exports that hand back the result of a `format` call.
pub(crate) struct FormatResponse {
	pub get_formatted_text: TypedFunc<(), u32>,
	pub get_error_text: TypedFunc<(), u32>,
}

impl FormatResponse {
	pub fn read( &self, store: &mut Store<HostState>, channel: &impl ByteChannel, code: u32 ) -> Result<FormatOutcome, PluginError> {
		let code = ResponseCode::try_from( code )?;
		tracing::trace!( ?code, "plugin answered format call" );
		match code {
			ResponseCode::NoChange => Ok( FormatOutcome::Unchanged ),
			ResponseCode::Change => Ok( FormatOutcome::Changed( fetch( store, channel, &self.get_formatted_text, () )? )),
			ResponseCode::Failure => {
				let message = crate::channel::decode_string( fetch( store, channel, &self.get_error_text, () )? )?;
				Ok( FormatOutcome::Failed( message ))
			}
		}
	}
}
