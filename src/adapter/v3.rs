//! Generation 3, and the legacy generation 2 sharing its marshaling.
//!
//! A single implicit configuration, staged-copy transfers, and no ranged formatting.

use wasmtime::{ Instance, Store, TypedFunc };

use crate::channel::{ self, ByteChannel, StagedChannel };
use crate::config::{ ConfigDiagnostic, ConfigKeyMap, GlobalConfiguration };
use crate::formatter::{ ConfigHandle, FileMatchingInfo, FormatOutcome, FormatRequest, PluginError, PluginInfo };
use crate::host::HostState ;
use crate::loader::LoadError ;
use crate::version::{ SchemaVersion, SCHEMA_VERSION_EXPORT };
use super::{ fetch, optional_export, required_export, FormatResponse };



pub(crate) struct V3Adapter {
	schema: SchemaVersion,
	channel: StagedChannel,
	reset_config: Option<TypedFunc<(), ()>>,
	set_global_config: TypedFunc<(), ()>,
	set_plugin_config: TypedFunc<(), ()>,
	get_plugin_info: TypedFunc<(), u32>,
	get_license_text: TypedFunc<(), u32>,
	get_resolved_config: TypedFunc<(), u32>,
	get_config_diagnostics: TypedFunc<(), u32>,
	set_file_path: TypedFunc<(), ()>,
	set_override_config: Option<TypedFunc<(), ()>>,
	format: TypedFunc<(), u32>,
	response: FormatResponse,
}

impl V3Adapter {

	pub fn new( store: &mut Store<HostState>, instance: &Instance ) -> Result<Self, LoadError> {

		let schema_version = required_export::<(), u32>( store, instance, SCHEMA_VERSION_EXPORT )?
			.call( &mut *store, () )
			.map_err( PluginError::from )?;
		let schema = SchemaVersion::from_reported( schema_version )?;
		tracing::debug!( ?schema, "negotiated legacy plugin schema" );

		let channel = StagedChannel {
			memory: instance.get_memory( &mut *store, "memory" ).ok_or( PluginError::MissingMemory )?,
			buffer_ptr: required_export( store, instance, "get_wasm_memory_buffer" )?,
			buffer_size: required_export( store, instance, "get_wasm_memory_buffer_size" )?,
			clear_shared_bytes: required_export( store, instance, "clear_shared_bytes" )?,
			add_to_shared_bytes_from_buffer: required_export( store, instance, "add_to_shared_bytes_from_buffer" )?,
			set_buffer_with_shared_bytes: required_export( store, instance, "set_buffer_with_shared_bytes" )?,
		};

		Ok( Self {
			schema,
			channel,
			reset_config: optional_export( store, instance, "reset_config" )?,
			set_global_config: required_export( store, instance, "set_global_config" )?,
			set_plugin_config: required_export( store, instance, "set_plugin_config" )?,
			get_plugin_info: required_export( store, instance, "get_plugin_info" )?,
			get_license_text: required_export( store, instance, "get_license_text" )?,
			get_resolved_config: required_export( store, instance, "get_resolved_config" )?,
			get_config_diagnostics: required_export( store, instance, "get_config_diagnostics" )?,
			set_file_path: required_export( store, instance, "set_file_path" )?,
			set_override_config: optional_export( store, instance, "set_override_config" )?,
			format: required_export( store, instance, "format" )?,
			response: FormatResponse {
				get_formatted_text: required_export( store, instance, "get_formatted_text" )?,
				get_error_text: required_export( store, instance, "get_error_text" )?,
			},
		})

	}

	pub fn register_config(
		&self,
		store: &mut Store<HostState>,
		handle: ConfigHandle,
		global: &GlobalConfiguration,
		plugin: &ConfigKeyMap,
	) -> Result<(), PluginError> {

		Self::check_handle( handle )?;

		if let Some( reset_config ) = &self.reset_config {
			reset_config.call( &mut *store, () )?;
		}

		self.channel.send( store, &serde_json::to_vec( global )? )?;
		self.set_global_config.call( &mut *store, () )?;
		self.channel.send( store, &serde_json::to_vec( plugin )? )?;
		self.set_plugin_config.call( &mut *store, () )?;

		Ok(())

	}

	/// Nothing to free; the next registration resets the plugin's state.
	pub fn release_config( &self, handle: ConfigHandle ) -> Result<(), PluginError> {
		Self::check_handle( handle )
	}

	pub fn plugin_info( &self, store: &mut Store<HostState> ) -> Result<PluginInfo, PluginError> {
		channel::decode_json( &fetch( store, &self.channel, &self.get_plugin_info, () )? )
	}

	pub fn license_text( &self, store: &mut Store<HostState> ) -> Result<String, PluginError> {
		channel::decode_string( fetch( store, &self.channel, &self.get_license_text, () )? )
	}

	pub fn resolved_config( &self, store: &mut Store<HostState>, handle: ConfigHandle ) -> Result<ConfigKeyMap, PluginError> {
		Self::check_handle( handle )?;
		channel::decode_json( &fetch( store, &self.channel, &self.get_resolved_config, () )? )
	}

	pub fn config_diagnostics( &self, store: &mut Store<HostState>, handle: ConfigHandle ) -> Result<Vec<ConfigDiagnostic>, PluginError> {
		Self::check_handle( handle )?;
		channel::decode_json( &fetch( store, &self.channel, &self.get_config_diagnostics, () )? )
	}

	/// These plugins announce their files as part of their static information.
	pub fn file_matching_info( &self, store: &mut Store<HostState>, handle: ConfigHandle ) -> Result<FileMatchingInfo, PluginError> {
		Self::check_handle( handle )?;
		channel::decode_json( &fetch( store, &self.channel, &self.get_plugin_info, () )? )
	}

	pub fn format( &self, store: &mut Store<HostState>, handle: ConfigHandle, request: &FormatRequest ) -> Result<FormatOutcome, PluginError> {

		Self::check_handle( handle )?;
		if request.effective_range()?.is_some() {
			tracing::debug!( file_path = %request.file_path, "plugin cannot format a byte range; leaving text unchanged" );
			return Ok( FormatOutcome::Unchanged )
		}

		let override_config = match &request.override_config {
			None => None,
			Some( config ) => Some(( config, self.override_export()? )),
		};

		self.channel.send( store, request.file_path.as_bytes() )?;
		self.set_file_path.call( &mut *store, () )?;

		if let Some(( config, set_override_config )) = override_config {
			self.channel.send( store, &serde_json::to_vec( config )? )?;
			set_override_config.call( &mut *store, () )?;
		}

		self.channel.send( store, &request.file_text )?;
		let code = self.format.call( &mut *store, () )?;
		self.response.read( store, &self.channel, code )

	}

	fn override_export( &self ) -> Result<&TypedFunc<(), ()>, PluginError> {
		match self.schema {
			SchemaVersion::V2 => Err( PluginError::OverrideConfigUnsupported ),
			SchemaVersion::V3 => self.set_override_config.as_ref().ok_or( PluginError::OverrideConfigUnsupported ),
		}
	}

	fn check_handle( handle: ConfigHandle ) -> Result<(), PluginError> {
		match handle == ConfigHandle::DEFAULT {
			true => Ok(()),
			false => Err( PluginError::UnsupportedConfigHandle( handle )),
		}
	}

}
