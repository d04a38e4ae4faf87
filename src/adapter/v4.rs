//! Generation 4: explicit config handles and direct-pointer transfers.

use wasmtime::{ Instance, Store, TypedFunc };

use crate::channel::{ self, ByteChannel, DirectChannel };
use crate::config::{ ConfigDiagnostic, ConfigKeyMap, GlobalConfiguration, RawFormatConfig };
use crate::formatter::{ ConfigHandle, FileMatchingInfo, FormatOutcome, FormatRequest, PluginError, PluginInfo };
use crate::host::HostState ;
use crate::loader::LoadError ;
use super::{ fetch, optional_export, required_export, FormatResponse };



pub(crate) struct V4Adapter {
	channel: DirectChannel,
	register_config: TypedFunc<u32, ()>,
	release_config: TypedFunc<u32, ()>,
	get_config_diagnostics: TypedFunc<u32, u32>,
	get_resolved_config: TypedFunc<u32, u32>,
	get_config_file_matching: TypedFunc<u32, u32>,
	get_plugin_info: TypedFunc<(), u32>,
	get_license_text: TypedFunc<(), u32>,
	set_file_path: TypedFunc<(), ()>,
	set_override_config: TypedFunc<(), ()>,
	format: TypedFunc<u32, u32>,
	format_range: Option<TypedFunc<( u32, u32, u32 ), u32>>,
	response: FormatResponse,
}

impl V4Adapter {

	pub fn new( store: &mut Store<HostState>, instance: &Instance ) -> Result<Self, LoadError> {
		let channel = DirectChannel {
			memory: instance.get_memory( &mut *store, "memory" ).ok_or( PluginError::MissingMemory )?,
			clear_shared_bytes: required_export( store, instance, "clear_shared_bytes" )?,
			get_shared_bytes_ptr: required_export( store, instance, "get_shared_bytes_ptr" )?,
		};
		Ok( Self {
			channel,
			register_config: required_export( store, instance, "register_config" )?,
			release_config: required_export( store, instance, "release_config" )?,
			get_config_diagnostics: required_export( store, instance, "get_config_diagnostics" )?,
			get_resolved_config: required_export( store, instance, "get_resolved_config" )?,
			get_config_file_matching: required_export( store, instance, "get_config_file_matching" )?,
			get_plugin_info: required_export( store, instance, "get_plugin_info" )?,
			get_license_text: required_export( store, instance, "get_license_text" )?,
			set_file_path: required_export( store, instance, "set_file_path" )?,
			set_override_config: required_export( store, instance, "set_override_config" )?,
			format: required_export( store, instance, "format" )?,
			format_range: optional_export( store, instance, "format_range" )?,
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
		let payload = serde_json::to_vec( &RawFormatConfig { plugin, global })?;
		self.channel.send( store, &payload )?;
		self.register_config.call( &mut *store, handle.id() )?;
		Ok(())
	}

	pub fn release_config( &self, store: &mut Store<HostState>, handle: ConfigHandle ) -> Result<(), PluginError> {
		self.release_config.call( &mut *store, handle.id() )?;
		Ok(())
	}

	pub fn plugin_info( &self, store: &mut Store<HostState> ) -> Result<PluginInfo, PluginError> {
		channel::decode_json( &fetch( store, &self.channel, &self.get_plugin_info, () )? )
	}

	pub fn license_text( &self, store: &mut Store<HostState> ) -> Result<String, PluginError> {
		channel::decode_string( fetch( store, &self.channel, &self.get_license_text, () )? )
	}

	pub fn resolved_config( &self, store: &mut Store<HostState>, handle: ConfigHandle ) -> Result<ConfigKeyMap, PluginError> {
		channel::decode_json( &fetch( store, &self.channel, &self.get_resolved_config, handle.id() )? )
	}

	pub fn config_diagnostics( &self, store: &mut Store<HostState>, handle: ConfigHandle ) -> Result<Vec<ConfigDiagnostic>, PluginError> {
		channel::decode_json( &fetch( store, &self.channel, &self.get_config_diagnostics, handle.id() )? )
	}

	pub fn file_matching_info( &self, store: &mut Store<HostState>, handle: ConfigHandle ) -> Result<FileMatchingInfo, PluginError> {
		channel::decode_json( &fetch( store, &self.channel, &self.get_config_file_matching, handle.id() )? )
	}

	pub fn format( &self, store: &mut Store<HostState>, handle: ConfigHandle, request: &FormatRequest ) -> Result<FormatOutcome, PluginError> {

		let range = match ( request.effective_range()?, &self.format_range ) {
			( None, _ ) => None,
			( Some( range ), Some( format_range )) => Some(( range, format_range )),
			( Some( _ ), None ) => {
				tracing::debug!( file_path = %request.file_path, "plugin cannot format a byte range; leaving text unchanged" );
				return Ok( FormatOutcome::Unchanged )
			}
		};

		self.channel.send( store, request.file_path.as_bytes() )?;
		self.set_file_path.call( &mut *store, () )?;

		if let Some( config ) = &request.override_config {
			self.channel.send( store, &serde_json::to_vec( config )? )?;
			self.set_override_config.call( &mut *store, () )?;
		}

		self.channel.send( store, &request.file_text )?;
		let code = match range {
			None => self.format.call( &mut *store, handle.id() )?,
			Some(( range, format_range )) => format_range.call( &mut *store, (
				handle.id(),
				channel::wasm_len( range.start )?,
				channel::wasm_len( range.end )?,
			))?,
		};
		self.response.read( store, &self.channel, code )

	}

}
