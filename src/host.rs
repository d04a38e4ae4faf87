//! The host side of the plugin's imports.
//!
//! A plugin may call back into the host while it is inside its own `format` export,
//! asking for an embedded region to be formatted by someone else. The call is
//! reentrant on the same stack: the host decodes the request, runs the installed
//! [`HostFormatter`] to completion and stages the result for the plugin to collect,
//! all before the plugin's `format` returns.
//!
//! [`HostState`] is the data of the plugin's wasmtime store, so every plugin instance
//! owns its own staging buffer and callback.

use std::io::Write ;
use thiserror::Error ;
use wasmtime::{ Caller, Extern, Linker, Memory };

use crate::config::ConfigKeyMap ;
use crate::formatter::{ FormatOutcome, FormatRequest };
use crate::adapter::ResponseCode ;
use crate::channel::read_memory ;



/// Formats text on behalf of a plugin.
pub type HostFormatter = dyn FnMut( FormatRequest ) -> FormatOutcome + Send ;

const HOST_MODULE: &str = "dprint" ;
const WASI_MODULE: &str = "wasi_snapshot_preview1" ;

const STDOUT: u32 = 1 ;
const STDERR: u32 = 2 ;
const ERRNO_SUCCESS: u32 = 0 ;
const ERRNO_BADF: u32 = 8 ;
const ERRNO_IO: u32 = 29 ;

/// Failures inside an import; they surface to the plugin as a trap.
#[derive( Error, Debug )]
pub(crate) enum BridgeError {
	#[error( "Plugin exports no memory" )] MissingMemory,
	#[error( "Plugin referenced bytes outside the host's shared buffer" )] SharedBufferOutOfBounds,
	#[error( "Plugin referenced {len} bytes at {pointer}, outside its own memory" )] GuestMemoryOutOfBounds { pointer: u32, len: u32 },
	#[error( "Host result of {0} bytes does not fit the plugin's address space" )] PayloadTooLarge( usize ),
	#[error( "Plugin sent a file path that is not valid UTF-8" )] InvalidFilePath,
	#[error( "Plugin sent a malformed override configuration: {0}" )] InvalidOverrideConfig( serde_json::Error ),
}

/// Per-instance host state, stored as the data of the plugin's store.
pub struct HostState {
	shared: Vec<u8>,
	file_path: Option<String>,
	override_config: Option<ConfigKeyMap>,
	formatted_text: Vec<u8>,
	error_text: Vec<u8>,
	host_formatter: Option<Box<HostFormatter>>,
	output: Box<dyn Write + Send>,
}

impl Default for HostState {
	fn default() -> Self {
		Self {
			shared: Vec::new(),
			file_path: None,
			override_config: None,
			formatted_text: Vec::new(),
			error_text: Vec::new(),
			host_formatter: None,
			output: Box::new( std::io::stderr() ),
		}
	}
}

impl HostState {

	pub(crate) fn set_host_formatter( &mut self, formatter: Box<HostFormatter> ) {
		self.host_formatter = Some( formatter );
	}

	pub(crate) fn clear_host_formatter( &mut self ) {
		self.host_formatter = None ;
	}

	pub(crate) fn set_output( &mut self, output: Box<dyn Write + Send> ) {
		self.output = output ;
	}

	/// Runs the host formatter and stages its result, returning the response code.
	fn format( &mut self, request: FormatRequest ) -> u32 {
		tracing::trace!( file_path = %request.file_path, len = request.file_text.len(), "plugin requested host formatting" );
		let outcome = match self.host_formatter.as_mut() {
			Some( formatter ) => formatter( request ),
			None => FormatOutcome::Unchanged,
		};
		let code = match outcome {
			FormatOutcome::Unchanged => ResponseCode::NoChange,
			FormatOutcome::Changed( text ) => {
				self.formatted_text = text ;
				ResponseCode::Change
			}
			FormatOutcome::Failed( message ) => {
				self.error_text = message.into_bytes();
				ResponseCode::Failure
			}
		};
		code as u32
	}

	/// Moves staged text into the shared buffer for the plugin to copy out.
	fn stage( &mut self, text: Vec<u8> ) -> wasmtime::Result<u32> {
		let len = staged_len( text.len() ).map_err( wasmtime::Error::new )?;
		self.shared = text ;
		Ok( len )
	}

}

fn staged_len( len: usize ) -> Result<u32, BridgeError> {
	u32::try_from( len ).map_err(|_| BridgeError::PayloadTooLarge( len ))
}

fn guest_memory( caller: &mut Caller<'_, HostState> ) -> wasmtime::Result<Memory> {
	caller.get_export( "memory" )
		.and_then( Extern::into_memory )
		.ok_or_else(|| wasmtime::Error::new( BridgeError::MissingMemory ))
}

fn read_guest( caller: &mut Caller<'_, HostState>, pointer: u32, len: u32 ) -> wasmtime::Result<Vec<u8>> {
	let memory = guest_memory( caller )?;
	read_memory( &memory, &*caller, pointer, len )
		.ok_or_else(|| wasmtime::Error::new( BridgeError::GuestMemoryOutOfBounds { pointer, len }))
}

fn write_guest( caller: &mut Caller<'_, HostState>, pointer: u32, bytes: &[u8] ) -> wasmtime::Result<()> {
	let memory = guest_memory( caller )?;
	memory.write( &mut *caller, pointer as usize, bytes ).map_err( wasmtime::Error::new )
}

fn parse_file_path( bytes: Vec<u8> ) -> wasmtime::Result<String> {
	String::from_utf8( bytes ).map_err(|_| wasmtime::Error::new( BridgeError::InvalidFilePath ))
}

fn parse_override_config( bytes: &[u8] ) -> wasmtime::Result<Option<ConfigKeyMap>> {
	match bytes.is_empty() {
		true => Ok( None ),
		false => serde_json::from_slice( bytes )
			.map( Some )
			.map_err(| err | wasmtime::Error::new( BridgeError::InvalidOverrideConfig( err ))),
	}
}

/// Adds the imports generation 3 plugins expect.
///
/// Everything moves through the host's shared buffer, in chunks of the plugin's choosing.
pub(crate) fn add_v3_imports( linker: &mut Linker<HostState> ) -> wasmtime::Result<()> {

	linker.func_wrap( HOST_MODULE, "host_clear_bytes", | mut caller: Caller<'_, HostState>, len: u32 | {
		let shared = &mut caller.data_mut().shared ;
		shared.clear();
		shared.reserve( len as usize );
	})?;

	linker.func_wrap( HOST_MODULE, "host_read_buffer", | mut caller: Caller<'_, HostState>, pointer: u32, len: u32 | -> wasmtime::Result<()> {
		let chunk = read_guest( &mut caller, pointer, len )?;
		caller.data_mut().shared.extend_from_slice( &chunk );
		Ok(())
	})?;

	linker.func_wrap( HOST_MODULE, "host_write_buffer", | mut caller: Caller<'_, HostState>, pointer: u32, offset: u32, len: u32 | -> wasmtime::Result<()> {
		let start = offset as usize ;
		let chunk = caller.data().shared
			.get( start..start + len as usize )
			.ok_or_else(|| wasmtime::Error::new( BridgeError::SharedBufferOutOfBounds ))?
			.to_vec();
		write_guest( &mut caller, pointer, &chunk )
	})?;

	linker.func_wrap( HOST_MODULE, "host_take_file_path", | mut caller: Caller<'_, HostState> | -> wasmtime::Result<()> {
		let state = caller.data_mut();
		state.file_path = Some( parse_file_path( std::mem::take( &mut state.shared ))? );
		Ok(())
	})?;

	linker.func_wrap( HOST_MODULE, "host_take_override_config", | mut caller: Caller<'_, HostState> | -> wasmtime::Result<()> {
		let state = caller.data_mut();
		state.override_config = parse_override_config( &std::mem::take( &mut state.shared ))?;
		Ok(())
	})?;

	linker.func_wrap( HOST_MODULE, "host_format", | mut caller: Caller<'_, HostState> | -> u32 {
		let state = caller.data_mut();
		let request = FormatRequest {
			file_path: state.file_path.take().unwrap_or_default(),
			file_text: std::mem::take( &mut state.shared ),
			byte_range: None,
			override_config: state.override_config.take(),
		};
		state.format( request )
	})?;

	add_shared_imports( linker )

}

/// Adds the imports generation 4 plugins expect.
///
/// Requests are read straight out of guest memory; results are staged in the host's
/// shared buffer and written to a guest pointer in one go.
pub(crate) fn add_v4_imports( linker: &mut Linker<HostState> ) -> wasmtime::Result<()> {

	linker.func_wrap( HOST_MODULE, "host_write_buffer", | mut caller: Caller<'_, HostState>, pointer: u32 | -> wasmtime::Result<()> {
		let bytes = std::mem::take( &mut caller.data_mut().shared );
		write_guest( &mut caller, pointer, &bytes )
	})?;

	linker.func_wrap( HOST_MODULE, "host_format", | mut caller: Caller<'_, HostState>,
		file_path_ptr: u32, file_path_len: u32,
		range_start: u32, range_end: u32,
		override_config_ptr: u32, override_config_len: u32,
		file_text_ptr: u32, file_text_len: u32,
	| -> wasmtime::Result<u32> {
		let file_path = parse_file_path( read_guest( &mut caller, file_path_ptr, file_path_len )? )?;
		let override_config = parse_override_config( &read_guest( &mut caller, override_config_ptr, override_config_len )? )?;
		let file_text = read_guest( &mut caller, file_text_ptr, file_text_len )?;
		let byte_range = match range_start == 0 && range_end == file_text_len {
			true => None,
			false => Some( range_start as usize..range_end as usize ),
		};
		let request = FormatRequest { file_path, file_text, byte_range, override_config };
		Ok( caller.data_mut().format( request ))
	})?;

	linker.func_wrap( WASI_MODULE, "fd_write", | mut caller: Caller<'_, HostState>, fd: u32, iovs: u32, iovs_len: u32, nwritten: u32 | -> wasmtime::Result<u32> {

		if fd != STDOUT && fd != STDERR { return Ok( ERRNO_BADF )}

		let mut written = 0u32 ;
		for index in 0..iovs_len {
			let iov = read_guest( &mut caller, iovs.wrapping_add( index.wrapping_mul( 8 )), 8 )?;
			let pointer = u32::from_le_bytes([ iov[0], iov[1], iov[2], iov[3] ]);
			let len = u32::from_le_bytes([ iov[4], iov[5], iov[6], iov[7] ]);
			let bytes = read_guest( &mut caller, pointer, len )?;
			if caller.data_mut().output.write_all( &bytes ).is_err() { return Ok( ERRNO_IO )}
			written = written.saturating_add( len );
		}
		if caller.data_mut().output.flush().is_err() { return Ok( ERRNO_IO )}

		write_guest( &mut caller, nwritten, &written.to_le_bytes() )?;
		Ok( ERRNO_SUCCESS )

	})?;

	add_shared_imports( linker )

}

fn add_shared_imports( linker: &mut Linker<HostState> ) -> wasmtime::Result<()> {

	linker.func_wrap( HOST_MODULE, "host_get_formatted_text", | mut caller: Caller<'_, HostState> | -> wasmtime::Result<u32> {
		let state = caller.data_mut();
		let text = std::mem::take( &mut state.formatted_text );
		state.stage( text )
	})?;

	linker.func_wrap( HOST_MODULE, "host_get_error_text", | mut caller: Caller<'_, HostState> | -> wasmtime::Result<u32> {
		let state = caller.data_mut();
		let text = std::mem::take( &mut state.error_text );
		state.stage( text )
	})?;

	// No cancellation channel exists; plugins always run to completion.
	linker.func_wrap( HOST_MODULE, "host_has_cancelled", || -> u32 { 0 })?;

	Ok(())

}



#[cfg( test )]
mod tests {

	use super::* ;

	#[test]
	fn staged_lengths_fit_the_guest() {
		assert_eq!( staged_len( 0 ).unwrap(), 0 );
		assert_eq!( staged_len( u32::MAX as usize ).unwrap(), u32::MAX );
	}

	#[test]
	#[cfg( target_pointer_width = "64" )]
	fn oversized_host_results_are_refused() {
		match staged_len( u32::MAX as usize + 1 ) {
			Err( BridgeError::PayloadTooLarge( len )) => assert_eq!( len, u32::MAX as usize + 1 ),
			value => panic!( "Expected PayloadTooLarge error, found: {:#?}", value ),
		}
	}

	#[test]
	fn output_flush_failures_are_reported() {
		struct Broken ;
		impl Write for Broken {
			fn write( &mut self, buf: &[u8] ) -> std::io::Result<usize> { Ok( buf.len() )}
			fn flush( &mut self ) -> std::io::Result<()> { Err( std::io::Error::other( "closed" ))}
		}

		let engine = wasmtime::Engine::default();
		let module = wasmtime::Module::new( &engine, r#"(module
			(import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
			(memory (export "memory") 1)
			(data (i32.const 100) "hi")
			(func (export "say") (result i32)
				(i32.store (i32.const 0) (i32.const 100))
				(i32.store (i32.const 4) (i32.const 2))
				(call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))
		)"# ).unwrap();

		let mut linker = Linker::new( &engine );
		add_v4_imports( &mut linker ).unwrap();
		let mut state = HostState::default();
		state.set_output( Box::new( Broken ));
		let mut store = wasmtime::Store::new( &engine, state );
		let instance = linker.instantiate( &mut store, &module ).unwrap();
		let say = instance.get_typed_func::<(), u32>( &mut store, "say" ).unwrap();

		assert_eq!( say.call( &mut store, () ).unwrap(), ERRNO_IO );
	}

}
