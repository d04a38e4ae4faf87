//! Byte transfer across the host/guest memory boundary.
//!
//! Two protocols exist in the wild:
//!
//! - [`StagedChannel`]: the guest exposes a small scratch buffer and moves bytes between
//! 	it and its own shared byte store on request. Transfers are chunked by the buffer
//! 	size the guest reports, however large its memory actually is.
//! - [`DirectChannel`]: the guest hands out a pointer to a region sized for the whole
//! 	payload, which the host fills or drains in one copy.
//!
//! Guest pointers are re-queried for every transfer; a later clear may move them.

use pipe_trait::Pipe ;
use serde::de::DeserializeOwned ;
use wasmtime::{ Memory, Store, StoreContext, TypedFunc };

use crate::formatter::PluginError ;
use crate::host::HostState ;



/// Converts a host length into the guest's 32-bit representation.
pub(crate) fn wasm_len( len: usize ) -> Result<u32, PluginError> {
	u32::try_from( len ).map_err(|_| PluginError::PayloadTooLarge( len ))
}

/// Copies `len` bytes at `pointer` out of guest memory.
///
/// Bounds are checked against the memory's current size before anything is allocated, so
/// a bogus length from the guest never turns into a host allocation.
pub(crate) fn read_memory<'a, T: 'static>( memory: &Memory, store: impl Into<StoreContext<'a, T>>, pointer: u32, len: u32 ) -> Option<Vec<u8>> {
	let start = pointer as usize ;
	let end = start.checked_add( len as usize )?;
	memory.data( store ).get( start..end ).map( <[u8]>::to_vec )
}

pub(crate) fn decode_string( bytes: Vec<u8> ) -> Result<String, PluginError> {
	Ok( bytes.pipe( String::from_utf8 )? )
}

pub(crate) fn decode_json<T: DeserializeOwned>( bytes: &[u8] ) -> Result<T, PluginError> {
	Ok( serde_json::from_slice( bytes )? )
}

/// Moves whole payloads between host and guest.
pub(crate) trait ByteChannel {
	/// Stages `bytes` as the guest's shared bytes.
	fn send( &self, store: &mut Store<HostState>, bytes: &[u8] ) -> Result<(), PluginError> ;
	/// Copies `len` bytes the guest staged for the host.
	fn receive( &self, store: &mut Store<HostState>, len: u32 ) -> Result<Vec<u8>, PluginError> ;
}

/// Chunked transfers through a bounded guest scratch buffer.
pub(crate) struct StagedChannel {
	pub memory: Memory,
	pub buffer_ptr: TypedFunc<(), u32>,
	pub buffer_size: TypedFunc<(), u32>,
	pub clear_shared_bytes: TypedFunc<u32, ()>,
	pub add_to_shared_bytes_from_buffer: TypedFunc<u32, ()>,
	pub set_buffer_with_shared_bytes: TypedFunc<( u32, u32 ), ()>,
}

impl ByteChannel for StagedChannel {

	fn send( &self, store: &mut Store<HostState>, bytes: &[u8] ) -> Result<(), PluginError> {

		self.clear_shared_bytes.call( &mut *store, wasm_len( bytes.len() )? )?;
		let ( buffer, chunk_size ) = self.buffer( store )?;
		tracing::trace!( len = bytes.len(), chunk_size, "sending staged bytes" );

		for chunk in bytes.chunks( chunk_size ) {
			self.memory.write( &mut *store, buffer, chunk )?;
			self.add_to_shared_bytes_from_buffer.call( &mut *store, wasm_len( chunk.len() )? )?;
		}

		Ok(())

	}

	fn receive( &self, store: &mut Store<HostState>, len: u32 ) -> Result<Vec<u8>, PluginError> {

		let len = len as usize ;
		let ( buffer, chunk_size ) = self.buffer( store )?;
		tracing::trace!( len, chunk_size, "receiving staged bytes" );

		let mut bytes = Vec::new();
		while bytes.len() < len {
			let chunk_len = wasm_len( chunk_size.min( len - bytes.len() ))?;
			self.set_buffer_with_shared_bytes.call( &mut *store, ( wasm_len( bytes.len() )?, chunk_len ))?;
			let pointer = wasm_len( buffer )?;
			let chunk = read_memory( &self.memory, &*store, pointer, chunk_len )
				.ok_or( PluginError::GuestMemoryOutOfBounds { pointer, len: chunk_len })?;
			bytes.extend_from_slice( &chunk );
		}

		Ok( bytes )

	}

}

impl StagedChannel {
	fn buffer( &self, store: &mut Store<HostState> ) -> Result<( usize, usize ), PluginError> {
		let pointer = self.buffer_ptr.call( &mut *store, () )? as usize ;
		let size = self.buffer_size.call( &mut *store, () )? as usize ;
		match size {
			0 => Err( PluginError::EmptyStagingBuffer ),
			size => Ok(( pointer, size )),
		}
	}
}

/// Single copy transfers into a guest allocated region.
pub(crate) struct DirectChannel {
	pub memory: Memory,
	pub clear_shared_bytes: TypedFunc<u32, u32>,
	pub get_shared_bytes_ptr: TypedFunc<(), u32>,
}

impl ByteChannel for DirectChannel {

	fn send( &self, store: &mut Store<HostState>, bytes: &[u8] ) -> Result<(), PluginError> {
		let pointer = self.clear_shared_bytes.call( &mut *store, wasm_len( bytes.len() )? )?;
		tracing::trace!( len = bytes.len(), pointer, "sending direct bytes" );
		self.memory.write( &mut *store, pointer as usize, bytes )?;
		Ok(())
	}

	fn receive( &self, store: &mut Store<HostState>, len: u32 ) -> Result<Vec<u8>, PluginError> {
		let pointer = self.get_shared_bytes_ptr.call( &mut *store, () )?;
		tracing::trace!( len, pointer, "receiving direct bytes" );
		read_memory( &self.memory, &*store, pointer, len ).ok_or( PluginError::GuestMemoryOutOfBounds { pointer, len })
	}

}



#[cfg( test )]
mod tests {

	use super::* ;

	#[test]
	fn lengths_beyond_the_guest_address_space_are_rejected() {
		assert_eq!( wasm_len( 42 ).unwrap(), 42 );
		assert_eq!( wasm_len( u32::MAX as usize ).unwrap(), u32::MAX );
		#[cfg( target_pointer_width = "64" )]
		assert!( matches!( wasm_len( u32::MAX as usize + 1 ), Err( PluginError::PayloadTooLarge( len )) if len == u32::MAX as usize + 1 ));
	}

	#[test]
	fn reads_outside_guest_memory_are_rejected() {
		let engine = wasmtime::Engine::default();
		let mut store = Store::new( &engine, HostState::default() );
		let memory = Memory::new( &mut store, wasmtime::MemoryType::new( 1, None )).unwrap();
		memory.write( &mut store, 10, b"abc" ).unwrap();

		assert_eq!( read_memory( &memory, &store, 10, 3 ), Some( b"abc".to_vec() ));
		assert_eq!( read_memory( &memory, &store, 65535, 1 ), Some( vec![ 0 ]));
		assert_eq!( read_memory( &memory, &store, 65535, 2 ), None );
		assert_eq!( read_memory( &memory, &store, 0, u32::MAX ), None );
		assert_eq!( read_memory( &memory, &store, u32::MAX, u32::MAX ), None );
	}

}
