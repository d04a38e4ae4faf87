use wasm_format_host::{ FormatRequest, Formatter, LoadError, Module, PluginError };
use crate::fixtures::{ self, ENGINE };

fn load( wat: &str ) -> Result<Formatter, LoadError> {
	let module = Module::new( &ENGINE, wat ).expect( "Failed to compile module" );
	Formatter::new( &ENGINE, &module )
}

#[test]
fn missing_exports_memory() {
	match load( r#"(module (func (export "dprint_plugin_version_4")))"# ) {
		Err( LoadError::Plugin( PluginError::MissingMemory )) => {}
		value => panic!( "Expected MissingMemory error, found: {:#?}", value ),
	}
}

#[test]
fn missing_exports_required_function() {
	let wat = r#"(module
		(memory (export "memory") 1)
		(func (export "dprint_plugin_version_4"))
		(func (export "clear_shared_bytes") (param i32) (result i32) (i32.const 0))
		(func (export "get_shared_bytes_ptr") (result i32) (i32.const 0))
	)"#;
	match load( wat ) {
		Err( LoadError::Plugin( PluginError::MissingExport( name ))) if name == "register_config" => {}
		value => panic!( "Expected MissingExport error, found: {:#?}", value ),
	}
}

#[test]
fn missing_exports_signature_mismatch() {
	let wat = r#"(module
		(memory (export "memory") 1)
		(func (export "dprint_plugin_version_4"))
		(func (export "clear_shared_bytes") (param i32))
	)"#;
	match load( wat ) {
		Err( LoadError::Plugin( PluginError::ExportSignature { name, .. })) if name == "clear_shared_bytes" => {}
		value => panic!( "Expected ExportSignature error, found: {:#?}", value ),
	}
}

#[test]
fn missing_exports_legacy_schema_function() {
	let wat = r#"(module
		(memory (export "memory") 1)
		(func (export "get_plugin_schema_version") (result i32) (i32.const 3))
	)"#;
	match load( wat ) {
		Err( LoadError::Plugin( PluginError::MissingExport( name ))) if name == "get_wasm_memory_buffer" => {}
		value => panic!( "Expected MissingExport error, found: {:#?}", value ),
	}
}

#[test]
fn missing_exports_empty_staging_buffer() {
	let mut formatter = fixtures::v3_upper_with_buffer_size( 3, "upper", &[ "txt" ], 0 ).formatter();
	match formatter.format_text( &FormatRequest::new( "a.txt", "abc" )) {
		Err( PluginError::EmptyStagingBuffer ) => {}
		value => panic!( "Expected EmptyStagingBuffer error, found: {:#?}", value ),
	}
}
