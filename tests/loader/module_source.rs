use pretty_assertions::assert_eq ;
use wasm_format_host::{ load_formatter, AbiVersion, FormatOutcome, FormatRequest, LoadError, ModuleSource };
use crate::fixtures::{ self, ENGINE };

#[test]
fn module_source_from_owned_bytes() {
	let mut formatter = load_formatter( &ENGINE, fixtures::v4_upper( "upper", &[ "txt" ], &[] ).bytes() ).unwrap();
	assert_eq!( formatter.abi_version(), AbiVersion::V4 );
	assert_eq!( formatter.format_text( &FormatRequest::new( "a.txt", "abc" )).unwrap(), FormatOutcome::Changed( b"ABC".to_vec() ));
}

#[test]
fn module_source_from_borrowed_bytes() {
	let bytes = fixtures::v3_upper( 3, "upper", &[ "txt" ]).bytes();
	let formatter = load_formatter( &ENGINE, bytes.as_slice() ).unwrap();
	assert_eq!( formatter.abi_version(), AbiVersion::V3 );
}

#[test]
fn module_source_from_a_compiled_module() {
	let module = fixtures::v4_upper( "upper", &[ "txt" ], &[] ).compile();
	let mut formatter = load_formatter( &ENGINE, module.clone() ).unwrap();
	assert_eq!( formatter.plugin_info().unwrap().name, "upper" );
	// A module can back any number of independent instances.
	let mut other = load_formatter( &ENGINE, ModuleSource::Compiled( module )).unwrap();
	assert_eq!( other.plugin_info().unwrap().name, "upper" );
}

#[test]
fn module_source_invalid_bytes() {
	match load_formatter( &ENGINE, b"definitely not wasm".as_slice() ) {
		Err( LoadError::Compile( _ )) => {}
		Err( err ) => panic!( "Expected Compile error, found: {:#?}", err ),
		Ok( _ ) => panic!( "Expected Compile error, found a formatter" ),
	}
}
