use pretty_assertions::assert_eq ;
use wasm_format_host::{ ConfigHandle, ConfigKeyMap, FormatOutcome, FormatRequest, GlobalConfiguration, PluginError };
use crate::fixtures ;

#[test]
fn legacy_channel_moves_text_in_bounded_chunks() {

	// The staging buffer is eight bytes; any larger chunk traps.
	let mut formatter = fixtures::v3_upper( 3, "upper", &[ "txt" ]).formatter();
	let request = FormatRequest::new( "notes/long.txt", "hello, staged world with more than eight bytes" );

	match formatter.format_text( &request ) {
		Ok( FormatOutcome::Changed( text )) => assert_eq!( String::from_utf8( text ).unwrap(), "HELLO, STAGED WORLD WITH MORE THAN EIGHT BYTES" ),
		value => panic!( "Expected Changed, found: {:#?}", value ),
	}

}

#[test]
fn legacy_channel_unchanged_hands_back_the_original() {

	let mut formatter = fixtures::v3_upper( 3, "upper", &[ "txt" ]).formatter();
	let original = b"ALREADY UPPER, 123".to_vec();
	let pointer = original.as_ptr();

	let outcome = formatter.format_text( &FormatRequest::new( "a.txt", original.clone() )).expect( "Failed to format" );
	assert_eq!( outcome, FormatOutcome::Unchanged );

	let text = outcome.into_text( original ).expect( "Expected text" );
	assert_eq!( text.as_ptr(), pointer );

}

#[test]
fn legacy_channel_formatting_is_idempotent() {

	let mut formatter = fixtures::v3_upper( 3, "upper", &[ "txt" ]).formatter();

	let first = match formatter.format_text( &FormatRequest::new( "a.txt", "Mixed Case" )) {
		Ok( FormatOutcome::Changed( text )) => text,
		value => panic!( "Expected Changed, found: {:#?}", value ),
	};
	assert_eq!( formatter.format_text( &FormatRequest::new( "a.txt", first )).unwrap(), FormatOutcome::Unchanged );

}

#[test]
fn legacy_channel_reads_plugin_information() {

	let mut formatter = fixtures::v3_upper( 3, "upper", &[ "txt", "text" ]).formatter();

	let info = formatter.plugin_info().expect( "Failed to read plugin info" );
	assert_eq!( info.name, "upper" );
	assert_eq!( info.config_key, "upper" );
	assert_eq!( info.update_url, None );

	let file_matching = formatter.file_matching_info().expect( "Failed to read file matching" );
	assert_eq!( file_matching.file_extensions, vec![ "txt".to_string(), "text".to_string() ]);
	assert!( file_matching.file_names.is_empty() );

	assert_eq!( formatter.license_text().unwrap(), "MIT License" );
	assert!( formatter.config_diagnostics().unwrap().is_empty() );

}

#[test]
fn legacy_channel_only_knows_the_default_handle() {

	let mut formatter = fixtures::v3_upper( 3, "upper", &[ "txt" ]).formatter();
	let handle = ConfigHandle::new( 2 );

	match formatter.register_config( handle, &GlobalConfiguration::default(), &ConfigKeyMap::new() ) {
		Err( PluginError::UnsupportedConfigHandle( rejected )) if rejected == handle => {}
		value => panic!( "Expected UnsupportedConfigHandle error, found: {:#?}", value ),
	}

	match formatter.format_text_with( handle, &FormatRequest::new( "a.txt", "text" )) {
		Err( PluginError::UnregisteredConfigHandle( rejected )) if rejected == handle => {}
		value => panic!( "Expected UnregisteredConfigHandle error, found: {:#?}", value ),
	}

}
