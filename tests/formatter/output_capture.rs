use pretty_assertions::assert_eq ;
use wasm_format_host::{ FormatOutcome, FormatRequest };
use crate::fixtures::{ self, SharedSink };

#[test]
fn output_capture_redirects_plugin_writes() {

	let mut formatter = fixtures::v4_upper( "upper", &[ "txt" ], &[] ).formatter();
	let sink = SharedSink::default();
	formatter.set_output_sink( sink.clone() );

	assert_eq!( formatter.format_text( &FormatRequest::new( "a.txt", "hi!" )).unwrap(), FormatOutcome::Changed( b"HI!".to_vec() ));
	assert_eq!( formatter.format_text( &FormatRequest::new( "a.txt", "again!" )).unwrap(), FormatOutcome::Changed( b"AGAIN!".to_vec() ));
	assert_eq!( sink.contents(), "plugin says hi\nplugin says hi\n" );

}

#[test]
fn output_capture_stays_quiet_without_writes() {

	let mut formatter = fixtures::v4_upper( "upper", &[ "txt" ], &[] ).formatter();
	let sink = SharedSink::default();
	formatter.set_output_sink( sink.clone() );

	formatter.format_text( &FormatRequest::new( "a.txt", "quiet" )).expect( "Failed to format" );
	assert_eq!( sink.contents(), "" );

}
