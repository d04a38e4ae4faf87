use wasm_format_host::{ AbiVersion, Formatter, LoadError, NegotiationError };
use crate::fixtures::{ self, ENGINE };

#[test]
fn schema_negotiation_accepts_legacy_and_current() {
	for schema_version in [ 2, 3 ] {
		let formatter = fixtures::v3_upper( schema_version, "upper", &[ "txt" ]).formatter();
		assert_eq!( formatter.abi_version(), AbiVersion::V3 );
	}
}

#[test]
fn schema_negotiation_rejects_too_old() {
	let module = fixtures::v3_upper( 1, "upper", &[ "txt" ]).compile();
	match Formatter::new( &ENGINE, &module ) {
		Err( LoadError::Negotiation( NegotiationError::TooOld( 1 ))) => {}
		value => panic!( "Expected TooOld error, found: {:#?}", value ),
	}
}

#[test]
fn schema_negotiation_rejects_too_new() {
	let module = fixtures::v3_upper( 4, "upper", &[ "txt" ]).compile();
	match Formatter::new( &ENGINE, &module ) {
		Err( LoadError::Negotiation( NegotiationError::TooNew( 4 ))) => {}
		value => panic!( "Expected TooNew error, found: {:#?}", value ),
	}
}
