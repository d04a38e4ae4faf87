use pretty_assertions::assert_eq ;
use serde_json::json ;
use wasm_format_host::{ ConfigKeyMap, Context, ContextError, FormatOutcome, FormatRequest, GlobalConfiguration };
use crate::fixtures::{ self, config, ENGINE };

#[test]
fn handles_expose_what_was_registered() {

	let context = Context::new( &ENGINE, GlobalConfiguration::default().with_line_width( 90 ));
	let plugin_config = config( json!({ "trailingCommas": "never" }));
	let handle = context.add_plugin( fixtures::v4_upper( "json", &[ "json" ], &[] ).bytes(), plugin_config.clone() ).unwrap();

	assert_eq!( handle.info().unwrap().name, "json" );
	assert_eq!( handle.plugin_config().unwrap(), plugin_config );
	assert_eq!( handle.license_text().unwrap(), "MIT License" );
	assert_eq!(
		handle.resolved_config().unwrap(),
		config( json!({ "plugin": { "trailingCommas": "never" }, "global": { "lineWidth": 90 }})),
	);

}

#[test]
fn handles_format_regardless_of_path() {

	let context = Context::new( &ENGINE, GlobalConfiguration::default() );
	let handle = context.add_plugin( fixtures::v4_upper( "json", &[ "json" ], &[] ).bytes(), ConfigKeyMap::new() ).unwrap();

	assert_eq!(
		handle.format_text( &FormatRequest::new( "notes.txt", "direct" )).unwrap(),
		FormatOutcome::Changed( b"DIRECT".to_vec() ),
	);

}

#[test]
fn handles_list_plugins_in_registration_order() {

	let context = Context::new( &ENGINE, GlobalConfiguration::default() );
	context.add_plugin( fixtures::v4_upper( "first", &[ "a" ], &[] ).bytes(), ConfigKeyMap::new() ).unwrap();
	context.add_plugin( fixtures::v3_upper( 3, "second", &[ "b" ]).bytes(), ConfigKeyMap::new() ).unwrap();

	let names = context.plugins().unwrap().iter()
		.map(| handle | handle.info().unwrap().name )
		.collect::<Vec<_>>();
	assert_eq!( names, vec![ "first".to_string(), "second".to_string() ]);

}

#[test]
fn handles_outliving_the_context() {

	let context = Context::new( &ENGINE, GlobalConfiguration::default() );
	let handle = context.add_plugin( fixtures::v4_upper( "json", &[ "json" ], &[] ).bytes(), ConfigKeyMap::new() ).unwrap();
	drop( context );

	match handle.format_text( &FormatRequest::new( "a.json", "{}" )) {
		Err( ContextError::ContextDropped ) => {}
		value => panic!( "Expected ContextDropped error, found: {:#?}", value ),
	}

}
