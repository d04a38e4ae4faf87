use pretty_assertions::assert_eq ;
use wasm_format_host::{ ConfigKeyMap, Context, FormatOutcome, FormatRequest, GlobalConfiguration };
use crate::fixtures::{ self, ENGINE };

#[test]
fn delegation_formats_an_embedded_block_with_another_plugin() {

	let context = Context::new( &ENGINE, GlobalConfiguration::default() );
	context.add_plugin( fixtures::v4_markdown( "markdown", &[ "md" ]).bytes(), ConfigKeyMap::new() ).unwrap();
	context.add_plugin( fixtures::v4_upper( "json", &[ "json" ], &[] ).bytes(), ConfigKeyMap::new() ).unwrap();

	let text = "# notes\n```json\n{\"key\": true}\n```\nthe end\n";
	match context.format_text( &FormatRequest::new( "file.md", text )) {
		Ok( FormatOutcome::Changed( formatted )) => assert_eq!(
			String::from_utf8( formatted ).unwrap(),
			"# NOTES\n```json\n{\"KEY\": TRUE}\n```\nTHE END\n",
		),
		value => panic!( "Expected Changed, found: {:#?}", value ),
	}

}

#[test]
fn delegation_crosses_abi_generations() {

	let context = Context::new( &ENGINE, GlobalConfiguration::default() );
	context.add_plugin( fixtures::v4_markdown( "markdown", &[ "md" ]).bytes(), ConfigKeyMap::new() ).unwrap();
	context.add_plugin( fixtures::v3_upper( 3, "text", &[ "txt" ]).bytes(), ConfigKeyMap::new() ).unwrap();

	let text = "intro\n```txt\nplain words\n```\n";
	assert_eq!(
		context.format_text( &FormatRequest::new( "file.md", text )).unwrap(),
		FormatOutcome::Changed( b"INTRO\n```txt\nPLAIN WORDS\n```\n".to_vec() ),
	);

}

#[test]
fn delegation_never_targets_the_caller() {

	// The only plugin for the embedded file is the caller itself.
	let context = Context::new( &ENGINE, GlobalConfiguration::default() );
	context.add_plugin( fixtures::v3_upper( 3, "text", &[ "txt" ]).bytes(), ConfigKeyMap::new() ).unwrap();

	assert_eq!( context.format_text( &FormatRequest::new( "a.txt", ">embedded" )).unwrap(), FormatOutcome::Unchanged );

}

#[test]
fn delegation_without_a_matching_plugin_is_unchanged() {

	let context = Context::new( &ENGINE, GlobalConfiguration::default() );
	context.add_plugin( fixtures::v4_markdown( "markdown", &[ "md" ]).bytes(), ConfigKeyMap::new() ).unwrap();

	let text = "intro\n```rust\nfn main() {}\n```\n";
	assert_eq!(
		context.format_text( &FormatRequest::new( "file.md", text )).unwrap(),
		FormatOutcome::Changed( b"INTRO\n```rust\nfn main() {}\n```\n".to_vec() ),
	);

}

#[test]
fn delegation_cycle_is_rejected() {

	// first -> second -> first: the second hop finds the first plugin busy.
	let context = Context::new( &ENGINE, GlobalConfiguration::default() );
	context.add_plugin( fixtures::v3_upper( 3, "first", &[ "txt" ]).bytes(), ConfigKeyMap::new() ).unwrap();
	context.add_plugin( fixtures::v3_upper( 3, "second", &[ "txt" ]).bytes(), ConfigKeyMap::new() ).unwrap();

	match context.format_text( &FormatRequest::new( "a.txt", ">>loop" )) {
		Ok( FormatOutcome::Failed( message )) => assert!( message.contains( "plugin 'first' is already formatting" ), "{}", message ),
		value => panic!( "Expected Failed, found: {:#?}", value ),
	}

	// Both plugins are free again afterwards.
	assert_eq!(
		context.format_text( &FormatRequest::new( "a.txt", "calm" )).unwrap(),
		FormatOutcome::Changed( b"CALM".to_vec() ),
	);

}
