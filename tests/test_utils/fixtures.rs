#[allow( dead_code )]
mod fixtures {

	use std::io::Write ;
	use std::path::PathBuf ;
	use std::sync::{ Arc, Mutex };
	use once_cell::sync::Lazy ;
	use serde_json::json ;
	use wasm_format_host::{ ConfigKeyMap, Engine, Formatter, Module };

	pub static ENGINE: Lazy<Engine> = Lazy::new( Engine::default );

	/// A WebAssembly text fixture with its `__KEY__` placeholders still open.
	pub struct Template( String );

	impl Template {

		pub fn load( name: &str ) -> Self {
			let path = PathBuf::from( env!( "CARGO_MANIFEST_DIR" )).join( "tests" ).join( "fixtures" ).join( format!( "{}.wat", name ));
			Self( std::fs::read_to_string( &path ).unwrap_or_else(| err | panic!( "Failed to read fixture {}: {}", path.display(), err )))
		}

		/// Substitutes `__KEY__` with a plain value.
		pub fn set( mut self, key: &str, value: impl ToString ) -> Self {
			self.0 = self.0.replace( &format!( "__{}__", key ), &value.to_string() );
			self
		}

		/// Substitutes `__KEY__` with `payload` as a data string and `__KEY_LEN__` with its length in bytes.
		pub fn embed( mut self, key: &str, payload: &str ) -> Self {
			let escaped = payload.replace( '\\', "\\\\" ).replace( '"', "\\\"" );
			self.0 = self.0
				.replace( &format!( "__{}_LEN__", key ), &payload.len().to_string() )
				.replace( &format!( "__{}__", key ), &escaped );
			self
		}

		pub fn bytes( self ) -> Vec<u8> { self.0.into_bytes() }

		pub fn compile( self ) -> Module {
			Module::new( &ENGINE, self.0 ).expect( "Failed to compile fixture" )
		}

		pub fn formatter( self ) -> Formatter {
			Formatter::new( &ENGINE, &self.compile() ).expect( "Failed to instantiate fixture" )
		}

	}

	pub fn plugin_info( name: &str, extensions: &[&str], file_names: &[&str] ) -> String {
		json!({
			"name": name,
			"version": "0.1.0",
			"configKey": name,
			"helpUrl": format!( "https://example.com/{}", name ),
			"configSchemaUrl": format!( "https://example.com/{}/schema.json", name ),
			"fileExtensions": extensions,
			"fileNames": file_names,
		}).to_string()
	}

	pub fn file_matching( extensions: &[&str], file_names: &[&str] ) -> String {
		json!({ "fileExtensions": extensions, "fileNames": file_names }).to_string()
	}

	pub fn v3_upper( schema_version: u32, name: &str, extensions: &[&str] ) -> Template {
		v3_upper_with_buffer_size( schema_version, name, extensions, 8 )
	}

	pub fn v3_upper_with_buffer_size( schema_version: u32, name: &str, extensions: &[&str], buffer_size: u32 ) -> Template {
		Template::load( "v3_upper" )
			.set( "SCHEMA_VERSION", schema_version )
			.set( "BUFFER_SIZE", buffer_size )
			.embed( "PLUGIN_INFO", &plugin_info( name, extensions, &[] ))
	}

	pub fn v4_upper( name: &str, extensions: &[&str], file_names: &[&str] ) -> Template {
		v4_upper_with_diagnostics( name, extensions, file_names, "[]" )
	}

	pub fn v4_upper_with_diagnostics( name: &str, extensions: &[&str], file_names: &[&str], diagnostics: &str ) -> Template {
		Template::load( "v4_upper" )
			.embed( "PLUGIN_INFO", &plugin_info( name, extensions, file_names ))
			.embed( "FILE_MATCHING", &file_matching( extensions, file_names ))
			.embed( "DIAGNOSTICS", diagnostics )
	}

	pub fn v4_markdown( name: &str, extensions: &[&str] ) -> Template {
		Template::load( "v4_markdown" )
			.embed( "PLUGIN_INFO", &plugin_info( name, extensions, &[] ))
			.embed( "FILE_MATCHING", &file_matching( extensions, &[] ))
			.embed( "DIAGNOSTICS", "[]" )
	}

	pub fn diagnostics( entries: &[( &str, &str )] ) -> String {
		serde_json::Value::Array( entries.iter()
			.map(|( property_name, message )| json!({ "propertyName": property_name, "message": message }))
			.collect()
		).to_string()
	}

	pub fn config( value: serde_json::Value ) -> ConfigKeyMap {
		match value {
			serde_json::Value::Object( map ) => map,
			value => panic!( "Expected a JSON object, found: {}", value ),
		}
	}

	/// An output sink tests can read back.
	#[derive( Clone, Default )]
	pub struct SharedSink( Arc<Mutex<Vec<u8>>> );

	impl SharedSink {
		pub fn contents( &self ) -> String {
			String::from_utf8( self.0.lock().expect( "Sink poisoned" ).clone() ).expect( "Sink holds invalid UTF-8" )
		}
	}

	impl Write for SharedSink {
		fn write( &mut self, buf: &[u8] ) -> std::io::Result<usize> {
			self.0.lock().expect( "Sink poisoned" ).extend_from_slice( buf );
			Ok( buf.len() )
		}
		fn flush( &mut self ) -> std::io::Result<()> { Ok(()) }
	}

}
