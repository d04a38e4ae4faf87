//! Configuration payloads exchanged with plugins.
//!
//! Configuration crosses the plugin boundary as compact JSON. The host only ever
//! understands the [`GlobalConfiguration`] keys shared by every plugin; plugin
//! specific keys travel as an opaque [`ConfigKeyMap`] that the plugin resolves
//! against its own defaults.

use serde::{ Deserialize, Serialize };



/// Plugin specific (or per-call override) configuration.
///
/// Keys are passed through to the plugin untouched.
pub type ConfigKeyMap = serde_json::Map<String, serde_json::Value> ;

/// Configuration keys shared by every plugin.
///
/// Unset keys are omitted when serialised so that plugins fall back to their own defaults.
///
/// ```
/// use wasm_format_host::GlobalConfiguration ;
///
/// let config = GlobalConfiguration::default().with_line_width( 100 );
/// assert_eq!( serde_json::to_string( &config ).unwrap(), r#"{"lineWidth":100}"# );
/// ```
#[derive( Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
pub struct GlobalConfiguration {
	#[serde( default, skip_serializing_if = "Option::is_none" )]
	pub line_width: Option<u32>,
	#[serde( default, skip_serializing_if = "Option::is_none" )]
	pub indent_width: Option<u8>,
	#[serde( default, skip_serializing_if = "Option::is_none" )]
	pub use_tabs: Option<bool>,
	#[serde( default, skip_serializing_if = "Option::is_none" )]
	pub new_line_kind: Option<NewLineKind>,
}

impl GlobalConfiguration {
	/// Sets the preferred maximum line width.
	pub fn with_line_width( mut self, line_width: u32 ) -> Self {
		self.line_width = Some( line_width );
		self
	}

	/// Sets the number of columns per indentation level.
	pub fn with_indent_width( mut self, indent_width: u8 ) -> Self {
		self.indent_width = Some( indent_width );
		self
	}

	/// Sets whether to indent with tabs.
	pub fn with_use_tabs( mut self, use_tabs: bool ) -> Self {
		self.use_tabs = Some( use_tabs );
		self
	}

	/// Sets the newline style.
	pub fn with_new_line_kind( mut self, new_line_kind: NewLineKind ) -> Self {
		self.new_line_kind = Some( new_line_kind );
		self
	}
}

/// Newline style shared across plugins.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize )]
#[serde( rename_all = "lowercase" )]
pub enum NewLineKind {
	/// Keep whatever the file predominantly uses.
	Auto,
	Lf,
	Crlf,
	/// The platform default.
	System,
}

/// A problem a plugin found in the configuration it was given.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
pub struct ConfigDiagnostic {
	pub property_name: String,
	pub message: String,
}

impl std::fmt::Display for ConfigDiagnostic {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result {
		write!( f, "{}: {}", self.property_name, self.message )
	}
}

/// The payload registered with generation 4 plugins.
#[derive( Serialize )]
pub(crate) struct RawFormatConfig<'a> {
	pub plugin: &'a ConfigKeyMap,
	pub global: &'a GlobalConfiguration,
}



#[cfg( test )]
mod tests {

	use super::* ;

	#[test]
	fn default_global_configuration_serialises_empty() {
		assert_eq!( serde_json::to_string( &GlobalConfiguration::default() ).unwrap(), "{}" );
	}

	#[test]
	fn global_configuration_uses_camel_case_keys() {
		let config = GlobalConfiguration::default()
			.with_indent_width( 4 )
			.with_use_tabs( true )
			.with_new_line_kind( NewLineKind::Crlf );
		let value = serde_json::to_value( &config ).unwrap();
		assert_eq!( value, serde_json::json!({ "indentWidth": 4, "useTabs": true, "newLineKind": "crlf" }));
	}

	#[test]
	fn raw_format_config_nests_both_halves() {
		let mut plugin = ConfigKeyMap::new();
		plugin.insert( "quoteStyle".to_string(), serde_json::Value::from( "single" ));
		let global = GlobalConfiguration::default().with_line_width( 80 );
		let value = serde_json::to_value( RawFormatConfig { plugin: &plugin, global: &global }).unwrap();
		assert_eq!( value, serde_json::json!({ "plugin": { "quoteStyle": "single" }, "global": { "lineWidth": 80 }}));
	}

	#[test]
	fn config_diagnostic_reads_camel_case() {
		let diagnostic: ConfigDiagnostic = serde_json::from_str( r#"{"propertyName":"lineWidth","message":"Expected a number"}"# ).unwrap();
		assert_eq!( diagnostic.to_string(), "lineWidth: Expected a number" );
	}

}
