//! Several plugins cooperating behind one router.
//!
//! A [`Context`] owns every plugin added to it and picks one per file, by exact file
//! name first and extension second. Each plugin's host formatter is wired to the rest
//! of the context, so a plugin can hand an embedded region to whichever *other* plugin
//! handles it.
//!
//! A plugin that is already executing is never entered again. A delegation cycle that
//! would do so is answered with a failure instead of a deadlock.

use std::sync::{ Arc, Mutex, MutexGuard, RwLock, TryLockError, Weak };
use itertools::Itertools ;
use thiserror::Error ;
use wasmtime::Engine ;

use crate::config::{ ConfigDiagnostic, ConfigKeyMap, GlobalConfiguration };
use crate::formatter::{ FileMatchingInfo, FormatOutcome, FormatRequest, Formatter, PluginError, PluginInfo };
use crate::loader::{ load_formatter, LoadError, ModuleSource };



type PluginList = RwLock<Vec<Arc<RegisteredPlugin>>> ;

/// Errors raised while routing work to registered plugins.
#[derive( Error, Debug )]
pub enum ContextError {
	/// No registered plugin claims the file.
	#[error( "No plugin formats '{file_path}'. Registered plugins: {registered}" )]
	NoMatchingPlugin { file_path: String, registered: String },
	#[error( "{0}" )] Plugin( #[from] PluginError ),
	#[error( "{0}" )] Load( #[from] LoadError ),
	/// The plugin is already executing further up the call stack.
	#[error( "Lock Rejected: plugin '{0}' is already formatting" )] LockRejected( String ),
	/// The handle outlived the context that owned its plugin.
	#[error( "Context Dropped" )] ContextDropped,
	/// A plugin call panicked while holding a lock.
	#[error( "Lock Poisoned" )] Poisoned,
}

struct RegisteredPlugin {
	index: usize,
	info: PluginInfo,
	file_matching: FileMatchingInfo,
	plugin_config: ConfigKeyMap,
	formatter: Mutex<Formatter>,
}

impl RegisteredPlugin {

	fn lock( &self ) -> Result<MutexGuard<'_, Formatter>, ContextError> {
		self.formatter.try_lock().map_err(| err | match err {
			TryLockError::WouldBlock => ContextError::LockRejected( self.info.name.clone() ),
			TryLockError::Poisoned( _ ) => ContextError::Poisoned,
		})
	}

	fn format_text( &self, request: &FormatRequest ) -> Result<FormatOutcome, ContextError> {
		Ok( self.lock()?.format_text( request )? )
	}

}

/// Owns a set of plugins and routes files to them.
pub struct Context {
	engine: Engine,
	global_config: GlobalConfiguration,
	plugins: Arc<PluginList>,
}

impl std::fmt::Debug for Context {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		let names = self.plugins.read()
			.map(| plugins | plugins.iter().map(| plugin | plugin.info.name.clone() ).collect::<Vec<_>>() )
			.unwrap_or_default();
		f.debug_struct( "Context" )
			.field( "global_config", &self.global_config )
			.field( "plugins", &names )
			.finish_non_exhaustive()
	}
}

impl Context {

	/// Creates an empty context; every plugin added gets `global_config`.
	pub fn new( engine: &Engine, global_config: GlobalConfiguration ) -> Self {
		Self {
			engine: engine.clone(),
			global_config,
			plugins: Arc::new( RwLock::new( Vec::new() )),
		}
	}

	pub fn global_config( &self ) -> &GlobalConfiguration { &self.global_config }

	/// Loads a plugin, configures it and makes it available for routing and delegation.
	///
	/// # Errors
	/// Fails if the plugin cannot be loaded or rejects its configuration.
	pub fn add_plugin( &self, source: impl Into<ModuleSource>, plugin_config: ConfigKeyMap ) -> Result<PluginHandle, ContextError> {

		let mut formatter = load_formatter( &self.engine, source )?;
		formatter.set_config( &self.global_config, &plugin_config )?;
		let info = formatter.plugin_info()?;
		let file_matching = formatter.file_matching_info()?.normalized();

		let mut plugins = self.plugins.write().map_err(|_| ContextError::Poisoned )?;
		let index = plugins.len();
		formatter.set_host_formatter( delegate_to_others( Arc::downgrade( &self.plugins ), index ));

		tracing::debug!(
			plugin = %info.name,
			index,
			file_names = ?file_matching.file_names,
			file_extensions = ?file_matching.file_extensions,
			"registered plugin",
		);

		let plugin = Arc::new( RegisteredPlugin {
			index,
			info,
			file_matching,
			plugin_config,
			formatter: Mutex::new( formatter ),
		});
		plugins.push( Arc::clone( &plugin ));
		Ok( PluginHandle { plugin: Arc::downgrade( &plugin ) })

	}

	/// Formats `request` with the plugin its file path routes to.
	///
	/// # Errors
	/// Returns [`ContextError::NoMatchingPlugin`] if no plugin claims the file, or whatever
	/// the chosen plugin fails with.
	pub fn format_text( &self, request: &FormatRequest ) -> Result<FormatOutcome, ContextError> {
		let plugin = {
			let plugins = self.plugins.read().map_err(|_| ContextError::Poisoned )?;
			match find_plugin( &plugins, &request.file_path, None ) {
				Some( plugin ) => Arc::clone( plugin ),
				None => return Err( ContextError::NoMatchingPlugin {
					file_path: request.file_path.clone(),
					registered: describe_plugins( &plugins ),
				}),
			}
		};
		tracing::debug!( plugin = %plugin.info.name, file_path = %request.file_path, "routing file" );
		plugin.format_text( request )
	}

	/// The plugin `file_path` would be routed to, if any.
	pub fn plugin_for_path( &self, file_path: &str ) -> Option<PluginHandle> {
		let plugins = self.plugins.read().ok()?;
		find_plugin( &plugins, file_path, None ).map(| plugin | PluginHandle { plugin: Arc::downgrade( plugin )})
	}

	/// Every registered plugin, in registration order.
	///
	/// # Errors
	/// Fails only if a previous call panicked while registering.
	pub fn plugins( &self ) -> Result<Vec<PluginHandle>, ContextError> {
		let plugins = self.plugins.read().map_err(|_| ContextError::Poisoned )?;
		Ok( plugins.iter().map(| plugin | PluginHandle { plugin: Arc::downgrade( plugin )}).collect() )
	}

	/// The diagnostics of every plugin, concatenated in registration order.
	///
	/// # Errors
	/// Fails on the first plugin whose diagnostics cannot be retrieved.
	pub fn config_diagnostics( &self ) -> Result<Vec<ConfigDiagnostic>, ContextError> {
		let plugins = self.plugins.read().map_err(|_| ContextError::Poisoned )?.clone();
		plugins.iter()
			.map(| plugin | -> Result<_, ContextError> { Ok( plugin.lock()?.config_diagnostics()? )})
			.flatten_ok()
			.collect()
	}

}

/// A narrow view of one plugin inside a [`Context`].
///
/// The context owns the plugin; every call fails with [`ContextError::ContextDropped`]
/// once the context is gone.
#[derive( Debug, Clone )]
pub struct PluginHandle {
	plugin: Weak<RegisteredPlugin>,
}

impl PluginHandle {

	fn upgrade( &self ) -> Result<Arc<RegisteredPlugin>, ContextError> {
		self.plugin.upgrade().ok_or( ContextError::ContextDropped )
	}

	/// # Errors
	/// Fails if the context was dropped.
	pub fn info( &self ) -> Result<PluginInfo, ContextError> {
		Ok( self.upgrade()?.info.clone() )
	}

	/// The normalised file matching captured at registration.
	///
	/// # Errors
	/// Fails if the context was dropped.
	pub fn file_matching( &self ) -> Result<FileMatchingInfo, ContextError> {
		Ok( self.upgrade()?.file_matching.clone() )
	}

	/// # Errors
	/// Fails if the context was dropped.
	pub fn plugin_config( &self ) -> Result<ConfigKeyMap, ContextError> {
		Ok( self.upgrade()?.plugin_config.clone() )
	}

	/// Formats with this plugin regardless of the file path.
	///
	/// # Errors
	/// As [`Context::format_text`], without the routing failure.
	pub fn format_text( &self, request: &FormatRequest ) -> Result<FormatOutcome, ContextError> {
		self.upgrade()?.format_text( request )
	}

	/// # Errors
	/// Fails if the plugin's answer cannot be decoded.
	pub fn config_diagnostics( &self ) -> Result<Vec<ConfigDiagnostic>, ContextError> {
		Ok( self.upgrade()?.lock()?.config_diagnostics()? )
	}

	/// # Errors
	/// Fails if the plugin's answer cannot be decoded.
	pub fn resolved_config( &self ) -> Result<ConfigKeyMap, ContextError> {
		Ok( self.upgrade()?.lock()?.resolved_config()? )
	}

	/// # Errors
	/// Fails if the plugin's answer is not valid UTF-8.
	pub fn license_text( &self ) -> Result<String, ContextError> {
		Ok( self.upgrade()?.lock()?.license_text()? )
	}

}

impl std::fmt::Debug for RegisteredPlugin {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		f.debug_struct( "RegisteredPlugin" )
			.field( "index", &self.index )
			.field( "name", &self.info.name )
			.finish_non_exhaustive()
	}
}

fn delegate_to_others( plugins: Weak<PluginList>, caller: usize ) -> impl FnMut( FormatRequest ) -> FormatOutcome + Send + 'static {
	move | request | match delegate( &plugins, caller, &request ) {
		Ok( outcome ) => outcome,
		Err( err ) => {
			tracing::debug!( caller, file_path = %request.file_path, %err, "delegated formatting failed" );
			FormatOutcome::Failed( err.to_string() )
		}
	}
}

fn delegate( plugins: &Weak<PluginList>, caller: usize, request: &FormatRequest ) -> Result<FormatOutcome, ContextError> {
	let plugins = plugins.upgrade().ok_or( ContextError::ContextDropped )?;
	let target = {
		let plugins = plugins.read().map_err(|_| ContextError::Poisoned )?;
		match find_plugin( &plugins, &request.file_path, Some( caller )) {
			Some( plugin ) => Arc::clone( plugin ),
			None => return Ok( FormatOutcome::Unchanged ),
		}
	};
	tracing::debug!( caller, target = target.index, file_path = %request.file_path, "delegating embedded text" );
	target.format_text( request )
}

fn find_plugin<'a>( plugins: &'a [Arc<RegisteredPlugin>], file_path: &str, exclude: Option<usize> ) -> Option<&'a Arc<RegisteredPlugin>> {
	let candidates = plugins.iter().filter(| plugin | Some( plugin.index ) != exclude ).collect::<Vec<_>>();
	match_file( file_path, candidates.iter().map(| plugin | &plugin.file_matching )).map(| position | candidates[ position ])
}

/// Position of the first entry claiming `file_path` by name, or failing that by extension.
fn match_file<'a>( file_path: &str, matching: impl Iterator<Item = &'a FileMatchingInfo> + Clone ) -> Option<usize> {
	let ( file_name, extension ) = file_name_and_extension( file_path );
	matching.clone()
		.position(| info | info.file_names.contains( &file_name ))
		.or_else(|| matching.clone().position(| info | extension.as_ref().is_some_and(| extension | info.file_extensions.contains( extension ))))
}

fn file_name_and_extension( file_path: &str ) -> ( String, Option<String> ) {
	let file_name = file_path.rsplit([ '/', '\\' ]).next().unwrap_or( file_path ).to_lowercase();
	let extension = file_name.rsplit_once( '.' ).map(|( _, extension )| extension.to_string() );
	( file_name, extension )
}

fn describe_plugins( plugins: &[Arc<RegisteredPlugin>] ) -> String {
	match plugins.is_empty() {
		true => "none".to_string(),
		false => plugins.iter()
			.map(| plugin | format!( "{} [{}]", plugin.info.name, plugin.file_matching.file_extensions.iter().join( ", " )))
			.join( "; " ),
	}
}



#[cfg( test )]
mod tests {

	use super::* ;

	fn matching( extensions: &[&str], names: &[&str] ) -> FileMatchingInfo {
		FileMatchingInfo {
			file_extensions: extensions.iter().map( ToString::to_string ).collect(),
			file_names: names.iter().map( ToString::to_string ).collect(),
		}
	}

	#[test]
	fn splits_file_name_and_extension() {
		assert_eq!( file_name_and_extension( "src/Lib.RS" ), ( "lib.rs".to_string(), Some( "rs".to_string() )));
		assert_eq!( file_name_and_extension( r"C:\repo\Dockerfile" ), ( "dockerfile".to_string(), None ));
		assert_eq!( file_name_and_extension( "archive.tar.gz" ), ( "archive.tar.gz".to_string(), Some( "gz".to_string() )));
	}

	#[test]
	fn file_name_beats_earlier_extension_match() {
		let plugins = [ matching( &[ "json" ], &[] ), matching( &[ "jsonc" ], &[ "package.json" ]) ];
		assert_eq!( match_file( "app/package.json", plugins.iter() ), Some( 1 ));
		assert_eq!( match_file( "app/tsconfig.json", plugins.iter() ), Some( 0 ));
	}

	#[test]
	fn first_registered_extension_wins() {
		let plugins = [ matching( &[ "md" ], &[] ), matching( &[ "md", "markdown" ], &[] ) ];
		assert_eq!( match_file( "README.MD", plugins.iter() ), Some( 0 ));
		assert_eq!( match_file( "notes.markdown", plugins.iter() ), Some( 1 ));
	}

	#[test]
	fn unmatched_file_has_no_position() {
		let plugins = [ matching( &[ "json" ], &[ "dockerfile" ]) ];
		assert_eq!( match_file( "x.txt", plugins.iter() ), None );
		assert_eq!( match_file( "makefile", plugins.iter() ), None );
	}

}
