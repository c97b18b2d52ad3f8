//! Plugin registry.
//!
//! A plugin claims one or more channels on the messenger during
//! initialization. Plugins that also need the host surface (window title,
//! clipboard) implement [`SurfacePlugin`]; that capability is recorded once
//! when the plugin is added, as a [`PluginEntry`] variant.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use platchan_transport::BinaryMessenger;

use crate::error::{ChannelError, Result};

/// Host-side window and clipboard operations a plugin may need.
pub trait HostSurface: Send + Sync {
    fn set_title(&self, title: &str);

    /// Current clipboard text, or `None` when the clipboard holds no text.
    fn clipboard_text(&self) -> Option<String>;

    fn set_clipboard_text(&self, text: &str);
}

/// A unit of host functionality bound to the messenger.
pub trait Plugin: Send {
    /// Stable name used in logs and initialization errors.
    fn name(&self) -> &'static str;

    fn init_plugin(&mut self, messenger: &Arc<dyn BinaryMessenger>) -> Result<()>;
}

/// A plugin that also needs the host surface.
///
/// `init_surface` runs after `init_plugin` for every plugin has completed.
pub trait SurfacePlugin: Plugin {
    fn init_surface(&mut self, surface: &Arc<dyn HostSurface>) -> Result<()>;
}

/// A registered plugin with its capabilities resolved.
pub enum PluginEntry {
    Basic(Box<dyn Plugin>),
    Surface(Box<dyn SurfacePlugin>),
}

impl PluginEntry {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Basic(plugin) => plugin.name(),
            Self::Surface(plugin) => plugin.name(),
        }
    }

    fn init_plugin(&mut self, messenger: &Arc<dyn BinaryMessenger>) -> Result<()> {
        match self {
            Self::Basic(plugin) => plugin.init_plugin(messenger),
            Self::Surface(plugin) => plugin.init_plugin(messenger),
        }
    }
}

/// Ordered set of plugins initialized together.
#[derive(Default)]
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, plugin: impl Plugin + 'static) -> &mut Self {
        self.entries.push(PluginEntry::Basic(Box::new(plugin)));
        self
    }

    pub fn add_surface(&mut self, plugin: impl SurfacePlugin + 'static) -> &mut Self {
        self.entries.push(PluginEntry::Surface(Box::new(plugin)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(PluginEntry::name).collect()
    }

    /// Run `init_plugin` on every plugin in insertion order.
    ///
    /// Stops at the first failure, wrapping it with the plugin's name.
    pub fn init_plugins(&mut self, messenger: &Arc<dyn BinaryMessenger>) -> Result<()> {
        for entry in &mut self.entries {
            let name = entry.name();
            entry.init_plugin(messenger).map_err(|err| wrap(name, err))?;
            debug!(plugin = name, "plugin initialized");
        }
        Ok(())
    }

    /// Run `init_surface` on every surface plugin in insertion order.
    pub fn init_surfaces(&mut self, surface: &Arc<dyn HostSurface>) -> Result<()> {
        for entry in &mut self.entries {
            if let PluginEntry::Surface(plugin) = entry {
                let name = plugin.name();
                plugin.init_surface(surface).map_err(|err| wrap(name, err))?;
                debug!(plugin = name, "plugin surface initialized");
            }
        }
        Ok(())
    }

    /// [`init_plugins`](Self::init_plugins), then
    /// [`init_surfaces`](Self::init_surfaces) when a surface is available.
    pub fn init_all(
        &mut self,
        messenger: &Arc<dyn BinaryMessenger>,
        surface: Option<&Arc<dyn HostSurface>>,
    ) -> Result<()> {
        self.init_plugins(messenger)?;
        if let Some(surface) = surface {
            self.init_surfaces(surface)?;
        }
        info!(plugins = self.entries.len(), "plugins initialized");
        Ok(())
    }
}

fn wrap(plugin: &str, err: ChannelError) -> ChannelError {
    ChannelError::Plugin {
        plugin: plugin.to_string(),
        source: Box::new(err),
    }
}

/// A [`HostSurface`] with no window behind it: the title and clipboard are
/// kept in memory.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    state: Mutex<HeadlessState>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    title: String,
    clipboard: Option<String>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .title
            .clone()
    }
}

impl HostSurface for HeadlessSurface {
    fn set_title(&self, title: &str) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .title = title.to_string();
    }

    fn clipboard_text(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clipboard
            .clone()
    }

    fn set_clipboard_text(&self, text: &str) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clipboard = Some(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LoopbackMessenger;

    #[derive(Default)]
    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Plugin for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn init_plugin(&mut self, _messenger: &Arc<dyn BinaryMessenger>) -> Result<()> {
            self.log.lock().unwrap().push(format!("plugin:{}", self.name));
            if self.fail {
                return Err(ChannelError::NotInitialized {
                    plugin: "dependency".to_string(),
                });
            }
            Ok(())
        }
    }

    impl SurfacePlugin for Probe {
        fn init_surface(&mut self, surface: &Arc<dyn HostSurface>) -> Result<()> {
            surface.set_title(self.name);
            self.log.lock().unwrap().push(format!("surface:{}", self.name));
            Ok(())
        }
    }

    fn messenger() -> Arc<dyn BinaryMessenger> {
        Arc::new(LoopbackMessenger::new())
    }

    #[test]
    fn test_init_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry
            .add_surface(Probe {
                name: "windowed",
                log: Arc::clone(&log),
                ..Probe::default()
            })
            .add(Probe {
                name: "basic",
                log: Arc::clone(&log),
                ..Probe::default()
            });
        assert_eq!(registry.names(), vec!["windowed", "basic"]);

        let surface = Arc::new(HeadlessSurface::new());
        let dyn_surface: Arc<dyn HostSurface> = surface.clone();
        registry.init_all(&messenger(), Some(&dyn_surface)).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["plugin:windowed", "plugin:basic", "surface:windowed"]
        );
        assert_eq!(surface.title(), "windowed");
    }

    #[test]
    fn test_init_failure_names_plugin() {
        let mut registry = PluginRegistry::new();
        registry
            .add(Probe {
                name: "broken",
                fail: true,
                ..Probe::default()
            })
            .add(Probe {
                name: "never",
                ..Probe::default()
            });

        let err = registry.init_all(&messenger(), None).unwrap_err();
        match err {
            ChannelError::Plugin { plugin, .. } => assert_eq!(plugin, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_surface_skipped_without_host() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.add_surface(Probe {
            name: "windowed",
            log: Arc::clone(&log),
            ..Probe::default()
        });
        registry.init_all(&messenger(), None).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["plugin:windowed"]);
    }

    #[test]
    fn test_headless_clipboard() {
        let surface = HeadlessSurface::new();
        assert_eq!(surface.clipboard_text(), None);
        surface.set_clipboard_text("copied");
        assert_eq!(surface.clipboard_text().as_deref(), Some("copied"));
    }
}
