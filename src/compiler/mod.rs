//! Configuration compiler
//!
//! [`ConfigCompiler`] accumulates fragments into running pools, resolves
//! views and device classes after every merge, and on [`finalize`]
//! resolves devices, assigns signal ids and backfills translations.
//! Outputs are read from the finalized state.
//!
//! Every mutating step works on copies and commits only on success, so a
//! failed call leaves the compiler exactly as it was.
//!
//! [`finalize`]: ConfigCompiler::finalize

mod builtin;
mod device;
mod manifest;
mod report;

pub use builtin::{builtin_fragment, builtin_locales, BUILTIN_PREFIX};
pub use device::{FLOW_SECTIONS, SIGNAL_DEFINITION_KEY};
pub use manifest::{
    advisories, Advisory, AppManifest, FlowCards, ManifestDriver, ManifestEntry, Navigation, PairStep,
};
pub use report::{CompileCounts, CompileReport};

use rfgen_signal::{CommandTransform, SignalRegistry, DEFAULT_MAX_SENSITIVITY};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::CompileError;
use crate::fragment::{Fragment, PathRewriter};
use crate::locale::{LocaleResolver, LocaleSet, LocaleWarning};
use crate::resolve::{DeviceClassResolver, Pool, ViewResolver};
use crate::settings::ConfigType;
use device::{DeviceFinalizer, DRIVER_KEY, SIGNAL_KEY};
use manifest::ManifestBuilder;

/// Compiler inputs that do not come from fragments
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerOptions {
    pub config_type: ConfigType,
    pub max_sensitivity: f64,
    /// Directory (relative to the app root) manifest paths are anchored in
    pub driver_dir: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            config_type: ConfigType::Rf433,
            max_sensitivity: DEFAULT_MAX_SENSITIVITY,
            driver_dir: "drivers".to_string(),
        }
    }
}

/// State produced by a successful finalize
#[derive(Debug, Clone)]
struct Finalized {
    devices: Map<String, Value>,
    locales: LocaleSet,
    missing_translations: Vec<LocaleWarning>,
    advisories: Vec<Advisory>,
    registry: SignalRegistry,
}

/// Multi-fragment configuration compiler
#[derive(Debug)]
pub struct ConfigCompiler {
    options: CompilerOptions,
    fragments: usize,
    views: Pool,
    device_classes: Pool,
    devices: Pool,
    view_resolver: ViewResolver,
    class_resolver: DeviceClassResolver,
    resolved_views: Map<String, Value>,
    resolved_classes: Map<String, Value>,
    drivers: Vec<Value>,
    declared_signals: Map<String, Value>,
    globals: Map<String, Value>,
    builtin_locales: LocaleSet,
    /// Transforms and sensitivity ceiling only; every finalize registers
    /// signals into a fresh copy
    registry: SignalRegistry,
    finalized: Option<Finalized>,
}

impl Default for ConfigCompiler {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl ConfigCompiler {
    /// An empty compiler without built-in views, classes or translations
    pub fn new(options: CompilerOptions) -> Self {
        let registry = SignalRegistry::new().with_max_sensitivity(options.max_sensitivity);
        Self {
            options,
            fragments: 0,
            views: Pool::new(),
            device_classes: Pool::new(),
            devices: Pool::new(),
            view_resolver: ViewResolver::default(),
            class_resolver: DeviceClassResolver::default(),
            resolved_views: Map::new(),
            resolved_classes: Map::new(),
            drivers: Vec::new(),
            declared_signals: Map::new(),
            globals: Map::new(),
            builtin_locales: LocaleSet::new(),
            registry,
            finalized: None,
        }
    }

    /// A compiler preloaded with the built-in fragment and translations
    pub fn with_builtins(options: CompilerOptions) -> Result<Self, CompileError> {
        let mut compiler = Self::new(options);
        compiler.builtin_locales = builtin_locales()?;
        compiler.add_config(&builtin_fragment()?, BUILTIN_PREFIX)?;
        Ok(compiler)
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Make a named command transform available to signal definitions
    pub fn register_transform<T>(&mut self, name: impl Into<String>, transform: T)
    where
        T: CommandTransform + Send + Sync + 'static,
    {
        self.registry.register_transform(name, transform);
    }

    /// Merge a fragment whose relative paths are anchored at `path_prefix`.
    ///
    /// Views and device classes are re-resolved in full. Devices only
    /// resolve on [`finalize`](Self::finalize), and any earlier finalized
    /// state is dropped.
    pub fn add_config(&mut self, fragment: &Fragment, path_prefix: &str) -> Result<(), CompileError> {
        let rewriter = PathRewriter::new(path_prefix)?;
        let fragment = fragment.rewrite_paths(&rewriter)?;

        let mut builtin_locales = self.builtin_locales.clone();
        if let Some(locales) = &fragment.locales {
            builtin_locales.extend_authored(&Value::Object(locales.clone()))?;
        }

        let mut views = self.views.clone();
        views.extend(fragment.views.clone());
        let mut device_classes = self.device_classes.clone();
        device_classes.extend(fragment.device_classes.clone());

        let resolved_views = self.view_resolver.resolve_all(&views)?;
        let resolved_classes = self.class_resolver.resolve_all(&device_classes)?;

        self.devices.extend(fragment.devices.clone());
        self.views = views;
        self.device_classes = device_classes;
        self.resolved_views = resolved_views;
        self.resolved_classes = resolved_classes;
        self.builtin_locales = builtin_locales;
        self.drivers.extend(fragment.drivers.iter().cloned());
        for (config_type, declared) in &fragment.signals {
            let slot = self
                .declared_signals
                .entry(config_type.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let (Value::Object(slot), Value::Object(declared)) = (slot, declared) {
                for (id, definition) in declared {
                    slot.insert(id.clone(), definition.clone());
                }
            }
        }
        for (key, value) in &fragment.globals {
            self.globals.insert(key.clone(), value.clone());
        }
        self.fragments += 1;
        self.finalized = None;

        info!(
            prefix = path_prefix,
            views = self.views.len(),
            device_classes = self.device_classes.len(),
            devices = self.devices.len(),
            "merged fragment"
        );
        Ok(())
    }

    /// Resolve every device and backfill `project_locales`.
    ///
    /// Structural errors abort with the compiler unchanged. Advisory
    /// findings and missing translations are recorded and logged.
    pub fn finalize(&mut self, project_locales: &LocaleSet) -> Result<(), CompileError> {
        let mut registry = self.registry.clone();
        let finalizer = DeviceFinalizer {
            views: &self.resolved_views,
            declared_signals: self
                .declared_signals
                .get(self.options.config_type.as_str())
                .and_then(Value::as_object),
            global_driver: self.globals.get(DRIVER_KEY).filter(|v| !v.is_null()),
            global_signal: self.globals.get(SIGNAL_KEY).filter(|v| !v.is_null()),
        };

        let mut devices = Map::new();
        let mut found = Vec::new();
        for id in self.devices.ids() {
            let declaration = self.devices.get(id).cloned().unwrap_or(Value::Null);
            let resolved = self
                .class_resolver
                .resolve_detached(id, &declaration, &self.device_classes)?;
            let device = finalizer.finalize(id, resolved, &mut registry)?;
            debug!(device = %id, signal = ?device.get(SIGNAL_KEY), "finalized device");

            found.extend(advisories(id, &device));
            devices.insert(id.clone(), Value::Object(device));
        }

        let resolver = LocaleResolver::new().with_namespace(self.options.config_type.generator_namespace());
        let (locales, missing_translations) = resolver.resolve_all(
            &Value::Object(devices.clone()),
            project_locales,
            &self.builtin_locales,
        )?;

        for advisory in &found {
            warn!(device = %advisory.device, "{}", advisory.message);
        }
        for missing in &missing_translations {
            debug!(language = %missing.language, path = %missing.path, "missing translation");
        }

        info!(
            devices = devices.len(),
            signals = registry.len(),
            advisories = found.len(),
            missing_translations = missing_translations.len(),
            "finalized configuration"
        );

        self.finalized = Some(Finalized {
            devices,
            locales,
            missing_translations,
            advisories: found,
            registry,
        });
        Ok(())
    }

    fn finalized(&self) -> Result<&Finalized, CompileError> {
        self.finalized.as_ref().ok_or(CompileError::NotFinalized)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    /// `{views, deviceClasses, devices}`
    pub fn get_config(&self) -> Result<Value, CompileError> {
        let finalized = self.finalized()?;
        Ok(json!({
            "views": self.resolved_views,
            "deviceClasses": self.resolved_classes,
            "devices": finalized.devices,
        }))
    }

    /// `{devices}`
    pub fn get_device_config(&self) -> Result<Value, CompileError> {
        Ok(json!({ "devices": self.finalized()?.devices }))
    }

    /// Platform manifest with localized text and `./<driver_dir>` paths
    pub fn get_app_json_config(&self) -> Result<AppManifest, CompileError> {
        let finalized = self.finalized()?;
        let path_prefix = format!("./{}", self.options.driver_dir);

        ManifestBuilder {
            config_type: self.options.config_type,
            devices: &finalized.devices,
            raw_drivers: &self.drivers,
            declared_signals: &self.declared_signals,
            global_flow: self.globals.get("flow"),
            registry: &finalized.registry,
            locales: &finalized.locales,
            path_prefix: &path_prefix,
        }
        .build()
    }

    /// Translations after backfill, ready to persist
    pub fn locales(&self) -> Result<&LocaleSet, CompileError> {
        Ok(&self.finalized()?.locales)
    }

    pub fn advisories(&self) -> &[Advisory] {
        self.finalized
            .as_ref()
            .map(|f| f.advisories.as_slice())
            .unwrap_or_default()
    }

    pub fn missing_translations(&self) -> &[LocaleWarning] {
        self.finalized
            .as_ref()
            .map(|f| f.missing_translations.as_slice())
            .unwrap_or_default()
    }

    /// Signals of the last successful finalize
    pub fn registry(&self) -> &SignalRegistry {
        self.finalized
            .as_ref()
            .map(|f| &f.registry)
            .unwrap_or(&self.registry)
    }

    /// Summary of the current state
    pub fn report(&self) -> CompileReport {
        let counts = CompileCounts {
            fragments: self.fragments,
            views: self.resolved_views.len(),
            device_classes: self.resolved_classes.len(),
            devices: self.finalized.as_ref().map(|f| f.devices.len()).unwrap_or(0),
            signals: self.registry().len(),
        };

        let mut report = CompileReport::new(self.options.config_type, counts);
        report.advisories = self.advisories().to_vec();
        report.missing_translations = self.missing_translations().to_vec();
        report
    }
}
