//! rfgen CLI
//!
//! Entry point for the `rfgen` command-line tool.

use clap::{Parser, Subcommand};
use rfgen::fragment::relative_between;
use rfgen::{
    CompileError, CompilerSettings, ConfigCompiler, ConfigReader, FileReader, Fragment, LocaleStore,
    StagedWrites,
};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;

#[derive(Parser)]
#[command(name = "rfgen")]
#[command(about = "RF device driver configuration compiler", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Target {
    /// App root directory
    #[arg(long, short = 'r', default_value = ".")]
    root: PathBuf,

    /// Project fragment file or directory (default: <root>/<config_dir>)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Config type to compile for (433, 868, ir)
    #[arg(long)]
    config_type: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the project and write all outputs
    Compile {
        #[command(flatten)]
        target: Target,

        /// Output directory (default: <root>/<driver_dir>)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// How backfilled translations are marked on disk (keep, strip)
        #[arg(long)]
        sentinel: Option<String>,
    },

    /// Print the resolved configuration without writing anything
    Resolve {
        #[command(flatten)]
        target: Target,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            target,
            out,
            sentinel,
        } => run_compile(target, out, sentinel),
        Commands::Resolve { target } => run_resolve(target),
    }
}

fn fail(context: &str, err: CompileError) -> ! {
    eprintln!("Error {} [{}]: {}", context, err.code(), err);
    process::exit(1);
}

fn cli_overrides(config_type: Option<String>, sentinel: Option<String>) -> Option<Value> {
    let mut overrides = Map::new();
    if let Some(config_type) = config_type {
        overrides.insert("config_type".to_string(), Value::String(config_type));
    }
    if let Some(sentinel) = sentinel {
        overrides.insert("locales".to_string(), json!({ "sentinel": sentinel }));
    }
    (!overrides.is_empty()).then_some(Value::Object(overrides))
}

/// Load settings, built-ins, the project fragment and project locales, then
/// finalize
fn compile(
    target: &Target,
    sentinel: Option<String>,
) -> Result<(CompilerSettings, ConfigCompiler, LocaleStore), CompileError> {
    let settings = CompilerSettings::for_root(
        &target.root,
        cli_overrides(target.config_type.clone(), sentinel),
    )?;
    let mut compiler = ConfigCompiler::with_builtins(settings.compiler_options())?;

    let reader = FileReader;
    let location = target
        .config
        .clone()
        .unwrap_or_else(|| target.root.join(settings.config_dir()));
    let file = reader.locate(&location)?;
    let fragment = Fragment::from_value(reader.read(&file)?)?;

    let config_dir = file.parent().unwrap_or(Path::new("."));
    let prefix = relative_between(&target.root.join(settings.driver_dir()), config_dir);
    info!(config = %file.display(), prefix = %prefix, "loading project fragment");
    compiler.add_config(&fragment, &prefix)?;

    let store = LocaleStore::new(target.root.join(settings.locales_dir()));
    let project_locales = store.load()?;
    compiler.finalize(&project_locales)?;

    Ok((settings, compiler, store))
}

fn pretty(value: &impl serde::Serialize) -> Vec<u8> {
    match serde_json::to_vec_pretty(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn run_compile(target: Target, out: Option<PathBuf>, sentinel: Option<String>) {
    let (settings, compiler, store) = match compile(&target, sentinel) {
        Ok(compiled) => compiled,
        Err(e) => fail("compiling configuration", e),
    };

    let device_config = match compiler.get_device_config() {
        Ok(config) => config,
        Err(e) => fail("building device config", e),
    };
    let manifest = match compiler.get_app_json_config() {
        Ok(manifest) => manifest,
        Err(e) => fail("building app manifest", e),
    };
    let locales = match compiler.locales() {
        Ok(locales) => locales,
        Err(e) => fail("reading locales", e),
    };
    let report = compiler
        .report()
        .with_settings_sources(settings.sources.clone());

    let out = out.unwrap_or_else(|| target.root.join(settings.driver_dir()));
    if let Err(e) = fs::create_dir_all(&out) {
        eprintln!("Error creating output directory {}: {}", out.display(), e);
        process::exit(1);
    }

    // Nothing is replaced until every output is staged
    let mut writes = StagedWrites::new();
    for (name, bytes) in [
        ("device_config.json", pretty(&device_config)),
        ("app_manifest.json", pretty(&manifest)),
        ("compile_report.json", pretty(&report)),
    ] {
        if let Err(e) = writes.stage(out.join(name), &bytes) {
            fail("writing outputs", e.into());
        }
    }
    let locale_files = match store.stage(locales, settings.sentinel_policy(), &mut writes) {
        Ok(targets) => targets,
        Err(e) => fail("writing locales", e.into()),
    };
    if let Err(e) = writes.commit() {
        fail("writing outputs", e.into());
    }

    println!("Compiled {} configuration", settings.config_type());
    println!("  Devices: {}", report.counts.devices);
    println!("  Signals: {}", report.counts.signals);
    println!("  Locale files: {}", locale_files.len());
    if report.warning_count() > 0 {
        println!("  Warnings: {}", report.warning_count());
    }
    println!("  Output: {}", out.display());
}

fn run_resolve(target: Target) {
    let config = compile(&target, None).and_then(|(_, compiler, _)| compiler.get_config());

    let config = match config {
        Ok(config) => config,
        Err(e) => fail("resolving configuration", e),
    };
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}
