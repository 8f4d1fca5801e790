use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::mpsc;
use std::time::Instant;

use clap::Parser;
use datamd_cli::DatamdCli;
use datamd_cli::Debouncer;
use datamd_cli::WATCH_DEBOUNCE;
use datamd_cli::WatchTarget;
use datamd_core::AnyEmptyResult;
use datamd_core::AnyResult;
use datamd_core::DatamdConfig;
use datamd_core::DatamdError;
use datamd_core::ProcessOptions;
use datamd_core::ProcessOutcome;
use datamd_core::find_dmd_files;
use datamd_core::is_dmd_file;
use datamd_core::process_file;
use notify::Watcher;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "DATAMD_LOG";

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = DatamdCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	init_tracing(args.verbose);

	if let Err(message) = validate_input(&args.input) {
		eprintln!("{} {message}", colored!("error:", red));
		process::exit(1);
	}

	if let Err(e) = run(&args) {
		// Core errors carry codes and help text, so render them through
		// miette.
		match e.downcast::<DatamdError>() {
			Ok(datamd_err) => {
				let report: miette::Report = (*datamd_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Log to stderr. `DATAMD_LOG` takes an `EnvFilter` directive and wins over
/// `--verbose`.
fn init_tracing(verbose: bool) {
	let default_level = if verbose { "debug" } else { "warn" };
	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.try_init()
		.ok();
}

fn validate_input(input: &Path) -> Result<(), String> {
	if input.is_dir() {
		return Ok(());
	}

	if !input.is_file() {
		return Err(format!(
			"input must be a .dmd file or a directory: {}",
			input.display()
		));
	}

	if !is_dmd_file(input) {
		return Err(format!(
			"input file must have a `.dmd` extension: {}",
			input.display()
		));
	}

	Ok(())
}

fn load_config(args: &DatamdCli) -> AnyResult<DatamdConfig> {
	let config = match &args.config {
		Some(path) => DatamdConfig::load(path)?,
		None => DatamdConfig::from_env(),
	};

	tracing::debug!(
		config = ?args.config,
		name = config.application_name(),
		"resolved configuration"
	);

	Ok(config)
}

fn run(args: &DatamdCli) -> AnyEmptyResult {
	let options = args.process_options(load_config(args)?);
	let failed = process_input(args, &options)?;

	if args.watch {
		return watch(args, &options);
	}

	if failed > 0 {
		return Err(format!("{failed} document(s) could not be processed").into());
	}

	Ok(())
}

fn report(outcome: &ProcessOutcome) {
	println!(
		"{} {} -> {}",
		colored!("Processed", green),
		outcome.input.display(),
		outcome.output.display()
	);

	for failure in &outcome.failures {
		eprintln!(
			"{} {}:{}: {}",
			colored!("warning:", yellow),
			outcome.input.display(),
			failure.line,
			failure.message
		);
	}
}

fn output_for(args: &DatamdCli, options: &ProcessOptions, file: &Path) -> Option<PathBuf> {
	if args.input.is_dir() {
		args.directory_output(file, options.format)
	} else {
		args.output.clone()
	}
}

/// Process the input once. Returns the number of documents that failed.
fn process_input(args: &DatamdCli, options: &ProcessOptions) -> AnyResult<usize> {
	if !args.input.is_dir() {
		let outcome = process_file(&args.input, args.output.as_deref(), options)?;
		report(&outcome);
		return Ok(0);
	}

	let files = find_dmd_files(&args.input)?;
	if files.is_empty() {
		println!("No .dmd files found in {}", args.input.display());
		return Ok(0);
	}

	let mut failed = 0;
	for file in &files {
		let output = output_for(args, options, file);
		match process_file(file, output.as_deref(), options) {
			Ok(outcome) => report(&outcome),
			Err(e) => {
				failed += 1;
				eprintln!("{} {}: {e}", colored!("error:", red), file.display());
			}
		}
	}

	Ok(failed)
}

fn watch(args: &DatamdCli, options: &ProcessOptions) -> AnyEmptyResult {
	let target = WatchTarget::from_input(&args.input)?;
	let (tx, rx) = mpsc::channel::<PathBuf>();

	let mut watcher =
		notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
			if let Ok(event) = res {
				if matches!(
					event.kind,
					notify::EventKind::Modify(_) | notify::EventKind::Create(_)
				) {
					for path in event.paths {
						let _ = tx.send(path);
					}
				}
			}
		})?;
	watcher.watch(target.watch_dir(), notify::RecursiveMode::NonRecursive)?;

	println!(
		"{} {} (press Ctrl+C to stop)",
		colored!("Watching:", bold),
		args.input.display()
	);

	let mut debouncer = Debouncer::new(WATCH_DEBOUNCE);
	loop {
		let path = rx.recv()?;
		if !target.matches(&path) || !debouncer.should_run(&path, Instant::now()) {
			continue;
		}

		println!("\nChange detected: {}. Rebuilding...", path.display());
		let output = output_for(args, options, &path);
		match process_file(&path, output.as_deref(), options) {
			Ok(outcome) => report(&outcome),
			Err(e) => eprintln!("{} {e}", colored!("error:", red)),
		}
	}
}
