use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;

use strata_driver::report::report_diagnostic;
use strata_driver::ExternalCompiler;
use strata_project::{Error, Project, ShellHost};

#[derive(Parser)]
#[command(
    name = "strata",
    version = "0.1.0",
    about = "Strata project build driver",
    long_about = "Resolves which Strata sources a project compiles, runs the project's\nbuild script when its generated files are stale, and compiles every\nselected file to its output path."
)]
struct Cli {
    /// Project root (where strata.toml lives)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every input file and its output path
    Files,

    /// Run the build script if its generated files are stale
    Gen {
        /// Regenerate even when up to date
        #[arg(long)]
        force: bool,
    },

    /// Run the build script if needed and compile every selected file
    Build,

    /// Remove generated files and the build script cache record
    Clean,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = Project::open(&cli.root).and_then(|project| match cli.command {
        Commands::Files => files_command(&project),
        Commands::Gen { force } => gen_command(&project, force),
        Commands::Build => build_command(&project),
        Commands::Clean => project.clean().map(|_| ExitCode::SUCCESS),
    });

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn script_host(project: &Project) -> ShellHost {
    ShellHost::new(&project.config().build_interpreter)
}

fn files_command(project: &Project) -> Result<ExitCode, Error> {
    for file in project.resolve()? {
        if file.generated {
            println!("{} -> {} (generated)", file.input, file.output);
        } else {
            println!("{} -> {}", file.input, file.output);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn gen_command(project: &Project, force: bool) -> Result<ExitCode, Error> {
    if project.config().build_script.is_none() {
        println!("No build script configured.");
        return Ok(ExitCode::SUCCESS);
    }
    if project.maybe_run_build_script(&script_host(project), force)? {
        println!("Generated files written to: {}", project.config().build_scratch_dir);
    } else {
        println!("Generated files are up to date.");
    }
    Ok(ExitCode::SUCCESS)
}

fn build_command(project: &Project) -> Result<ExitCode, Error> {
    let mut compiler = project
        .config()
        .compiler
        .as_deref()
        .and_then(ExternalCompiler::from_command)
        .ok_or_else(|| Error::config("no compiler configured; set `compiler` in strata.toml"))?;

    let report = project.build(&script_host(project), &mut compiler)?;
    if report.regenerated {
        info!("build script regenerated its files");
    }

    for diagnostic in &report.diagnostics {
        report_diagnostic(diagnostic);
    }
    for file in &report.written {
        println!("Wrote: {}", file.output);
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{} file(s) failed to compile", report.failed.len());
        Ok(ExitCode::FAILURE)
    }
}
