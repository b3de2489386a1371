use std::path::PathBuf;

use assembly_publicizer::{
    boundary,
    layout::ModuleLayout,
    marker,
    publicize::{self, PublicizeReport},
    Result,
};
use clap::Parser;
use serde::Serialize;

/// assembly-publicizer - make every type, method and field of a .NET assembly public
#[derive(Debug, Parser)]
#[command(name = "assembly-publicizer", version, about, long_about = None)]
pub struct Cli {
    /// Path to the .NET assembly file.
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Output file, or directory when ending in a path separator.
    #[arg(short, long, value_name = "PATH", default_value = boundary::DEFAULT_OUTPUT_DIR)]
    pub output: String,

    #[command(flatten)]
    pub global: GlobalOptions,
}

/// Output and logging options.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit the report as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct RunReport {
    file: String,
    output: String,
    marker_created: bool,
    changed: PublicizeReport,
}

/// Load, publicize and save one assembly.
pub fn run(cli: &Cli) -> Result<()> {
    let mut assembly = boundary::load(&cli.input)?;

    let layout = ModuleLayout::from_view(assembly.view())?;
    let ctor = marker::ensure_marker(&mut assembly, &layout)?;
    let changed = publicize::publicize(&layout, &ctor, &mut assembly)?;

    let output = boundary::resolve_output_path(&cli.input, &cli.output);

    if !cli.global.json {
        println!("Changed {} types to public.", changed.types);
        println!(
            "Changed {} methods (including getters and setters) to public.",
            changed.methods
        );
        println!("Changed {} fields to public.", changed.fields);
        println!();
        println!("Saving a copy of the modified assembly ...");
    }

    boundary::save(&mut assembly, &output)?;

    let report = RunReport {
        file: cli.input.display().to_string(),
        output: output.display().to_string(),
        marker_created: ctor.created(),
        changed,
    };
    print_output(&report, &cli.global, |_| println!("Completed."));
    Ok(())
}

/// Print `data` as JSON (if `--json`) or call `display_fn` for human-readable output.
fn print_output<T: Serialize>(data: &T, opts: &GlobalOptions, display_fn: impl FnOnce(&T)) {
    if opts.json {
        match serde_json::to_string_pretty(data) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("ERROR! Cannot encode the report: {e}"),
        }
    } else {
        display_fn(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_defaults_to_directory() {
        let cli = Cli::try_parse_from(["assembly-publicizer", "Game.dll"]).unwrap();
        assert_eq!(cli.input, PathBuf::from("Game.dll"));
        assert_eq!(cli.output, "publicized_assemblies/");
        assert!(!cli.global.json);
        assert!(!cli.global.verbose);
    }

    #[test]
    fn parses_all_flags() {
        let cli = Cli::try_parse_from([
            "assembly-publicizer",
            "Game.dll",
            "-o",
            "out/Game.dll",
            "--json",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.output, "out/Game.dll");
        assert!(cli.global.json);
        assert!(cli.global.verbose);
    }

    #[test]
    fn input_is_required() {
        assert!(Cli::try_parse_from(["assembly-publicizer"]).is_err());
    }
}
