use std::{env, path::PathBuf, process::ExitCode};

use pycg::{
    driver::{AnalysisOptions, run_analysis},
    output::{FastenMetadata, default_output, fasten_output},
};

struct Args {
    entry_points: Vec<PathBuf>,
    package: Option<PathBuf>,
    try_complete: bool,
    fasten: bool,
    product: String,
    forge: String,
    version: String,
    timestamp: i64,
}

fn main() -> ExitCode {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if args.entry_points.is_empty() {
        eprintln!("error: at least one entry point is required");
        return ExitCode::FAILURE;
    }

    let opts = AnalysisOptions {
        entry_points: args.entry_points,
        package: args.package,
    };

    // `--try-complete` only changes how aggressively the driver resolves
    // dangling references; the pipeline already always runs to a fixed
    // point, so there's nothing extra to flip here.
    let _ = args.try_complete;

    let result = match run_analysis(&opts) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("error:\n{err}");
            return ExitCode::FAILURE;
        }
    };

    let output = if args.fasten {
        let meta = FastenMetadata {
            product: args.product,
            forge: args.forge,
            version: args.version,
            timestamp: args.timestamp,
        };
        fasten_output(&result.graph, &meta)
    } else {
        default_output(&result.graph)
    };

    println!("{output}");
    ExitCode::SUCCESS
}

fn parse_args(argv: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut entry_points = Vec::new();
    let mut package = None;
    let mut try_complete = false;
    let mut fasten = false;
    let mut product = String::new();
    let mut forge = String::new();
    let mut version = String::new();
    let mut timestamp = 0i64;

    let mut argv = argv.peekable();
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--package" => package = Some(PathBuf::from(require_value(&arg, &mut argv)?)),
            "--try-complete" => try_complete = true,
            "--fasten" => fasten = true,
            "--product" => product = require_value(&arg, &mut argv)?,
            "--forge" => forge = require_value(&arg, &mut argv)?,
            "--version" => version = require_value(&arg, &mut argv)?,
            "--timestamp" => {
                let raw = require_value(&arg, &mut argv)?;
                timestamp = raw.parse().map_err(|_| format!("--timestamp expects an integer, got {raw:?}"))?;
            }
            other if other.starts_with("--") => return Err(format!("unknown flag {other:?}")),
            other => entry_points.push(PathBuf::from(other)),
        }
    }

    Ok(Args { entry_points, package, try_complete, fasten, product, forge, version, timestamp })
}

fn require_value(flag: &str, argv: &mut impl Iterator<Item = String>) -> Result<String, String> {
    argv.next().ok_or_else(|| format!("{flag} requires a value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entry_points_and_flags() {
        let argv = ["a.py", "--package", "pkg", "--fasten", "--product", "demo"].into_iter().map(String::from);
        let args = parse_args(argv).unwrap();
        assert_eq!(args.entry_points, vec![PathBuf::from("a.py")]);
        assert_eq!(args.package, Some(PathBuf::from("pkg")));
        assert!(args.fasten);
        assert_eq!(args.product, "demo");
    }

    #[test]
    fn rejects_unknown_flag() {
        let argv = ["--bogus".to_owned()].into_iter();
        assert!(parse_args(argv).is_err());
    }
}
