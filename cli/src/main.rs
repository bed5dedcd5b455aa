/*!
Command-line interface for the redoscan ReDoS analyzer.

Exit codes: 0 when every checked pattern is safe, 1 when any pattern is
vulnerable, 2 on errors (parse failures, timeouts, or unknown verdicts
when `--fail-unknown` is set).
*/

use std::io::{self, BufRead};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::debug;

use redoscan::{check_with, Config, Diagnostics, Flags, Status};

#[derive(Parser)]
#[command(
    name = "redoscan",
    about = "Detects regular expressions vulnerable to ReDoS",
    version
)]
struct Args {
    /// Patterns to check.
    #[arg(value_name = "PATTERN")]
    patterns: Vec<String>,

    /// Case-insensitive matching.
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// `^` and `$` match at line boundaries.
    #[arg(short = 'm', long)]
    multiline: bool,

    /// The dot matches line terminators.
    #[arg(short = 's', long)]
    dotall: bool,

    /// Overall analysis budget per pattern, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 10.0)]
    timeout: f64,

    /// Read patterns from standard input, one per line.
    #[arg(long)]
    stdin: bool,

    /// Emit one JSON object per pattern instead of text.
    #[arg(long)]
    json: bool,

    /// Treat UNKNOWN verdicts as failures.
    #[arg(long)]
    fail_unknown: bool,

    /// Verbose diagnostics (repeat for debug logging).
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Print nothing; the exit code is the result.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    let flags = Flags::default()
        .ignore_case(args.ignore_case)
        .multiline(args.multiline)
        .dot_matches_new_line(args.dotall);
    let config =
        Config::default().timeout(Duration::from_secs_f64(args.timeout));

    let mut patterns = args.patterns.clone();
    if args.stdin {
        for line in io::stdin().lock().lines() {
            let line = line?;
            if !line.is_empty() {
                patterns.push(line);
            }
        }
    }
    if patterns.is_empty() {
        anyhow::bail!("no patterns given (use --stdin or pass arguments)");
    }

    let mut any_vulnerable = false;
    let mut any_failure = false;
    for pattern in &patterns {
        debug!("checking {pattern}");
        let result = check_with(pattern, flags, &config);
        match result.status {
            Status::Vulnerable => any_vulnerable = true,
            Status::Error => any_failure = true,
            Status::Unknown if args.fail_unknown => any_failure = true,
            _ => {}
        }
        if !args.quiet {
            report(&result, args);
        }
    }

    Ok(if any_failure {
        ExitCode::from(2)
    } else if any_vulnerable {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn report(result: &Diagnostics, args: &Args) {
    if args.json {
        println!("{}", result.to_json());
        return;
    }

    let label = match result.status {
        Status::Safe => "safe",
        Status::Vulnerable => "VULNERABLE",
        Status::Unknown => "unknown",
        Status::Error => "error",
    };
    let complexity = result
        .complexity
        .map(|c| format!(" {}", c.summary()))
        .unwrap_or_default();
    println!("{label}{complexity}: {}", result.source);

    if args.verbose > 0 || result.status == Status::Vulnerable {
        if let Some(attack) = &result.attack {
            println!("  attack: {attack}");
        }
        if let Some(hotspot) = &result.hotspot {
            println!(
                "  hotspot: {}..{} `{}`",
                hotspot.start, hotspot.end, hotspot.text
            );
        }
    }
    if result.status == Status::Error || args.verbose > 0 {
        println!("  {}", result.message);
    }
}
