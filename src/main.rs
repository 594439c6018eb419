use std::process::ExitCode;

use anyhow::Result;
use polonio::source::Source;
use polonio::template;

const USAGE: &str = "Usage: polonio <command|file>\n\
    \n\
    Commands:\n\
    \x20 polonio help                Show this help message\n\
    \x20 polonio version             Show version information\n\
    \x20 polonio run <file.pol>      Run a Polonio template\n\
    \x20 polonio <file.pol>          Shorthand for run\n\
    \x20 polonio serve ...           Development server (coming soon)\n";

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprint!("{USAGE}");
        return Ok(ExitCode::FAILURE);
    };

    match command.as_str() {
        "help" => {
            print!("{USAGE}");
            Ok(ExitCode::SUCCESS)
        }
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        "run" => handle_run(&args[1..]),
        "serve" => {
            eprintln!("serve: not implemented yet");
            Ok(ExitCode::FAILURE)
        }
        other if !other.starts_with('-') => handle_run(&args),
        other => {
            eprintln!("Unknown command: {other}");
            eprint!("{USAGE}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn handle_run(args: &[String]) -> Result<ExitCode> {
    let [path] = args else {
        if args.is_empty() {
            eprintln!("run: missing file argument");
        } else {
            eprintln!("run: too many arguments");
        }
        eprint!("{USAGE}");
        return Ok(ExitCode::FAILURE);
    };

    let source = Source::from_file(path)?;
    let output = template::render(&source)?;
    print!("{output}");
    Ok(ExitCode::SUCCESS)
}
