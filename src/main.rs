use std::env;

use backtracking_regex::{MatchResult, Regex, RegexBuilder};

const USAGE: &str = "Usage: regex-engine [-i] [-m] [-s] [-x] [-n] [-g] [--max-iterations N] <pattern> <input>";

struct Args {
    builder: RegexBuilder,
    pattern: String,
    input: String,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut builder = Regex::builder();
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-i" => {
                builder.case_insensitive(true);
            }
            "-m" => {
                builder.multiline(true);
            }
            "-s" => {
                builder.dot_all(true);
            }
            "-x" => {
                builder.extended(true);
            }
            "-n" => {
                builder.no_auto_capture(true);
            }
            "-g" => {
                builder.global(true);
            }
            "--max-iterations" => {
                let value = iter.next().ok_or("--max-iterations needs a value")?;
                let limit = value
                    .parse()
                    .map_err(|_| format!("invalid iteration limit: {value}"))?;
                builder.max_iterations(limit);
            }
            "--" => positional.extend(iter.by_ref().cloned()),
            _ => positional.push(arg.clone()),
        }
    }
    match <[String; 2]>::try_from(positional) {
        Ok([pattern, input]) => Ok(Args {
            builder,
            pattern,
            input,
        }),
        Err(_) => Err(USAGE.to_string()),
    }
}

fn print_match(result: &MatchResult, input: &str) {
    let whole = result.get(0).map_or("", |c| c.as_str(input));
    println!("MATCH:{}", whole);
    // Print capturing groups
    for i in 1..result.len() {
        match result.get(i) {
            Some(group) => println!("GROUP {}:{}", i, group.as_str(input)),
            None => println!("GROUP {}:", i),
        }
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    };

    let regex = match args.builder.build(&args.pattern) {
        Ok(regex) => regex,
        Err(e) => {
            println!("ERROR:{}", e);
            return;
        }
    };
    log::debug!(
        "pattern compiled to {} states with {} capture slots",
        regex.machine().states.len(),
        regex.capture_count()
    );

    let input = args.input.as_str();
    if regex.options().global {
        let matches = regex.find_all(input);
        if matches.is_empty() {
            println!("NO_MATCH");
        }
        for result in &matches {
            print_match(result, input);
        }
        return;
    }
    match regex.find(input) {
        Some(result) => print_match(&result, input),
        None => {
            println!("NO_MATCH");
        }
    }
}
