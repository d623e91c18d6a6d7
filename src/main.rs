use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use futures::executor::block_on;
use log::{debug, info};

use space_lua::ast_printer::AstPrinter;
use space_lua::error::LuaError;
use space_lua::interpreter::Interpreter;
use space_lua::scanner::Scanner;
use space_lua::value::Value;

#[derive(ClapParser, Debug)]
#[command(version, about = "Space Lua interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to space-lua.log
    #[arg(long, global = true)]
    log: bool,

    /// JSON object whose entries are exposed as globals
    #[arg(long, global = true, value_name = "FILE")]
    globals: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize { filename: PathBuf },

    /// Parses a script and prints it back, or its AST as JSON
    Parse {
        filename: PathBuf,

        /// Print the AST as JSON instead of source
        #[arg(long)]
        json: bool,
    },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: PathBuf },

    /// Runs input from a file as a Space Lua script
    Run { filename: PathBuf },
}

/// Reads the contents of a file as UTF-8 text
fn read_file(filename: &PathBuf) -> Result<String> {
    info!("Reading file: {:?}", filename);
    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut buf = String::new();

    let bytes = reader
        .read_to_string(&mut buf)
        .context(format!("Failed to read file {:?}", filename))?;

    info!("Read {} bytes from {:?}", bytes, filename);

    Ok(buf)
}

fn init_logger() -> Result<()> {
    let log_file = File::create("space-lua.log").context("Failed to create space-lua.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("space_lua::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .init();

    info!("Logger initialized, writing to space-lua.log");
    Ok(())
}

fn build_interpreter(globals: Option<&PathBuf>) -> Result<Interpreter> {
    let interpreter = Interpreter::new();

    let Some(path) = globals else {
        return Ok(interpreter);
    };

    let text = read_file(path)?;
    let json: serde_json::Value =
        serde_json::from_str(&text).context(format!("Failed to parse {:?} as JSON", path))?;

    let serde_json::Value::Object(entries) = json else {
        bail!("{:?} must contain a JSON object", path);
    };

    for (name, value) in &entries {
        interpreter.define_json(name, value);
    }

    info!("Defined {} globals from {:?}", entries.len(), path);

    Ok(interpreter)
}

/// Report a failure and exit: 65 for lexical and syntax errors, 70 otherwise.
fn fail(error: &LuaError, source: &str) -> ! {
    debug!("Failure: {:?}", error);

    eprintln!("{}", error.pretty(source));

    match error {
        LuaError::Lex { .. } | LuaError::Parse { .. } => std::process::exit(65),

        _ => std::process::exit(70),
    }
}

fn print_results(value: Value) {
    let values = value.into_values();

    if values.is_empty() {
        return;
    }

    let line: Vec<String> = values.iter().map(Value::to_string).collect();
    println!("{}", line.join("\t"));
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match &args.commands {
        Commands::Tokenize { filename } => {
            info!("Running Tokenize subcommand");
            let source = read_file(filename)?;
            let mut tokenized = true;

            for token in Scanner::new(&source) {
                match token {
                    Ok(token) => {
                        debug!("Scanned token: {}", token);

                        println!("{}", token);
                    }

                    Err(e) => {
                        tokenized = false;

                        debug!("Tokenization debug: {}", e);

                        eprintln!("{}", e.pretty(&source));
                    }
                }
            }

            if !tokenized {
                debug!("Tokenization failed, exiting with code 65");

                std::process::exit(65);
            }

            info!("Tokenization completed successfully");
        }

        Commands::Parse { filename, json } => {
            info!("Running Parse subcommand");
            let source = read_file(filename)?;

            match space_lua::parse(&source) {
                Ok(block) => {
                    info!("Chunk parsed successfully");

                    if *json {
                        let rendered = serde_json::to_string_pretty(&block)
                            .context("Failed to serialize the AST")?;
                        println!("{}", rendered);
                    } else {
                        print!("{}", AstPrinter::print_block(&block));
                    }
                }

                Err(e) => fail(&e, &source),
            }

            info!("Parse subcommand completed");
        }

        Commands::Evaluate { filename } => {
            info!("Running Evaluate subcommand");
            let source = read_file(filename)?;
            let interpreter = build_interpreter(args.globals.as_ref())?;

            let result = interpreter
                .evaluate_source(&source)
                .and_then(|eval| block_on(eval.resolve()));

            match result {
                Ok(value) => {
                    debug!("Evaluated to: {}", value);
                    println!("{}", value.single());
                }

                Err(e) => fail(&e, &source),
            }

            info!("Evaluate subcommand completed");
        }

        Commands::Run { filename } => {
            info!("Running Run subcommand");
            let source = read_file(filename)?;
            info!("Provided input:\n {}", source);

            let interpreter = build_interpreter(args.globals.as_ref())?;

            let result = interpreter
                .run(&source)
                .and_then(|eval| block_on(eval.resolve()));

            match result {
                Ok(value) => {
                    info!("Program executed successfully");
                    print_results(value);
                }

                Err(e) => fail(&e, &source),
            }
        }
    }

    Ok(())
}
