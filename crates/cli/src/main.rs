//! Command-line driver for the NMS toolchain: `nms compile` runs the
//! front end and emits a `.nmc` artifact, `nms run` drives a compiled
//! (or freshly compiled) script through the terminal.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser as ClapParser, Subcommand};

use nms_compiler::ir;
use nms_compiler::{compile_source, Parser as NmsParser, Validator, ValidatorConfig};
use nms_core::bytecode::CompiledScript;
use nms_core::codec;
use nms_runtime::{RuntimeConfig, ScriptRuntime};

#[derive(ClapParser)]
#[command(name = "nms")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile and run NMS visual-novel scripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .nms source file to a .nmc bytecode artifact
    Compile {
        /// Input .nms source file
        input: PathBuf,

        /// Output .nmc path (defaults to the input stem with a .nmc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the token stream and exit without compiling
        #[arg(long)]
        tokens: bool,

        /// Print the parsed AST and exit without compiling
        #[arg(long)]
        ast: bool,

        /// Print the lowered IR graph as JSON and exit without compiling
        #[arg(long)]
        ir: bool,

        /// Run the lexer/parser/validator only; do not emit an artifact
        #[arg(long)]
        validate_only: bool,

        /// Print every diagnostic, including hints
        #[arg(short, long)]
        verbose: bool,

        /// Disable ANSI color in diagnostic output
        #[arg(long)]
        no_color: bool,
    },

    /// Run a compiled (.nmc) or source (.nms) script in the terminal
    Run {
        /// Input .nms or .nmc file
        input: Option<PathBuf>,

        /// Scene to start from (defaults to the first declared scene)
        #[arg(long)]
        scene: Option<String>,

        /// Reveal dialogue instantly instead of animating it
        #[arg(long)]
        no_typewriter: bool,

        /// Typewriter speed in characters per second
        #[arg(long)]
        speed: Option<f32>,

        /// Print every runtime event as it fires
        #[arg(short, long)]
        verbose: bool,

        /// Disable ANSI color in terminal output
        #[arg(long)]
        no_color: bool,

        /// Run a short built-in demo script instead of loading a file
        #[arg(long)]
        demo: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compile { input, output, tokens, ast, ir, validate_only, verbose, no_color } => {
            run_compile(&input, output.as_deref(), tokens, ast, ir, validate_only, verbose, no_color);
        }
        Commands::Run { input, scene, no_typewriter, speed, verbose, no_color, demo } => {
            run_run(input.as_deref(), scene.as_deref(), no_typewriter, speed, verbose, no_color, demo);
        }
    }
}

fn run_compile(
    input: &Path,
    output: Option<&Path>,
    tokens_only: bool,
    ast_only: bool,
    ir_only: bool,
    validate_only: bool,
    verbose: bool,
    no_color: bool,
) {
    let source = match fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    if tokens_only {
        let (tokens, diagnostics) = nms_compiler::lexer::Lexer::tokenize(&source);
        for token in &tokens {
            println!("{:?} {:?} @ {}", token.kind, token.lexeme, token.span);
        }
        print_diagnostics(&diagnostics, verbose, no_color);
        process::exit(if diagnostics.has_errors() { 1 } else { 0 });
    }

    let (program, mut diagnostics) = NmsParser::parse(&source);
    if ast_only {
        println!("{program:#?}");
        print_diagnostics(&diagnostics, verbose, no_color);
        process::exit(if diagnostics.has_errors() { 1 } else { 0 });
    }
    if diagnostics.has_errors() {
        print_diagnostics(&diagnostics, verbose, no_color);
        process::exit(1);
    }

    let validation = Validator::validate(&program, ValidatorConfig::default());
    diagnostics.extend(validation);

    if ir_only {
        let graph = ir::ast_to_ir(&program);
        match serde_json::to_string_pretty(&graph.nodes.values().collect::<Vec<_>>()) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("error serializing IR: {e}"),
        }
        print_diagnostics(&diagnostics, verbose, no_color);
        process::exit(if diagnostics.has_errors() { 1 } else { 0 });
    }

    if diagnostics.has_errors() {
        print_diagnostics(&diagnostics, verbose, no_color);
        process::exit(1);
    }

    if validate_only {
        print_diagnostics(&diagnostics, verbose, no_color);
        println!("{} ok, no errors", input.display());
        process::exit(0);
    }

    let (script, diags) = compile_source(&source, ValidatorConfig::default());
    print_diagnostics(&diags, verbose, no_color);
    let Some(script) = script else {
        process::exit(1);
    };

    let output = output.map(PathBuf::from).unwrap_or_else(|| input.with_extension("nmc"));
    let mut file = match fs::File::create(&output) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error creating {}: {}", output.display(), e);
            process::exit(1);
        }
    };
    if let Err(e) = codec::write(&script, &mut file) {
        eprintln!("error writing {}: {}", output.display(), e);
        process::exit(1);
    }

    println!("compiled {} -> {}", input.display(), output.display());
}

fn print_diagnostics(diagnostics: &nms_core::DiagnosticCollection, verbose: bool, no_color: bool) {
    for diagnostic in diagnostics.all() {
        if !verbose && diagnostic.severity == nms_core::Severity::Hint {
            continue;
        }
        if no_color {
            eprintln!("{}", diagnostic.format());
        } else {
            eprintln!("{}", colorize(diagnostic));
        }
    }
}

fn colorize(diagnostic: &nms_core::Diagnostic) -> String {
    let color = match diagnostic.severity {
        nms_core::Severity::Error => "\x1b[31m",
        nms_core::Severity::Warning => "\x1b[33m",
        nms_core::Severity::Info => "\x1b[36m",
        nms_core::Severity::Hint => "\x1b[90m",
    };
    format!("{color}{}\x1b[0m", diagnostic.format())
}

fn run_run(
    input: Option<&Path>,
    scene: Option<&str>,
    no_typewriter: bool,
    speed: Option<f32>,
    verbose: bool,
    no_color: bool,
    demo: bool,
) {
    let script = if demo {
        load_demo_script()
    } else {
        let Some(input) = input else {
            eprintln!("error: an input file is required unless --demo is passed");
            process::exit(1);
        };
        load_script(input)
    };

    let mut config = RuntimeConfig::default();
    if no_typewriter {
        config.text_speed_cps = f32::INFINITY;
    } else if let Some(speed) = speed {
        config.text_speed_cps = speed;
    }

    let mut runtime = ScriptRuntime::with_config(config);
    runtime.load(script);

    if verbose {
        runtime.set_event_callback(Box::new(move |event| {
            eprintln!("[event] {:?} {} {:?}", event.kind, event.name, event.value);
        }));
    }

    match scene {
        Some(name) => {
            if let Err(e) = runtime.goto_scene(name) {
                eprintln!("error: {e}");
                process::exit(1);
            }
        }
        None => runtime.start(),
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        render_frame(&runtime, no_color);
        if runtime.is_complete() {
            break;
        }
        // advance the typewriter until the line is fully revealed before
        // asking for input, matching the update() tick an embedder runs
        // every frame
        while runtime.is_waiting_for_input() && !runtime.dialogue_fully_revealed() {
            runtime.update(0.05);
        }

        if runtime.is_waiting_for_choice() {
            print!("> ");
            let _ = io::stdout().flush();
            match lines.next() {
                Some(Ok(line)) => match line.trim().parse::<i32>() {
                    Ok(index) => runtime.select_choice(index),
                    Err(_) => eprintln!("enter a choice number"),
                },
                _ => break,
            }
        } else if runtime.is_waiting_for_input() {
            print!("[press enter] ");
            let _ = io::stdout().flush();
            if lines.next().is_none() {
                break;
            }
            runtime.continue_execution();
        } else {
            runtime.update(0.05);
        }
    }

    println!("-- end of script --");
}

fn render_frame(runtime: &ScriptRuntime, no_color: bool) {
    if !runtime.current_speaker().is_empty() {
        if no_color {
            println!("{}: {}", runtime.current_speaker(), runtime.current_dialogue());
        } else {
            println!("\x1b[1m{}\x1b[0m: {}", runtime.current_speaker(), runtime.current_dialogue());
        }
    }
    if runtime.is_waiting_for_choice() {
        for (i, choice) in runtime.current_choices().iter().enumerate() {
            println!("  {i}) {choice}");
        }
    }
}

fn load_script(input: &Path) -> CompiledScript {
    let is_binary = input.extension().is_some_and(|ext| ext == "nmc");
    if is_binary {
        let mut file = match fs::File::open(input) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("error reading {}: {}", input.display(), e);
                process::exit(1);
            }
        };
        match codec::read(&mut file) {
            Ok(script) => script,
            Err(e) => {
                eprintln!("error decoding {}: {}", input.display(), e);
                process::exit(1);
            }
        }
    } else {
        let source = match fs::read_to_string(input) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error reading {}: {}", input.display(), e);
                process::exit(1);
            }
        };
        let (script, diagnostics) = compile_source(&source, ValidatorConfig::default());
        print_diagnostics(&diagnostics, false, false);
        match script {
            Some(script) => script,
            None => process::exit(1),
        }
    }
}

fn load_demo_script() -> CompiledScript {
    let source = r##"
        character Narrator(name="Narrator", color="#CCCCCC")
        scene demo {
            Narrator "Welcome to the NMS demo."
            "Continue" -> { Narrator "You picked continue." }
            "Stop" -> { Narrator "Goodbye." }
        }
    "##;
    let (script, diagnostics) = compile_source(source, ValidatorConfig::default());
    if diagnostics.has_errors() {
        for d in diagnostics.errors() {
            eprintln!("{}", d.format());
        }
        process::exit(1);
    }
    script.expect("demo script always compiles")
}
