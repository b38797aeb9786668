use std::{
    env::{current_exe, var},
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};

use storth::{
    lang::source_buffer::SourceBuffer,
    runtime::{
        error::{self, ErrorKind, ScriptError},
        evaluator::{Evaluator, Flow},
        transpiler::Transpiler,
    },
};

/// Interpreter and C++ transpiler for a small stack-oriented language.
#[derive(Parser)]
#[command(name = "storth")]
#[command(version)]
#[command(about = "Interpreter and C++ transpiler for a small stack-oriented language")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a source file, then continue with standard input.
    Interp {
        /// The source file to evaluate.
        script: PathBuf,

        /// Extra arguments for the script.
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Transpile a source file to a C++ program written next to it.
    Comp {
        /// The source file to transpile.
        script: PathBuf,
    },
}

/// Find the prelude file that establishes the session's common words.  It normally sits next to
/// the executable, but the STORTH_LIB_PATH environment variable can point at another directory.
fn prelude_path() -> error::Result<PathBuf> {
    if let Ok(lib_path) = var("STORTH_LIB_PATH") {
        return Ok(PathBuf::from(lib_path).join("core.forth"));
    }

    let exe_path = current_exe()?;

    match exe_path.parent() {
        Some(directory) => Ok(directory.join("core.forth")),
        None => Err(ScriptError::new(
            ErrorKind::Io("could not get the directory of the running executable".to_string()),
            None,
        )),
    }
}

/// Open a source file for streaming evaluation or compilation.
fn open_source(path: &Path) -> error::Result<BufReader<File>> {
    match File::open(path) {
        Ok(file) => Ok(BufReader::new(file)),
        Err(err) => Err(ScriptError::new(
            ErrorKind::Io(format!("could not read {}: {}", path.display(), err)),
            None,
        )),
    }
}

/// Evaluate one source file within the session.
fn eval_file(evaluator: &mut Evaluator, path: &Path) -> error::Result<Flow> {
    let mut reader = open_source(path)?;
    let mut buffer = SourceBuffer::new(&path.to_string_lossy(), &mut reader);

    evaluator.eval_buffer(&mut buffer)
}

/// Compile one source file into the transpiler's buffers.
fn compile_file(transpiler: &mut Transpiler, path: &Path) -> error::Result<()> {
    let mut reader = open_source(path)?;
    let mut buffer = SourceBuffer::new(&path.to_string_lossy(), &mut reader);

    transpiler.compile_buffer(&mut buffer)
}

/// Run an interpretation session: the prelude, then optionally a script file, then standard
/// input.  A `bye` anywhere ends the session immediately with success, skipping the shutdown
/// validation.  A session that drains its input instead must leave the heap and return stack
/// empty.
fn run_interpreter(script: Option<PathBuf>) -> error::Result<()> {
    let mut input = io::stdin();
    let mut output = io::stdout();
    let mut evaluator = Evaluator::new(&mut input, &mut output);

    if eval_file(&mut evaluator, &prelude_path()?)? == Flow::Bye {
        return Ok(());
    }

    if let Some(script) = script {
        if eval_file(&mut evaluator, &script)? == Flow::Bye {
            return Ok(());
        }
    }

    let mut source = io::stdin();
    let mut buffer = SourceBuffer::new("<stdin>", &mut source);

    if evaluator.eval_buffer(&mut buffer)? == Flow::Bye {
        return Ok(());
    }

    evaluator.finish()
}

/// Run a compilation session: transpile the prelude and the script, then write the emitted C++
/// program next to the script.
fn run_transpiler(script: PathBuf) -> error::Result<()> {
    let mut transpiler = Transpiler::new();

    compile_file(&mut transpiler, &prelude_path()?)?;
    compile_file(&mut transpiler, &script)?;

    let mut destination_path = script.into_os_string();
    destination_path.push(".cc");
    let destination_path = PathBuf::from(destination_path);

    let mut destination = match File::create(&destination_path) {
        Ok(file) => file,
        Err(err) => {
            return Err(ScriptError::new(
                ErrorKind::Io(format!(
                    "could not write {}: {}",
                    destination_path.display(),
                    err
                )),
                None,
            ));
        }
    };

    transpiler.write(&mut destination)
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => run_interpreter(None),
        Some(Command::Interp { script, args: _ }) => run_interpreter(Some(script)),
        Some(Command::Comp { script }) => run_transpiler(script),
    }
}
