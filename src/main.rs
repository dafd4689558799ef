//! claude-acme launcher
//!
//! Terminal front end for the orchestrator. Lines read from stdin collect in
//! the prompt; a line starting with `:` runs a command instead:
//!
//! ```text
//! :Send            send the collected prompt
//! :Permissions     show the active profile     :Edit   list grantable tools
//! :Save +Bash; -Write   apply edit directives  :plan   switch permission mode
//! :Sessions        list transcripts            :Load <session id>
//! :Reset           forget this directory's history
//! :Exit
//! ```

use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use claude_acme_lib::{
    logging, BufferSurface, Command, CommandKind, Config, ConsoleSurface, Dispatch, Orchestrator, SurfaceHandle,
    Surfaces,
};

const EXIT_COMMAND: &str = "Exit";

#[derive(Parser)]
#[command(name = "claude-acme")]
#[command(about = "Drive the Claude assistant with per-directory history and permissions", long_about = None)]
struct Cli {
    /// Working directory (defaults to the current directory)
    #[arg(short, long)]
    dir: Option<PathBuf>,
    /// Assistant program to run instead of the configured one
    #[arg(short, long)]
    program: Option<String>,
    /// Show assistant diagnostics and debug-log activity on stderr
    #[arg(long)]
    trace: bool,
    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

/// Split `:Name arg` into a command. Save directives may be given inline,
/// separated by semicolons: `:Save +Bash; -Bash(git commit:*)`.
fn parse_line(line: &str) -> Command {
    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg)),
        None => (line, None),
    };
    let command = Command::parse(name, arg);
    match command {
        Command::Known {
            kind: CommandKind::Save,
            arg: Some(arg),
        } => Command::Known {
            kind: CommandKind::Save,
            arg: Some(
                arg.split(';')
                    .map(str::trim)
                    .filter(|directive| !directive.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        },
        other => other,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(program) = cli.program {
        config = config.with_program(program);
    }
    config.ensure_dirs().context("Failed to create state directory")?;

    let working_dir = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let working_dir = working_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", working_dir.display()))?;

    // Each surface keeps its own buffer so Save only ever reads the
    // permissions view.
    let surfaces = Surfaces {
        prompt: SurfaceHandle::new(BufferSurface::new()),
        output: SurfaceHandle::new(ConsoleSurface::stdout()),
        trace: cli.trace.then(|| SurfaceHandle::new(ConsoleSurface::stderr())),
        permissions: SurfaceHandle::new(ConsoleSurface::stdout()),
        sessions: SurfaceHandle::new(ConsoleSurface::stdout()),
    };
    let prompt = surfaces.prompt.clone();

    tracing::info!(dir = %working_dir.display(), program = %config.program, "Starting");
    let mut orchestrator = Orchestrator::new(config, working_dir, surfaces);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command_line) = line.strip_prefix(':') else {
            prompt.append(&format!("{}\n", line))?;
            continue;
        };

        match orchestrator.dispatch(parse_line(command_line)).await {
            Dispatch::Handled | Dispatch::Failed(_) => {}
            Dispatch::PassThrough(Command::PassThrough { name, .. }) if name == EXIT_COMMAND => break,
            Dispatch::PassThrough(command) => eprintln!("Unknown command: {}", command),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude_acme_lib::EditBatch;

    fn save_batch(line: &str) -> EditBatch {
        match parse_line(line) {
            Command::Known {
                kind: CommandKind::Save,
                arg: Some(arg),
            } => EditBatch::parse(&arg),
            other => panic!("expected Save with directives, got {:?}", other),
        }
    }

    #[test]
    fn test_save_directives_split_on_semicolons() {
        let batch = save_batch("Save + Bash; -Write;  + Bash(git commit:*) ;");
        assert_eq!(batch.allow, ["Bash", "Bash(git commit:*)"]);
        assert_eq!(batch.deny, ["Write"]);
        assert!(batch.forget.is_empty());
    }

    #[test]
    fn test_single_save_directive_keeps_spaces() {
        let batch = save_batch("Save ~Bash(npm run build:*)");
        assert_eq!(batch.forget, ["Bash(npm run build:*)"]);
    }

    #[test]
    fn test_bare_save_and_other_commands() {
        assert_eq!(
            parse_line("Save"),
            Command::Known {
                kind: CommandKind::Save,
                arg: None
            }
        );
        assert_eq!(
            parse_line("Load a; b"),
            Command::Known {
                kind: CommandKind::Load,
                arg: Some("a; b".into())
            }
        );
    }
}
