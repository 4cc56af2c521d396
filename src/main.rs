use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, ColorChoice, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use is_terminal::IsTerminal;

use logforge::analyzer::{Analyzer, DEFAULT_CONTEXT_LINES};
use logforge::config::{self, AppConfig, LogFormat, LogLevel};
use logforge::report::{self, OutputFmt, Summary, TextFormat, paint};
use logforge::{input, runner};

#[derive(Parser, Debug)]
#[command(
    name = "logforge",
    version,
    about = "Summarize errors and warnings in build, test and debugger output",
    long_about = "Classifies compiler diagnostics, Python tracebacks, gdb signal reports and generic ERROR/WARNING lines into a deduplicated summary, either live while wrapping a command or from a captured log.",
    after_long_help = "Examples:\n  logforge run -- make -j8\n  logforge run --json -- pytest -x\n  logforge analyze build.log\n  gcc -Wall main.c 2>&1 | logforge analyze --text-format table\n  logforge build.log --json",
    color = ColorChoice::Auto,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Cmd>,
    /// Print shell completions and exit
    #[arg(long, value_enum)]
    completions: Option<Shell>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run a command and analyze its output as it is produced
    Run {
        #[command(flatten)]
        opts: Opts,
        /// Command to execute, with its arguments
        #[arg(required = true, trailing_var_arg = true, value_name = "CMD")]
        cmd: Vec<String>,
    },
    /// Analyze an existing log file, or standard input
    Analyze {
        #[command(flatten)]
        opts: Opts,
        /// File to read (default: stdin, also `-`)
        source: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug, Default, Clone)]
struct Opts {
    /// Output summary as JSON (same as --output json)
    #[arg(long, default_value_t = false)]
    json: bool,
    #[arg(long, short = 'o', value_enum)]
    output: Option<OutputFmt>,
    #[arg(long, value_enum)]
    text_format: Option<TextFormat>,
    /// Number of recent raw lines kept for --show-context
    #[arg(long)]
    context_lines: Option<usize>,
    #[arg(long, default_value_t = false)]
    show_context: bool,
    /// Write the report to this file instead of the terminal
    #[arg(long)]
    report_path: Option<String>,
    #[arg(long, default_value_t = false)]
    progress: bool,
    /// Exit with 1 when any error or warning was found (run: only if the command itself succeeded)
    #[arg(long, default_value_t = false)]
    warnings_as_errors: bool,
    #[arg(long, short = 'C', default_value_t = false)]
    no_color: bool,
    #[arg(long, default_value_t = false)]
    force_color: bool,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<String>,
    /// Config file (default: ./logforge.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Opts {
    fn output_fmt(&self) -> OutputFmt {
        if self.json { OutputFmt::Json } else { self.output.unwrap_or(OutputFmt::Text) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dest { Stdout, Stderr }

const SUBCOMMANDS: [&str; 3] = ["run", "analyze", "help"];
const TOP_LEVEL_FLAGS: [&str; 5] = ["-h", "--help", "-V", "--version", "--completions"];

/// `logforge build.log` is shorthand for `logforge analyze build.log`.
fn normalize_argv(mut argv: Vec<String>) -> Vec<String> {
    if let Some(first) = argv.get(1) {
        let known = SUBCOMMANDS.contains(&first.as_str()) || TOP_LEVEL_FLAGS.contains(&first.as_str()) || first.starts_with("--completions=");
        if !known { argv.insert(1, "analyze".to_string()); }
    }
    argv
}

fn main() {
    let argv: Vec<String> = std::env::args_os().map(|a| a.to_string_lossy().into_owned()).collect();
    let cli = Cli::parse_from(normalize_argv(argv));
    if let Some(sh) = cli.completions {
        let mut cmd = Cli::command();
        clap_complete::generate(sh, &mut cmd, "logforge", &mut std::io::stdout());
        return;
    }
    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        std::process::exit(2);
    };
    let code = match execute(command) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("logforge: {:#}", e);
            2
        }
    };
    std::process::exit(code);
}

fn execute(command: Cmd) -> anyhow::Result<i32> {
    let (mut opts, run_cmd, source) = match command {
        Cmd::Run { opts, cmd } => (opts, Some(cmd), None),
        Cmd::Analyze { opts, source } => (opts, None, source),
    };
    let cfg = config::read_config(opts.config.as_deref());
    if let Ok(Some(c)) = &cfg { apply_config(&mut opts, c.clone()); }
    init_logging(&opts);
    if let Err(e) = &cfg { log::warn!("{:#}", e); }

    let mut analyzer = Analyzer::with_context_lines(opts.context_lines.unwrap_or(DEFAULT_CONTEXT_LINES));
    match run_cmd {
        Some(cmd) => {
            let code = runner::run_command(&cmd, &mut analyzer)?;
            analyzer.finalize();
            if let Err(e) = emit_report(&opts, &analyzer, Dest::Stderr) {
                log::error!("{:#}", e);
                eprintln!("logforge: {:#}", e);
            }
            let clean = Summary::from_events(analyzer.events()).is_clean();
            Ok(if code == 0 && opts.warnings_as_errors && !clean { 1 } else { code })
        }
        None => {
            let path = source.as_deref().filter(|p| *p != Path::new("-"));
            let reader = input::open_source(path)?;
            input::analyze_reader(reader, &mut analyzer, opts.progress)?;
            analyzer.finalize();
            emit_report(&opts, &analyzer, Dest::Stdout)?;
            let clean = Summary::from_events(analyzer.events()).is_clean();
            Ok(if opts.warnings_as_errors && !clean { 1 } else { 0 })
        }
    }
}

/// Command-line values win; the config only fills what was left unset.
fn apply_config(opts: &mut Opts, cfg: AppConfig) {
    if opts.output.is_none() { opts.output = cfg.output; }
    if opts.text_format.is_none() { opts.text_format = cfg.text_format; }
    if opts.context_lines.is_none() { opts.context_lines = cfg.context_lines; }
    if opts.log_level.is_none() { opts.log_level = cfg.log_level; }
    if opts.log_format.is_none() { opts.log_format = cfg.log_format; }
    if opts.log_path.is_none() { opts.log_path = cfg.log_path; }
    if opts.report_path.is_none() { opts.report_path = cfg.report_path; }
    opts.show_context |= cfg.show_context.unwrap_or(false);
    opts.warnings_as_errors |= cfg.warnings_as_errors.unwrap_or(false);
    opts.progress |= cfg.progress.unwrap_or(false);
    opts.force_color |= cfg.force_color.unwrap_or(false);
    opts.no_color |= cfg.no_color.unwrap_or(false);
}

fn init_logging(opts: &Opts) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if opts.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if let Some(lvl) = opts.log_level {
        builder.filter_level(lvl.filter());
    } else if opts.verbose > 0 {
        let f = if opts.verbose >= 3 { log::LevelFilter::Trace } else if opts.verbose == 2 { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        builder.filter_level(f);
    }
    if let Some(fmt) = opts.log_format {
        match fmt {
            LogFormat::Json => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let obj = serde_json::json!({
                        "ts": chrono::Local::now().to_rfc3339(),
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "msg": record.args().to_string(),
                    });
                    writeln!(buf, "{}", obj)
                });
            }
            LogFormat::Text => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().format("%H:%M:%S");
                    writeln!(buf, "[{:<5} {}] {}", record.level(), ts, record.args())
                });
            }
        }
    }
    let mut target_err = None;
    if let Some(path) = opts.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => { builder.target(env_logger::Target::Pipe(Box::new(f))); }
            Err(e) => target_err = Some(format!("Failed to open log file {}: {}", path, e)),
        }
    }
    let _ = builder.try_init();
    if let Some(msg) = target_err { log::warn!("{}", msg); }
}

fn use_color(opts: &Opts, dest: Dest) -> bool {
    if opts.force_color { return true; }
    if opts.no_color || opts.report_path.is_some() { return false; }
    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let tty = match dest { Dest::Stdout => std::io::stdout().is_terminal(), Dest::Stderr => std::io::stderr().is_terminal() };
    tty && !no_color_env && term != "dumb"
}

fn render(opts: &Opts, analyzer: &Analyzer, color: bool) -> anyhow::Result<String> {
    let events = analyzer.events();
    let mut out = match opts.output_fmt() {
        OutputFmt::Json => return report::generate_json(events),
        OutputFmt::Text => match opts.text_format.unwrap_or(TextFormat::Lines) {
            TextFormat::Lines => report::generate_text_colored(events, color),
            TextFormat::Table => report::generate_table(events),
        },
    };
    let context = analyzer.recent_context();
    if opts.show_context && !context.is_empty() {
        out.push_str("\n\n");
        out.push_str(&report::render_context(&context, color));
    }
    Ok(out)
}

fn emit_report(opts: &Opts, analyzer: &Analyzer, dest: Dest) -> anyhow::Result<()> {
    let color = use_color(opts, dest);
    let text = render(opts, analyzer, color)?;
    if let Some(p) = opts.report_path.as_ref() {
        std::fs::write(p, format!("{}\n", text)).with_context(|| format!("Report write failed for {}", p))?;
        log::info!("report written to {}", p);
        if !opts.quiet { eprintln!("{}", paint(&format!("Report written: {}", p), "1;36", use_color(&Opts { report_path: None, ..opts.clone() }, Dest::Stderr))); }
        return Ok(());
    }
    match dest {
        Dest::Stdout => println!("{}", text),
        Dest::Stderr => eprintln!("{}", text),
    }
    Ok(())
}
