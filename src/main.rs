use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use minibrew::{ClassPath, Runtime, RuntimeOptions};

#[derive(Parser)]
#[command(name = "minibrew")]
#[command(about = "Run the main method of a compiled Java class")]
#[command(version)]
struct Cli {
    /// Main class, e.g. `samples.SimpleClass`
    #[arg(value_name = "MAIN_CLASS")]
    main_class: String,

    /// Directories to search for class files
    #[arg(short = 'c', long = "classpath", visible_alias = "cp", value_name = "PATH")]
    class_path: Option<String>,

    /// Maximum call depth
    #[arg(long, value_name = "N", default_value_t = RuntimeOptions::default().max_call_depth)]
    max_depth: usize,

    /// Log more, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let class_path = ClassPath::resolve(cli.class_path.as_deref());
    let options = RuntimeOptions {
        max_call_depth: cli.max_depth,
    };
    Runtime::new(class_path, &cli.main_class)
        .with_options(options)
        .start()
        .with_context(|| format!("failed to run {}", cli.main_class))
}
