use std::path::PathBuf;

use clap::Parser;

/// jvmaot - ahead-of-time compilation of JVM classfiles into C/C++ sources
#[derive(Debug, Parser)]
#[command(name = "jvmaot", version, about, long_about = None)]
pub struct Cli {
    /// Class directory, `.jar`/`.zip` archive or single classfile. May be repeated; classes of
    /// earlier inputs win over same-named classes of later ones.
    #[arg(short, long = "input", value_name = "PATH", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory of hand-written native sources. Accepted for compatibility, not processed.
    #[arg(short, long = "source", value_name = "DIR")]
    pub sources: Vec<PathBuf>,

    /// Directory the generated sources are written to.
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Entry point class, overriding the configuration (e.g. app.Main).
    #[arg(long = "main", value_name = "CLASS")]
    pub main_class: Option<String>,

    /// JSON configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also write a CMakeLists.txt for the generated sources.
    #[arg(long)]
    pub project: bool,

    /// Worker threads for the per-method passes (0 = one per core).
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Print the compile report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    pub verbose: bool,
}
