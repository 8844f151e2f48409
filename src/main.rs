use aerotab::codec::FormatError;
use aerotab::registry::{CodecRegistry, Resolution, PROBE_LIMIT};
use aerotab::{tablefile, Table, TableDatabase};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "aerotab", about = "Read, inspect and convert aerodynamic table files")]
struct Cli {
    /// Directories searched for table-codecs.json (overrides AEROTAB_CODEC_PATH)
    #[arg(long, global = true)]
    codec_path: Vec<PathBuf>,
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered table formats
    Formats,
    /// Show how every codec rates a file and which one would read it
    Probe {
        input: PathBuf,
    },
    /// List the tables in a file
    List {
        input: PathBuf,
        /// Format tag to read with instead of probing
        #[arg(short, long)]
        format: Option<String>,
    },
    /// Print one or all tables of a file
    Show {
        input: PathBuf,
        /// Table name; all tables when omitted
        table: Option<String>,
        #[arg(short, long)]
        format: Option<String>,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Convert files to another table format
    Convert {
        #[arg(required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        /// Target format tag: nasa, fdhs, sav, post, c81
        #[arg(short, long)]
        to: String,
        /// Source format tag; probed when omitted
        #[arg(short, long)]
        from: Option<String>,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let registry = if cli.codec_path.is_empty() {
        CodecRegistry::from_env()
    } else {
        CodecRegistry::discover(&cli.codec_path)
    };

    match cli.command {

        // ── Formats ──────────────────────────────────────────────────────────
        Commands::Formats => {
            println!("{:<8} {:<22} {:<6} {}", "Tag", "Description", "Ext", "Access");
            for codec in registry.codecs() {
                let access = if codec.can_write() { "read/write" } else { "read" };
                println!("{:<8} {:<22} {:<6} {}",
                    codec.tag(), codec.description(), codec.extension(), access);
            }
        }

        // ── Probe ────────────────────────────────────────────────────────────
        Commands::Probe { input } => {
            let name = file_name(&input);
            let mut file = File::open(&input)?;
            for codec in registry.codecs() {
                let answer = {
                    let mut probe = BufReader::new((&mut file).take(PROBE_LIMIT));
                    codec.can_read(&name, &mut probe)?
                };
                file.seek(SeekFrom::Start(0))?;
                println!("  {:<8} {:?}", codec.tag(), answer);
            }
            match registry.resolve(&mut file, &name) {
                Ok(Resolution::Found(codec)) => println!("Resolved: {}", codec.tag()),
                Ok(Resolution::Ambiguous(candidates)) => {
                    let tags: Vec<&str> = candidates.iter().map(|c| c.tag()).collect();
                    println!("Ambiguous: {}", tags.join(", "));
                }
                Err(e) => println!("{e}"),
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, format } => {
            let db = open(&registry, &input, format.as_deref())?;
            println!("File: {}", input.display());
            for note in db.notes() {
                println!("  # {note}");
            }
            println!("{:<16} {:>4} {:>14}  Independents", "Table", "Dims", "Shape");
            for t in &db {
                let shape: Vec<String> = t.shape().iter().map(usize::to_string).collect();
                println!("{:<16} {:>4} {:>14}  {}",
                    t.name(), t.dimensions(), shape.join("x"), t.indep_names().join(", "));
            }
        }

        // ── Show ─────────────────────────────────────────────────────────────
        Commands::Show { input, table, format, json } => {
            let db = open(&registry, &input, format.as_deref())?;
            let selected: Vec<&Table> = match &table {
                Some(name) => vec![db.get(name).ok_or_else(|| format!("no table named '{name}'"))?],
                None       => db.iter().collect(),
            };
            if json {
                match table {
                    Some(_) => println!("{}", serde_json::to_string_pretty(selected[0])?),
                    None    => println!("{}", serde_json::to_string_pretty(&db)?),
                }
            } else {
                for t in selected {
                    print_table(t);
                }
            }
        }

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { input, to, from, output_dir } => {
            let target = registry
                .get(&to)
                .ok_or_else(|| FormatError::UnknownFormat(to.clone()))?;
            let ext = target.extension();
            let job = |path: &PathBuf| -> (PathBuf, Result<PathBuf, FormatError>) {
                let dest = output_dir.join(Path::new(&file_name(path)).with_extension(ext));
                let result = open(&registry, path, from.as_deref())
                    .and_then(|db| tablefile::save_file(&registry, &dest, &db, &to))
                    .map(|_| dest);
                (path.clone(), result)
            };

            #[cfg(feature = "parallel")]
            let results: Vec<_> = {
                use rayon::prelude::*;
                input.par_iter().map(job).collect()
            };
            #[cfg(not(feature = "parallel"))]
            let results: Vec<_> = input.iter().map(job).collect();

            let mut failed = 0usize;
            for (src, result) in results {
                match result {
                    Ok(dest) => println!("  {} → {}", src.display(), dest.display()),
                    Err(e)   => {
                        failed += 1;
                        eprintln!("  {}: {e}", src.display());
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{failed} of {} file(s) failed to convert", input.len()).into());
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn open(registry: &CodecRegistry, path: &Path, format: Option<&str>) -> Result<TableDatabase, FormatError> {
    match format {
        Some(tag) => tablefile::open_file_as(registry, path, tag),
        None      => tablefile::open_file(registry, path),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn print_table(t: &Table) {
    println!("── {t} ──");
    for note in t.notes() {
        println!("  # {note}");
    }
    for axis in t.axes() {
        let bps: Vec<String> = axis.breakpoints.iter().map(|v| v.to_string()).collect();
        println!("  {:<10} {}", axis.name, bps.join(" "));
    }
    let fast = t.shape().last().copied().unwrap_or(1);
    for row in t.values().as_slice().chunks(fast) {
        let vals: Vec<String> = row.iter().map(|v| format!("{v:>12.6}")).collect();
        println!("  {}", vals.join(" "));
    }
}
